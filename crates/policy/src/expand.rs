//! Property and protocol expansion for policy strings.
//!
//! Three textual passes are available:
//!
//! - `${key}`: simple substitution from a flat property table
//!   ([`PropertyExpander::expand`]).
//! - `${{protocol:data}}`: generalized substitution delegated to an
//!   [`ExpansionResolver`] ([`resolve_general`]).
//! - `${{key}}` over a separator-delimited property value: multi-value
//!   substitution yielding one candidate string per combination
//!   ([`Segments`]).
//!
//! No pass recurses into the text it inserts. Callers that need nested
//! expansion re-run the pass a fixed number of times.

use crate::{Error, Result};
use std::collections::BTreeMap;

/// Flat key/value table consulted by `${key}` expressions.
pub type Properties = BTreeMap<String, String>;

/// Number of simple passes applied to codebase candidates to resolve
/// properties whose values themselves contain `${key}` expressions.
pub const NESTED_EXPANSION_PASSES: usize = 3;

const START_MARK: &str = "${";
const END_MARK: &str = "}";
const GENERAL_START_MARK: &str = "${{";
const GENERAL_END_MARK: &str = "}}";

/// Resolves one `${{protocol:data}}` expression.
///
/// `data` is `None` when the expression has no `:`.
pub trait ExpansionResolver {
    fn resolve(&self, protocol: &str, data: Option<&str>) -> Result<String>;
}

impl<F> ExpansionResolver for F
where
    F: Fn(&str, Option<&str>) -> Result<String>,
{
    fn resolve(&self, protocol: &str, data: Option<&str>) -> Result<String> {
        self(protocol, data)
    }
}

/// Simple `${key}` substitution over a borrowed property table.
#[derive(Debug, Clone, Copy)]
pub struct PropertyExpander<'a> {
    properties: &'a Properties,
}

impl<'a> PropertyExpander<'a> {
    pub fn new(properties: &'a Properties) -> Self {
        Self { properties }
    }

    /// Replace every `${key}` in `text`, left to right.
    ///
    /// Fails with [`Error::UnknownKey`] on the first undefined key; nothing
    /// of the partial result is returned. Inserted values are not rescanned.
    pub fn expand(&self, text: &str) -> Result<String> {
        let mut result = text.to_string();
        let mut start = result.find(START_MARK);
        while let Some(s) = start {
            let Some(rel_end) = result[s..].find(END_MARK) else {
                break;
            };
            let end = s + rel_end;
            let key = &result[s + START_MARK.len()..end];
            let value = self
                .properties
                .get(key)
                .ok_or_else(|| Error::UnknownKey(key.to_string()))?
                .clone();
            result.replace_range(s..end + END_MARK.len(), &value);
            let resume = s + value.len();
            start = result[resume..].find(START_MARK).map(|i| resume + i);
        }
        Ok(result)
    }

    /// [`expand`](Self::expand), then normalize the platform file separator to `/`.
    pub fn expand_url(&self, text: &str) -> Result<String> {
        Ok(normalize_separators(&self.expand(text)?))
    }

    /// Run [`expand`](Self::expand) `passes` times.
    pub fn expand_repeatedly(&self, text: &str, passes: usize) -> Result<String> {
        let mut result = text.to_string();
        for _ in 0..passes {
            result = self.expand(&result)?;
        }
        Ok(result)
    }
}

/// Replace the platform file separator with `/`.
pub fn normalize_separators(text: &str) -> String {
    text.replace(std::path::MAIN_SEPARATOR, "/")
}

/// Replace every `${{protocol:data}}` in `text` with the resolver's answer.
///
/// The enclosed text is split on its first `:`. A resolver failure aborts
/// the whole expansion.
pub fn resolve_general(text: &str, resolver: &dyn ExpansionResolver) -> Result<String> {
    let mut result = text.to_string();
    let mut start = result.find(GENERAL_START_MARK);
    while let Some(s) = start {
        let Some(rel_end) = result[s..].find(GENERAL_END_MARK) else {
            break;
        };
        let end = s + rel_end;
        let key = &result[s + GENERAL_START_MARK.len()..end];
        let (protocol, data) = match key.split_once(':') {
            Some((protocol, data)) => (protocol, Some(data)),
            None => (key, None),
        };
        let value = resolver.resolve(protocol, data)?;
        result.replace_range(s..end + GENERAL_END_MARK.len(), &value);
        let resume = s + value.len();
        start = result[resume..].find(GENERAL_START_MARK).map(|i| resume + i);
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Choice(Vec<String>),
}

/// A string with `${{key}}` placeholders standing for lists of alternatives.
///
/// Iterating yields every combination of the alternatives, in list order,
/// with the right-most placeholder varying fastest. Iteration is lazy and
/// can be restarted by calling [`Segments::iter`] again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    parts: Vec<Part>,
}

impl Segments {
    /// Split `text` around `${{key}}` placeholders, looking each key up in
    /// `properties` and splitting its value on `separator`.
    pub fn parse(text: &str, properties: &Properties, separator: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut rest = text;
        while let Some(s) = rest.find(GENERAL_START_MARK) {
            let Some(rel_end) = rest[s..].find(GENERAL_END_MARK) else {
                break;
            };
            let end = s + rel_end;
            if s > 0 {
                parts.push(Part::Literal(rest[..s].to_string()));
            }
            let key = &rest[s + GENERAL_START_MARK.len()..end];
            let value = properties
                .get(key)
                .ok_or_else(|| Error::UnknownKey(key.to_string()))?;
            let choices = if separator.is_empty() {
                vec![value.clone()]
            } else {
                value.split(separator).map(str::to_string).collect()
            };
            parts.push(Part::Choice(choices));
            rest = &rest[end + GENERAL_END_MARK.len()..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }
        Ok(Self { parts })
    }

    /// Number of candidates [`iter`](Self::iter) yields.
    pub fn len(&self) -> usize {
        self.parts
            .iter()
            .map(|part| match part {
                Part::Literal(_) => 1,
                Part::Choice(choices) => choices.len(),
            })
            .product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> SegmentIter<'_> {
        SegmentIter {
            parts: &self.parts,
            indices: vec![0; self.parts.len()],
            done: self.is_empty(),
        }
    }
}

impl<'a> IntoIterator for &'a Segments {
    type Item = String;
    type IntoIter = SegmentIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the candidates of a [`Segments`].
#[derive(Debug, Clone)]
pub struct SegmentIter<'a> {
    parts: &'a [Part],
    indices: Vec<usize>,
    done: bool,
}

impl Iterator for SegmentIter<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let mut candidate = String::new();
        for (part, &idx) in self.parts.iter().zip(&self.indices) {
            match part {
                Part::Literal(text) => candidate.push_str(text),
                Part::Choice(choices) => candidate.push_str(&choices[idx]),
            }
        }

        // Advance the odometer, right-most choice first.
        self.done = true;
        for (part, idx) in self.parts.iter().zip(self.indices.iter_mut()).rev() {
            if let Part::Choice(choices) = part {
                if *idx + 1 < choices.len() {
                    *idx += 1;
                    self.done = false;
                    break;
                }
                *idx = 0;
            }
        }
        Some(candidate)
    }
}
