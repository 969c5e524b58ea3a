//! Canonical code origins.

use crate::{Error, Result};
use std::fmt;

/// Where a piece of code came from, in canonical form.
///
/// Canonicalization is purely textual; host names are never resolved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Origin {
    /// Matches every origin.
    Any,
    Location {
        scheme: String,
        /// `None` when the locator has no `//` authority or an empty one.
        authority: Option<String>,
        path: String,
    },
}

impl Origin {
    /// Canonicalize an origin string.
    ///
    /// Back-slashes become `/`. The scheme and authority are lower-cased, a
    /// `file:` drive letter is upper-cased, and characters that may not
    /// appear in a URI are percent-escaped. `file:` with neither host nor
    /// path denotes [`Origin::Any`].
    pub fn parse(text: &str) -> Result<Self> {
        let normalized = text.trim().replace('\\', "/");
        let Some((scheme, rest)) = split_scheme(&normalized) else {
            return Err(Error::InvalidOrigin(text.to_string()));
        };
        let scheme = scheme.to_ascii_lowercase();

        let (mut authority, mut path) = match rest.strip_prefix("//") {
            Some(hier) => match hier.find('/') {
                Some(i) => (hier[..i].to_ascii_lowercase(), hier[i..].to_string()),
                None => (hier.to_ascii_lowercase(), String::new()),
            },
            None => (String::new(), rest.to_string()),
        };
        if let Some(i) = path.find(['?', '#']) {
            path.truncate(i);
        }

        if scheme == "file" {
            // `file://c:/dir` puts the drive where the host belongs.
            if is_drive(&authority) {
                path = format!("/{authority}{path}");
                authority.clear();
            }
            if authority.is_empty() && path.is_empty() {
                return Ok(Origin::Any);
            }
            path = canonical_drive(&path);
            if authority.is_empty() && !path.starts_with('/') {
                path.insert(0, '/');
            }
        }

        Ok(Origin::Location {
            scheme,
            authority: (!authority.is_empty()).then(|| escape(&authority)),
            path: escape(&path),
        })
    }

    /// Returns `true` if code from `other` is covered by this origin.
    ///
    /// A path ending in `/-` covers everything below it, one ending in `/*`
    /// covers only the entries directly inside it.
    pub fn implies(&self, other: &Origin) -> bool {
        let Origin::Location {
            scheme,
            authority,
            path,
        } = self
        else {
            return true;
        };
        let Origin::Location {
            scheme: other_scheme,
            authority: other_authority,
            path: other_path,
        } = other
        else {
            return false;
        };

        if scheme != other_scheme || authority != other_authority {
            return false;
        }
        if path == other_path {
            return true;
        }
        if let Some(prefix) = path.strip_suffix('-').filter(|p| p.ends_with('/')) {
            return other_path.starts_with(prefix);
        }
        if let Some(prefix) = path.strip_suffix('*').filter(|p| p.ends_with('/')) {
            return other_path
                .strip_prefix(prefix)
                .is_some_and(|rest| !rest.contains('/'));
        }
        false
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Any => f.write_str("*"),
            Origin::Location {
                scheme,
                authority: Some(authority),
                path,
            } => write!(f, "{scheme}://{authority}{path}"),
            Origin::Location {
                scheme,
                authority: None,
                path,
            } => write!(f, "{scheme}:{path}"),
        }
    }
}

impl std::str::FromStr for Origin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Origin::parse(s)
    }
}

/// Split off a URI scheme of at least two characters.
///
/// A single letter before `:` is a drive, not a scheme.
fn split_scheme(text: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = text.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = scheme.len() >= 2
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

fn is_drive(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// `c:/x`, `/c:/x` and `/C:/x` all become `/C:/x`.
fn canonical_drive(path: &str) -> String {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.get(..2).is_some_and(is_drive) {
        let mut out = String::with_capacity(trimmed.len() + 1);
        out.push('/');
        out.push(trimmed.as_bytes()[0].to_ascii_uppercase() as char);
        out.push_str(&trimmed[1..]);
        out
    } else {
        path.to_string()
    }
}

fn is_hex(b: u8) -> bool {
    b.is_ascii_hexdigit()
}

/// Percent-escape characters that cannot appear in a URI, keeping valid
/// `%XX` escapes as they are.
fn escape(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let needs_escape = match b {
            b'%' => !(i + 2 < bytes.len() && is_hex(bytes[i + 1]) && is_hex(bytes[i + 2])),
            b' ' | b'"' | b'<' | b'>' | b'^' | b'`' | b'{' | b'|' | b'}' => true,
            b if b.is_ascii_control() || !b.is_ascii() => true,
            _ => false,
        };
        if needs_escape {
            out.push_str(&format!("%{b:02X}"));
        } else {
            out.push(b as char);
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(text: &str) -> String {
        Origin::parse(text).unwrap().to_string()
    }

    #[test]
    fn test_canonical_forms() {
        let cases = [
            ("file:/opt/app/lib.jar", "file:/opt/app/lib.jar"),
            ("file:///opt/app/", "file:/opt/app/"),
            ("FILE:/opt/App", "file:/opt/App"),
            ("file:c:\\Program Files\\app", "file:/C:/Program%20Files/app"),
            ("file://c:/dir/-", "file:/C:/dir/-"),
            ("file:relative/x", "file:/relative/x"),
            ("HTTP://Example.COM/Path", "http://example.com/Path"),
            ("http://a.b.c/-", "http://a.b.c/-"),
            ("http://host/a%20b/{x}", "http://host/a%20b/%7Bx%7D"),
            ("http://host/100%", "http://host/100%25"),
            ("http://host/caf\u{e9}", "http://host/caf%C3%A9"),
        ];
        for (input, expected) in cases {
            assert_eq!(canonical(input), expected, "input {input}");
        }
    }

    #[test]
    fn test_empty_file_origin_is_any() {
        assert_eq!(Origin::parse("file:").unwrap(), Origin::Any);
        assert_eq!(Origin::parse("file://").unwrap(), Origin::Any);
    }

    #[test]
    fn test_missing_scheme_is_invalid() {
        for text in ["/opt/app", "c:/dir", "no scheme here", ":x", "1a:/x"] {
            assert!(
                matches!(Origin::parse(text), Err(Error::InvalidOrigin(_))),
                "input {text}"
            );
        }
    }

    #[test]
    fn test_implies() {
        let origin = |s: &str| Origin::parse(s).unwrap();
        let recursive = origin("file:/opt/app/-");
        let children = origin("file:/opt/app/*");
        let exact = origin("file:/opt/app/lib.jar");

        assert!(recursive.implies(&origin("file:/opt/app/lib.jar")));
        assert!(recursive.implies(&origin("file:/opt/app/sub/x.jar")));
        assert!(!recursive.implies(&origin("file:/opt/other/x.jar")));

        assert!(children.implies(&origin("file:/opt/app/lib.jar")));
        assert!(!children.implies(&origin("file:/opt/app/sub/x.jar")));

        assert!(exact.implies(&origin("file:/opt/app/lib.jar")));
        assert!(!exact.implies(&origin("file:/opt/app/lib2.jar")));

        assert!(!origin("http://a.b.c/-").implies(&origin("https://a.b.c/x")));
        assert!(!origin("http://a.b.c/-").implies(&origin("http://x.b.c/x")));
        assert!(origin("http://A.B.C/-").implies(&origin("http://a.b.c/x")));
    }

    #[test]
    fn test_any_implies_everything() {
        let origin = Origin::parse("file:/x").unwrap();
        assert!(Origin::Any.implies(&origin));
        assert!(Origin::Any.implies(&Origin::Any));
        assert!(!origin.implies(&Origin::Any));
    }
}
