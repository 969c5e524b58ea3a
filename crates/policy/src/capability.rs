//! Capabilities and the factory that instantiates them from policy text.

use crate::identity::Certificate;
use crate::{Error, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Kind of the capability that implies every other capability.
pub const ALL_CAPABILITIES: &str = "java.security.AllPermission";

/// Whether the capability's kind was known when it was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Resolved,
    /// Kept as raw text together with the signers its kind requires.
    Unresolved,
}

/// An opaque, comparable `(kind, name, actions)` value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Capability {
    pub kind: String,
    pub name: String,
    pub actions: String,
    pub resolution: Resolution,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub signers: BTreeSet<Certificate>,
}

impl Capability {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, actions: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            actions: actions.into(),
            resolution: Resolution::Resolved,
            signers: BTreeSet::new(),
        }
    }

    pub fn unresolved(
        kind: impl Into<String>,
        name: impl Into<String>,
        actions: impl Into<String>,
        signers: impl IntoIterator<Item = Certificate>,
    ) -> Self {
        Self {
            resolution: Resolution::Unresolved,
            signers: signers.into_iter().collect(),
            ..Self::new(kind, name, actions)
        }
    }

    /// The privileged capability.
    pub fn all() -> Self {
        Self::new(ALL_CAPABILITIES, "", "")
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution == Resolution::Resolved
    }

    pub fn is_privileged(&self) -> bool {
        self.is_resolved() && self.kind == ALL_CAPABILITIES
    }

    fn has_wildcard_name(&self) -> bool {
        self.name == "*" || self.name.ends_with("/*") || self.name.ends_with(".*") || self.name.ends_with("/-")
    }

    /// Returns `true` if holding `self` entitles the holder to `requested`.
    pub fn implies(&self, requested: &Capability) -> bool {
        if self.is_privileged() {
            return true;
        }
        if self.kind != requested.kind {
            return false;
        }
        if !self.is_resolved() || !requested.is_resolved() {
            return self.name == requested.name && self.actions == requested.actions;
        }
        name_implies(&self.name, &requested.name) && actions_imply(&self.actions, &requested.actions)
    }
}

fn name_implies(granted: &str, requested: &str) -> bool {
    if granted == requested || granted == "*" {
        return true;
    }
    if let Some(prefix) = granted.strip_suffix('-').filter(|p| p.ends_with('/')) {
        return requested.starts_with(prefix);
    }
    if let Some(prefix) = granted.strip_suffix('*').filter(|p| p.ends_with('/')) {
        return requested
            .strip_prefix(prefix)
            .is_some_and(|rest| !rest.contains('/'));
    }
    if let Some(prefix) = granted.strip_suffix('*').filter(|p| p.ends_with('.')) {
        return requested.starts_with(prefix);
    }
    false
}

fn action_set(actions: &str) -> BTreeSet<String> {
    actions
        .split(',')
        .map(|a| a.trim().to_ascii_lowercase())
        .filter(|a| !a.is_empty())
        .collect()
}

fn actions_imply(granted: &str, requested: &str) -> bool {
    action_set(requested).is_subset(&action_set(granted))
}

/// Kind first; within a kind, exact names sort before wildcard names.
impl Ord for Capability {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| self.has_wildcard_name().cmp(&other.has_wildcard_name()))
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.actions.cmp(&other.actions))
            .then_with(|| self.resolution.cmp(&other.resolution))
            .then_with(|| self.signers.cmp(&other.signers))
    }
}

impl PartialOrd for Capability {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)?;
        if !self.name.is_empty() || !self.actions.is_empty() {
            write!(f, " \"{}\"", self.name)?;
        }
        if !self.actions.is_empty() {
            write!(f, ", \"{}\"", self.actions)?;
        }
        if !self.is_resolved() {
            f.write_str(" (unresolved)")?;
        }
        Ok(())
    }
}

/// Builds capabilities from the raw text of permission entries.
pub trait CapabilityFactory: Send + Sync {
    /// Certificates that must have signed `kind`, or `None` if the kind is unknown.
    fn signers(&self, kind: &str) -> Option<Vec<Certificate>>;

    /// Fails with [`Error::NoMatchingConstructor`] when no constructor of
    /// the kind accepts the supplied fields.
    fn instantiate(&self, kind: &str, name: &str, actions: &str) -> Result<Capability>;
}

/// Constructor shapes a capability kind can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// No arguments; name and actions are dropped.
    Zero,
    /// Name only.
    One,
    /// Name and actions.
    Two,
}

impl Arity {
    /// Constructor preference for the fields present in an entry.
    pub fn try_order(name: &str, actions: &str) -> [Arity; 3] {
        if !actions.is_empty() {
            [Arity::Two, Arity::One, Arity::Zero]
        } else if !name.is_empty() {
            [Arity::One, Arity::Two, Arity::Zero]
        } else {
            [Arity::Zero, Arity::One, Arity::Two]
        }
    }
}

#[derive(Debug, Clone)]
struct KindEntry {
    arities: Vec<Arity>,
    signers: Vec<Certificate>,
}

/// [`CapabilityFactory`] backed by a table of registered kinds.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    kinds: HashMap<String, KindEntry>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the privileged kind and the common platform kinds.
    pub fn standard() -> Self {
        use Arity::*;
        Self::new()
            .with(ALL_CAPABILITIES, &[Zero])
            .with("java.io.FilePermission", &[Two])
            .with("java.net.SocketPermission", &[Two])
            .with("java.util.PropertyPermission", &[Two])
            .with("java.lang.RuntimePermission", &[One, Two])
            .with("java.security.SecurityPermission", &[One, Two])
            .with("java.net.NetPermission", &[One, Two])
            .with("java.lang.reflect.ReflectPermission", &[One, Two])
            .with("javax.security.auth.AuthPermission", &[One, Two])
    }

    pub fn with(mut self, kind: impl Into<String>, arities: &[Arity]) -> Self {
        self.register(kind, arities, Vec::new());
        self
    }

    /// Register `kind` with its constructors and the certificates it was signed by.
    pub fn register(&mut self, kind: impl Into<String>, arities: &[Arity], signers: Vec<Certificate>) {
        self.kinds.insert(
            kind.into(),
            KindEntry {
                arities: arities.to_vec(),
                signers,
            },
        );
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }
}

impl CapabilityFactory for CapabilityRegistry {
    fn signers(&self, kind: &str) -> Option<Vec<Certificate>> {
        self.kinds.get(kind).map(|entry| entry.signers.clone())
    }

    fn instantiate(&self, kind: &str, name: &str, actions: &str) -> Result<Capability> {
        let entry = self
            .kinds
            .get(kind)
            .ok_or_else(|| Error::NoMatchingConstructor(kind.to_string()))?;
        let arity = Arity::try_order(name, actions)
            .into_iter()
            .find(|arity| entry.arities.contains(arity))
            .ok_or_else(|| Error::NoMatchingConstructor(kind.to_string()))?;
        Ok(match arity {
            Arity::Zero => Capability::new(kind, "", ""),
            Arity::One => Capability::new(kind, name, ""),
            Arity::Two => Capability::new(kind, name, actions),
        })
    }
}
