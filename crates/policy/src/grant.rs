//! Resolved, immutable grants.

use crate::binding::BindingHandle;
use crate::capability::Capability;
use crate::clause::{WILDCARD, quote};
use crate::identity::{Certificate, Identity};
use crate::origin::Origin;
use crate::subject::Subject;
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

/// What a grant is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Only the principal constraints apply.
    Principal,
    /// The subject must carry every listed certificate.
    Certificate(BTreeSet<Certificate>),
    /// The subject's origin must be implied by one of `origins`, and it
    /// must carry every listed certificate.
    Origin {
        origins: BTreeSet<Origin>,
        certificates: BTreeSet<Certificate>,
    },
    /// Bound to one class loader until its handle is unregistered.
    ClassLoader(BindingHandle),
    /// Bound to one protection domain until its handle is unregistered.
    Domain(BindingHandle),
}

impl Binding {
    fn matches(&self, subject: &Subject) -> bool {
        match self {
            Binding::Principal => true,
            Binding::Certificate(certificates) => certificates.is_subset(&subject.certificates),
            Binding::Origin {
                origins,
                certificates,
            } => {
                let origin = subject.origin.as_ref().unwrap_or(&Origin::Any);
                certificates.is_subset(&subject.certificates)
                    && origins.iter().any(|granted| granted.implies(origin))
            }
            Binding::ClassLoader(handle) => {
                handle.is_live() && subject.class_loader.as_ref() == Some(handle)
            }
            Binding::Domain(handle) => handle.is_live() && subject.domain.as_ref() == Some(handle),
        }
    }

    fn is_dead(&self) -> bool {
        match self {
            Binding::ClassLoader(handle) | Binding::Domain(handle) => !handle.is_live(),
            _ => false,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Principal => f.write_str("any origin"),
            Binding::Certificate(certificates) => write!(f, "signed by {}", certificates.len()),
            Binding::Origin {
                origins,
                certificates,
            } => {
                let origins: Vec<String> = origins.iter().map(Origin::to_string).collect();
                write!(f, "origin {}", origins.join(" | "))?;
                if !certificates.is_empty() {
                    write!(f, ", signed by {}", certificates.len())?;
                }
                Ok(())
            }
            Binding::ClassLoader(handle) => write!(f, "class loader #{}", handle.id()),
            Binding::Domain(handle) => write!(f, "domain #{}", handle.id()),
        }
    }
}

/// An identity constraint of a grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Principal {
    /// Looked up through the identity store; matched by equality.
    Resolved(Identity),
    /// `(class, name)` as written; either side may be `*`.
    Unresolved { class: String, name: String },
}

impl Principal {
    pub fn unresolved(class: impl Into<String>, name: impl Into<String>) -> Self {
        Principal::Unresolved {
            class: class.into(),
            name: name.into(),
        }
    }

    pub fn matches(&self, identity: &Identity) -> bool {
        match self {
            Principal::Resolved(resolved) => resolved == identity,
            Principal::Unresolved { class, name } => {
                (class == WILDCARD || *class == identity.class)
                    && (name == WILDCARD || *name == identity.name)
            }
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Resolved(identity) => write!(f, "{identity}"),
            Principal::Unresolved { class, name } => {
                f.write_str(class)?;
                if name == WILDCARD {
                    f.write_str(" *")
                } else {
                    write!(f, " {}", quote(name))
                }
            }
        }
    }
}

/// A resolved rule binding a subject descriptor to a set of capabilities.
///
/// Equality and hashing are structural; the hash is computed once.
#[derive(Debug, Clone)]
pub struct Grant {
    binding: Binding,
    principals: BTreeSet<Principal>,
    capabilities: BTreeSet<Capability>,
    privileged: bool,
    hash: u64,
}

impl Grant {
    pub fn new(
        binding: Binding,
        principals: BTreeSet<Principal>,
        capabilities: BTreeSet<Capability>,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        binding.hash(&mut hasher);
        principals.hash(&mut hasher);
        capabilities.hash(&mut hasher);
        Self {
            privileged: capabilities.iter().any(Capability::is_privileged),
            hash: hasher.finish(),
            binding,
            principals,
            capabilities,
        }
    }

    pub fn builder() -> GrantBuilder {
        GrantBuilder::default()
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn principals(&self) -> &BTreeSet<Principal> {
        &self.principals
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    /// Holds the capability that implies all others.
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Grants nothing, or is bound to an unregistered handle.
    pub fn is_void(&self) -> bool {
        self.capabilities.is_empty() || self.binding.is_dead()
    }

    /// Returns `true` if this grant applies to `subject`.
    ///
    /// Every principal of the grant needs a matching identity asserted by
    /// the subject; a grant without principals places no constraint.
    pub fn matches(&self, subject: &Subject) -> bool {
        self.binding.matches(subject)
            && self
                .principals
                .iter()
                .all(|p| subject.identities.iter().any(|id| p.matches(id)))
    }
}

impl PartialEq for Grant {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.binding == other.binding
            && self.principals == other.principals
            && self.capabilities == other.capabilities
    }
}

impl Eq for Grant {}

impl Hash for Grant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grant [{}]", self.binding)?;
        for principal in &self.principals {
            write!(f, " principal {principal}")?;
        }
        f.write_str(" {\n")?;
        for capability in &self.capabilities {
            writeln!(f, "    {capability}")?;
        }
        f.write_str("}")
    }
}

/// Assembles a [`Grant`], choosing the binding from what was supplied.
#[derive(Debug, Clone, Default)]
pub struct GrantBuilder {
    origins: BTreeSet<Origin>,
    certificates: BTreeSet<Certificate>,
    principals: BTreeSet<Principal>,
    capabilities: BTreeSet<Capability>,
    class_loader: Option<BindingHandle>,
    domain: Option<BindingHandle>,
}

impl GrantBuilder {
    pub fn origin(mut self, origin: Origin) -> Self {
        self.origins.insert(origin);
        self
    }

    pub fn certificate(mut self, certificate: Certificate) -> Self {
        self.certificates.insert(certificate);
        self
    }

    pub fn certificates(mut self, certificates: impl IntoIterator<Item = Certificate>) -> Self {
        self.certificates.extend(certificates);
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principals.insert(principal);
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    pub fn class_loader(mut self, handle: BindingHandle) -> Self {
        self.class_loader = Some(handle);
        self
    }

    pub fn domain(mut self, handle: BindingHandle) -> Self {
        self.domain = Some(handle);
        self
    }

    /// Origin-bound if any origin was given, else certificate-bound if any
    /// certificate was given, else principal-bound. A handle excludes both.
    pub fn build(self) -> Result<Grant> {
        let located = !self.origins.is_empty() || !self.certificates.is_empty();
        let binding = match (self.class_loader, self.domain) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidGrant(
                    "bound to both a class loader and a domain".into(),
                ));
            }
            (Some(_), None) | (None, Some(_)) if located => {
                return Err(Error::InvalidGrant(
                    "handle-bound grants cannot name origins or certificates".into(),
                ));
            }
            (Some(handle), None) => Binding::ClassLoader(handle),
            (None, Some(handle)) => Binding::Domain(handle),
            (None, None) if !self.origins.is_empty() => Binding::Origin {
                origins: self.origins,
                certificates: self.certificates,
            },
            (None, None) if !self.certificates.is_empty() => {
                Binding::Certificate(self.certificates)
            }
            (None, None) => Binding::Principal,
        };
        Ok(Grant::new(binding, self.principals, self.capabilities))
    }
}
