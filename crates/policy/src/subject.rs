//! The request side of an evaluation.

use crate::binding::BindingHandle;
use crate::capability::Capability;
use crate::identity::{Certificate, Identity};
use crate::origin::Origin;
use std::collections::BTreeSet;

/// Who is asking: an origin, its signers, the identities it asserts and
/// the capabilities it carries on its own.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    /// `None` is treated as an unknown origin, matched only by grants
    /// that accept any origin.
    pub origin: Option<Origin>,
    pub certificates: BTreeSet<Certificate>,
    pub identities: BTreeSet<Identity>,
    pub class_loader: Option<BindingHandle>,
    pub domain: Option<BindingHandle>,
    /// Merged into every evaluation regardless of grants.
    pub static_capabilities: BTreeSet<Capability>,
}

impl Subject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificates.insert(certificate);
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identities.insert(identity);
        self
    }

    pub fn with_class_loader(mut self, handle: BindingHandle) -> Self {
        self.class_loader = Some(handle);
        self
    }

    pub fn with_domain(mut self, handle: BindingHandle) -> Self {
        self.domain = Some(handle);
        self
    }

    pub fn with_static_capability(mut self, capability: Capability) -> Self {
        self.static_capabilities.insert(capability);
        self
    }
}
