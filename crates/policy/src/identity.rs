//! Signer certificates, identities and the stores that resolve aliases to them.

use crate::clause::quote;
use crate::source::SourceLoader;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Certificate kind that can stand behind an identity.
pub const X509: &str = "X.509";

/// Identity class assigned to identities derived from X.509 certificates.
pub const X500_IDENTITY_CLASS: &str = "javax.security.auth.x500.X500Principal";

/// Keystore type used when a `keystore` clause names none.
pub const DEFAULT_KEYSTORE_TYPE: &str = "toml";

/// An opaque signer certificate. Only equality matters to the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Certificate {
    pub kind: String,
    pub subject: String,
    #[serde(default)]
    pub fingerprint: String,
}

impl Certificate {
    pub fn x509(subject: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            kind: X509.to_string(),
            subject: subject.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, quote(&self.subject))
    }
}

/// A resolved identity a subject may assert.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Identity {
    pub class: String,
    pub name: String,
}

impl Identity {
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
        }
    }
}

/// `class "name"`, the form used by `${{self}}` and `${{alias:..}}`.
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.class, quote(&self.name))
    }
}

/// Resolves aliases to certificates and identities.
pub trait IdentityStore: Send + Sync {
    fn certificate_for(&self, alias: &str) -> Result<Certificate>;

    /// Identity behind `alias`; only X.509 certificates qualify.
    fn identity_for(&self, alias: &str) -> Result<Identity> {
        let certificate = self.certificate_for(alias)?;
        if certificate.kind != X509 {
            return Err(Error::WrongCertificateType {
                alias: alias.to_string(),
                kind: certificate.kind,
            });
        }
        Ok(Identity::new(X500_IDENTITY_CLASS, certificate.subject))
    }
}

/// In-memory alias table.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    certificates: HashMap<String, Certificate>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, alias: impl Into<String>, certificate: Certificate) -> Self {
        self.insert(alias, certificate);
        self
    }

    pub fn insert(&mut self, alias: impl Into<String>, certificate: Certificate) {
        self.certificates.insert(alias.into(), certificate);
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Parse the TOML keystore format:
    ///
    /// ```toml
    /// [[certificate]]
    /// alias = "duke"
    /// kind = "X.509"          # optional, defaults to X.509
    /// subject = "CN=Duke"
    /// fingerprint = "ab:cd"   # optional
    /// ```
    pub fn parse(toml: &str) -> Result<Self> {
        let file: KeystoreFile = toml::from_str(toml).map_err(|e| Error::Keystore(e.to_string()))?;
        let mut store = Self::new();
        for entry in file.certificates {
            store.insert(
                entry.alias,
                Certificate {
                    kind: entry.kind,
                    subject: entry.subject,
                    fingerprint: entry.fingerprint,
                },
            );
        }
        Ok(store)
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn certificate_for(&self, alias: &str) -> Result<Certificate> {
        self.certificates
            .get(alias)
            .cloned()
            .ok_or_else(|| Error::IdentityNotFound(alias.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct KeystoreFile {
    #[serde(default, rename = "certificate")]
    certificates: Vec<KeystoreEntry>,
}

#[derive(Debug, Deserialize)]
struct KeystoreEntry {
    alias: String,
    #[serde(default = "default_kind")]
    kind: String,
    subject: String,
    #[serde(default)]
    fingerprint: String,
}

fn default_kind() -> String {
    X509.to_string()
}

/// Opens the keystore named by a `keystore` clause.
pub trait KeystoreLoader: Send + Sync {
    fn load(&self, locator: &Url, kind: &str) -> Result<Arc<dyn IdentityStore>>;
}

/// Loads `toml` keystores through a [`SourceLoader`].
#[derive(Clone)]
pub struct TomlKeystoreLoader {
    sources: Arc<dyn SourceLoader>,
}

impl TomlKeystoreLoader {
    pub fn new(sources: Arc<dyn SourceLoader>) -> Self {
        Self { sources }
    }
}

impl KeystoreLoader for TomlKeystoreLoader {
    fn load(&self, locator: &Url, kind: &str) -> Result<Arc<dyn IdentityStore>> {
        if !kind.eq_ignore_ascii_case(DEFAULT_KEYSTORE_TYPE) {
            return Err(Error::Keystore(format!("unsupported keystore type \"{kind}\"")));
        }
        let text = self.sources.load(locator)?;
        Ok(Arc::new(MemoryIdentityStore::parse(&text)?))
    }
}
