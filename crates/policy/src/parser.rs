//! Per-source driver: scan, read, open the keystore and resolve grants.

use crate::capability::{CapabilityFactory, CapabilityRegistry};
use crate::clause::KeystoreClause;
use crate::config::Config;
use crate::expand::PropertyExpander;
use crate::grant::Grant;
use crate::identity::{IdentityStore, KeystoreLoader, TomlKeystoreLoader};
use crate::reader;
use crate::resolver::GrantResolver;
use crate::source::SourceLoader;
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Parses policy sources into resolved grants.
#[derive(Clone)]
pub struct PolicyParser {
    factory: Arc<dyn CapabilityFactory>,
    keystores: Arc<dyn KeystoreLoader>,
}

impl PolicyParser {
    pub fn new(factory: Arc<dyn CapabilityFactory>, keystores: Arc<dyn KeystoreLoader>) -> Self {
        Self { factory, keystores }
    }

    /// Standard capability kinds and TOML keystores read through `sources`.
    pub fn standard(sources: Arc<dyn SourceLoader>) -> Self {
        Self::new(
            Arc::new(CapabilityRegistry::standard()),
            Arc::new(TomlKeystoreLoader::new(sources)),
        )
    }

    /// Load `locator` through `sources` and parse it.
    pub fn load(&self, locator: &Url, sources: &dyn SourceLoader, config: &Config) -> Result<Vec<Grant>> {
        let text = sources.load(locator)?;
        self.parse(&text, locator, config)
    }

    /// Parse one policy source.
    ///
    /// Keystore locators are resolved against `base`. Lexical and syntax
    /// errors fail the whole source; a grant that fails to resolve is
    /// logged and skipped. Void grants are dropped and structurally equal
    /// grants kept once, in source order.
    pub fn parse(&self, text: &str, base: &Url, config: &Config) -> Result<Vec<Grant>> {
        let clauses = reader::parse_clauses(text)?;
        let identities = self.open_keystore(&clauses.keystores, base, config)?;
        let resolver = GrantResolver::new(identities.as_deref(), self.factory.as_ref(), config);

        let mut seen = HashSet::new();
        let mut grants = Vec::new();
        for clause in &clauses.grants {
            match resolver.resolve(clause) {
                Ok(grant) if grant.is_void() => {
                    debug!(locator = %base, "Dropping void grant");
                }
                Ok(grant) => {
                    if seen.insert(grant.clone()) {
                        grants.push(grant);
                    }
                }
                Err(e) if e.is_security() => return Err(e),
                Err(e) => warn!(locator = %base, error = %e, "Skipping grant"),
            }
        }
        Ok(grants)
    }

    /// The first keystore clause that loads wins.
    fn open_keystore(
        &self,
        clauses: &[KeystoreClause],
        base: &Url,
        config: &Config,
    ) -> Result<Option<Arc<dyn IdentityStore>>> {
        for clause in clauses {
            let Some(location) = clause.url.as_deref() else {
                continue;
            };
            let kind = clause
                .kind
                .as_deref()
                .filter(|k| !k.is_empty())
                .unwrap_or(config.keystore_type.as_str());
            match self.load_keystore(location, kind, base, config) {
                Ok(store) => return Ok(Some(store)),
                Err(e) if e.is_security() => return Err(e),
                Err(e) => warn!(keystore = location, error = %e, "Skipping keystore"),
            }
        }
        Ok(None)
    }

    fn load_keystore(
        &self,
        location: &str,
        kind: &str,
        base: &Url,
        config: &Config,
    ) -> Result<Arc<dyn IdentityStore>> {
        let (location, kind) = if config.can_expand_properties() {
            let properties = config.expansion_properties();
            let expander = PropertyExpander::new(&properties);
            (expander.expand_url(location)?, expander.expand(kind)?)
        } else {
            (location.to_string(), kind.to_string())
        };
        let locator = base
            .join(&location)
            .map_err(|e| Error::UnsupportedLocator(format!("{location}: {e}")))?;
        self.keystores.load(&locator, &kind)
    }
}
