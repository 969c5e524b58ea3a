//! Engine configuration: the property table, security switches and
//! policy locations.

use crate::expand::{Properties, PropertyExpander};
use crate::identity::DEFAULT_KEYSTORE_TYPE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

/// Switch disabling `${key}` substitution when set to `false`.
pub const POLICY_EXPAND: &str = "policy.expandProperties";

/// Switch disabling the system policy location when set to `false`.
pub const POLICY_ALLOW_DYNAMIC: &str = "policy.allowSystemProperty";

/// Prefix of the numbered policy location entries, starting at 1.
pub const POLICY_URL_PREFIX: &str = "policy.url.";

/// Configuration loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Extra policy location. A leading `=` makes it the only location.
    #[serde(default)]
    pub system_policy: Option<String>,

    /// Separator between the values of a multi-value property.
    #[serde(default = "default_path_separator")]
    pub path_separator: String,

    /// Keystore type assumed when a `keystore` clause names none.
    #[serde(default = "default_keystore_type")]
    pub keystore_type: String,

    /// Security switches and numbered policy locations.
    #[serde(default)]
    pub security: BTreeMap<String, String>,

    /// Values for `${key}` expressions.
    #[serde(default)]
    pub properties: Properties,
}

fn default_path_separator() -> String {
    ":".to_string()
}

fn default_keystore_type() -> String {
    DEFAULT_KEYSTORE_TYPE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system_policy: None,
            path_separator: default_path_separator(),
            keystore_type: default_keystore_type(),
            security: BTreeMap::new(),
            properties: Properties::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_security(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.security.insert(key.into(), value.into());
        self
    }

    pub fn security_property(&self, key: &str) -> Option<&str> {
        self.security.get(key).map(String::as_str)
    }

    fn switch(&self, key: &str) -> bool {
        !self
            .security_property(key)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
    }

    pub fn can_expand_properties(&self) -> bool {
        self.switch(POLICY_EXPAND)
    }

    pub fn allows_system_policy(&self) -> bool {
        self.switch(POLICY_ALLOW_DYNAMIC)
    }

    /// The property table, with `/` defaulting to the platform file separator.
    pub fn expansion_properties(&self) -> Properties {
        let mut properties = self.properties.clone();
        properties
            .entry("/".to_string())
            .or_insert_with(|| std::path::MAIN_SEPARATOR.to_string());
        properties
    }

    /// Ordered policy locations: the numbered entries, then the system policy.
    ///
    /// Numbering stops at the first missing index. Entries that fail to
    /// expand or parse are skipped. A system policy prefixed with `=`
    /// replaces the numbered list entirely.
    pub fn policy_locations(&self) -> Vec<Url> {
        let properties = self.expansion_properties();
        let expander = PropertyExpander::new(&properties);

        let mut system = None;
        if self.allows_system_policy() {
            if let Some(raw) = &self.system_policy {
                let (exclusive, raw) = match raw.strip_prefix('=') {
                    Some(rest) => (true, rest),
                    None => (false, raw.as_str()),
                };
                match expander.expand(raw).and_then(|s| system_location(&s)) {
                    Ok(url) if exclusive => return vec![url],
                    Ok(url) => system = Some(url),
                    Err(e) => tracing::warn!(location = raw, error = %e, "Skipping system policy"),
                }
            }
        }

        let mut locations = Vec::new();
        for n in 1.. {
            let key = format!("{POLICY_URL_PREFIX}{n}");
            let Some(raw) = self.security_property(&key) else {
                break;
            };
            let parsed = expander
                .expand_url(raw)
                .and_then(|s| Url::parse(&s).map_err(|e| Error::UnsupportedLocator(format!("{s}: {e}"))));
            match parsed {
                Ok(url) => locations.push(url),
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping policy location"),
            }
        }
        locations.extend(system);
        locations
    }
}

/// An existing file becomes a `file:` URL; anything else must parse as a URL.
fn system_location(location: &str) -> Result<Url> {
    let path = Path::new(location);
    if path.exists() {
        let absolute = std::path::absolute(path)?;
        return Url::from_file_path(&absolute)
            .map_err(|_| Error::UnsupportedLocator(location.to_string()));
    }
    Url::parse(location).map_err(|e| Error::UnsupportedLocator(format!("{location}: {e}")))
}
