//! Policy and keystore source loading.

use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use url::Url;

/// Fetches the text behind a locator.
pub trait SourceLoader: Send + Sync {
    fn load(&self, locator: &Url) -> Result<String>;
}

/// Reads `file:` locators from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSourceLoader;

impl SourceLoader for FileSourceLoader {
    fn load(&self, locator: &Url) -> Result<String> {
        if locator.scheme() != "file" {
            return Err(Error::UnsupportedLocator(locator.to_string()));
        }
        let path = locator
            .to_file_path()
            .map_err(|_| Error::UnsupportedLocator(locator.to_string()))?;
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Serves text registered in memory, keyed by locator.
///
/// Entries can be replaced while the loader is shared.
#[derive(Debug, Default)]
pub struct MemorySourceLoader {
    sources: RwLock<HashMap<Url, String>>,
}

impl MemorySourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(self, locator: Url, text: impl Into<String>) -> Self {
        self.insert(locator, text);
        self
    }

    /// Register or replace the text served for `locator`.
    pub fn insert(&self, locator: Url, text: impl Into<String>) {
        self.sources.write().insert(locator, text.into());
    }

    pub fn remove(&self, locator: &Url) -> Option<String> {
        self.sources.write().remove(locator)
    }
}

impl SourceLoader for MemorySourceLoader {
    fn load(&self, locator: &Url) -> Result<String> {
        self.sources.read().get(locator).cloned().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no source registered for {locator}"),
            ))
        })
    }
}
