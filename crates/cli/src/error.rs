//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// One or more policy files failed to parse.
    #[error("{failed} of {total} policy files failed to parse")]
    CheckFailed { failed: usize, total: usize },

    /// A path could not be turned into a `file:` locator.
    #[error("invalid policy path {}", path.display())]
    InvalidPath { path: PathBuf },

    /// A `--principal` argument is not of the form CLASS=NAME.
    #[error("invalid principal '{0}': expected CLASS=NAME")]
    InvalidPrincipal(String),

    /// Configuration is invalid or missing required fields.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An error occurred in the policy layer.
    #[error(transparent)]
    Policy(#[from] policy::Error),

    /// JSON output could not be produced.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
