//! Policy error types.

use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A malformed string literal in policy source.
    #[error("lexical error at line {line}: {message}")]
    Lexical { line: usize, message: String },

    /// A token appeared where the grammar does not allow it.
    #[error("unexpected token encountered: {found} at line {line}{}", hint(.expected))]
    Syntax {
        line: usize,
        found: String,
        expected: Option<String>,
    },

    /// A `${key}` expression named a property that is not defined.
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// A `${{protocol:data}}` expression could not be resolved.
    #[error("expansion failed: {0}")]
    ExpansionFailed(String),

    /// Signers were named but no identity store is available.
    #[error("no identity store to resolve signers: \"{0}\"")]
    SigningInfoUnavailable(String),

    /// The capability kind has no constructor for the supplied fields.
    #[error("no suitable constructor for capability kind {0}")]
    NoMatchingConstructor(String),

    /// An alias is unknown to the identity store.
    #[error("no identity registered for alias \"{0}\"")]
    IdentityNotFound(String),

    /// An alias resolved to a certificate that cannot back an identity.
    #[error("invalid certificate for alias \"{alias}\": {kind} (only X.509 certificates can be aliased to identities)")]
    WrongCertificateType { alias: String, kind: String },

    /// An origin string could not be canonicalized.
    #[error("invalid origin \"{0}\"")]
    InvalidOrigin(String),

    /// A policy or keystore locator cannot be served by the loader.
    #[error("unsupported locator: {0}")]
    UnsupportedLocator(String),

    /// A keystore could not be loaded or decoded.
    #[error("keystore error: {0}")]
    Keystore(String),

    /// A grant could not be built from the supplied parts.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// Configuration is malformed.
    #[error("failed to parse config: {0}")]
    Config(String),

    /// An operation was refused by an enclosing access check.
    ///
    /// Never downgraded: every layer re-raises it.
    #[error("security violation: {0}")]
    Security(String),

    /// An I/O error occurred while reading a source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for errors that must propagate past every recovery point.
    pub fn is_security(&self) -> bool {
        matches!(self, Error::Security(_))
    }
}

fn hint(expected: &Option<String>) -> String {
    expected
        .as_deref()
        .map(|e| format!(". {e}"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_message_includes_hint() {
        let err = Error::Syntax {
            line: 3,
            found: "word 'foo'".into(),
            expected: Some("expected entries are: \"grant\" or \"keystore\"".into()),
        };
        assert_eq!(
            err.to_string(),
            "unexpected token encountered: word 'foo' at line 3. expected entries are: \"grant\" or \"keystore\""
        );
    }

    #[test]
    fn test_only_security_is_security() {
        assert!(Error::Security("blocked".into()).is_security());
        assert!(!Error::UnknownKey("x".into()).is_security());
    }
}
