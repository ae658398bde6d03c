//! Error types for Sigil Core.

use sigil_catalog::CatalogError;
use sigil_signature::SignatureError;
use thiserror::Error;

/// Core error type for node service operations.
#[derive(Debug, Error)]
pub enum SigilError {
    /// The definitions directory could not be scanned.
    #[error("Scan error: {0}")]
    Scan(String),

    /// Caller input was rejected.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        invalid: Vec<String>,
    },

    /// Unknown node type, operation, or signature entry.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A signature document is present but malformed.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// A user's signature stayed locked through every retry.
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Credential encryption failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SigilError {
    /// Stable code used in JSON responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Scan(_) => "SCAN_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Integrity(_) => "INTEGRITY_ERROR",
            Self::Concurrency(_) => "CONCURRENCY_ERROR",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    pub(crate) fn validation(message: impl Into<String>, invalid: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            invalid,
        }
    }
}

impl From<CatalogError> for SigilError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NodeNotFound(_) | CatalogError::OperationNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            CatalogError::DefinitionsDir { .. } | CatalogError::Worker(_) => Self::Scan(err.to_string()),
        }
    }
}

impl From<SignatureError> for SigilError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Validation { message, invalid } => Self::Validation { message, invalid },
            SignatureError::NotFound(msg) => Self::NotFound(msg),
            SignatureError::Integrity { .. } => Self::Integrity(err.to_string()),
            SignatureError::Concurrency { .. } => Self::Concurrency(err.to_string()),
            SignatureError::Crypto(msg) => Self::Crypto(msg),
            SignatureError::Io { .. } | SignatureError::Serialization(_) => Self::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(SigilError::Scan("x".into()).code(), "SCAN_ERROR");
        assert_eq!(SigilError::validation("x", vec![]).code(), "VALIDATION_ERROR");
        assert_eq!(SigilError::Config("x".into()).code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_signature_errors_keep_their_kind() {
        let err: SigilError = SignatureError::Concurrency {
            user_id: "alice".into(),
            waited_ms: 10,
        }
        .into();
        assert_eq!(err.code(), "CONCURRENCY_ERROR");

        let err: SigilError = CatalogError::NodeNotFound("x".into()).into();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
