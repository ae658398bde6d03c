//! Error types for the signature store.
//!
//! Every variant a caller can act on carries the names it needs to
//! self-correct (offending fields, unknown operations, the user whose lock
//! timed out). Credential values never appear in error messages.

use sigil_catalog::CatalogError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for signature operations.
pub type Result<T> = std::result::Result<T, SignatureError>;

/// Errors that can occur while reading or mutating signature documents.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Caller input was rejected. Nothing was persisted.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        /// Offending field or operation names.
        invalid: Vec<String>,
    },

    /// Unknown node type, or a mutation that requires an existing entry.
    #[error("not found: {0}")]
    NotFound(String),

    /// The document exists but is structurally invalid.
    ///
    /// Distinct from an absent document, which reads as empty.
    #[error("signature document {} failed integrity check: {reason}", .path.display())]
    Integrity { path: PathBuf, reason: String },

    /// The per-user lock was not acquired within the bounded wait.
    #[error("signature document for '{user_id}' is busy (waited {waited_ms} ms)")]
    Concurrency { user_id: String, waited_ms: u64 },

    /// Encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Filesystem failure while reading or writing a document.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SignatureError {
    pub(crate) fn validation(message: impl Into<String>, invalid: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            invalid,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn integrity(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Integrity {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<CatalogError> for SignatureError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NodeNotFound(_) | CatalogError::OperationNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            other => Self::NotFound(format!("catalog unavailable: {}", other)),
        }
    }
}
