//! Error types for the capability catalog.
//!
//! [`ScanError`] is deliberately not a [`CatalogError`] variant: a bad
//! definition file is recorded on the catalog it was scanned into and never
//! propagates past catalog construction.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Why a single definition file did not produce a usable descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanErrorKind {
    /// The file could not be read, or was not valid UTF-8. No descriptor exists for it.
    Unreadable,
    /// The file was read but matched no known pattern, or its pattern failed to parse.
    /// An unparsed placeholder descriptor exists for it.
    Unparseable,
    /// Another file earlier in lexical order already claimed the same id.
    DuplicateId,
}

impl fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unreadable => "unreadable",
            Self::Unparseable => "unparseable",
            Self::DuplicateId => "duplicate id",
        })
    }
}

/// A per-file failure recorded during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind} definition '{id}' at {}: {message}", .path.display())]
pub struct ScanError {
    /// Candidate node id (lower-cased file stem).
    pub id: String,
    pub path: PathBuf,
    pub kind: ScanErrorKind,
    pub message: String,
}

impl ScanError {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        kind: ScanErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Errors surfaced by catalog queries and construction.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No descriptor with this id exists in the snapshot.
    #[error("node type not found: {0}")]
    NodeNotFound(String),

    /// The node exists but has no operation with this name.
    #[error("operation '{operation}' not found on node type '{node_type}'")]
    OperationNotFound {
        node_type: String,
        operation: String,
    },

    /// The definitions directory itself could not be listed.
    #[error("definitions directory {} unavailable: {source}", .path.display())]
    DefinitionsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A parallel scan worker panicked or was cancelled.
    #[error("scan worker failed: {0}")]
    Worker(String),
}
