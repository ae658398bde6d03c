//! # Signature Document Format
//!
//! In-memory model of a user's signature and its TOML encoding.
//!
//! ## File Layout
//!
//! ```toml
//! [signature]
//! version = "1.0"
//! created_at = "2026-01-01T00:00:00Z"
//! updated_at = "2026-01-01T00:00:00Z"
//!
//! [metadata]
//! authenticated_nodes = 1
//! last_updated = "2026-01-01T00:00:00Z"
//!
//! [nodes.actionnetwork]
//! enabled = true
//! added_at = "2026-01-01T00:00:00Z"
//!
//! [nodes.actionnetwork.auth]
//! encrypted = "<base64 of nonce || ciphertext>"
//!
//! [nodes.actionnetwork.operations.list_people]
//! category = "read"
//! description = "List people"
//! ```
//!
//! The set of `operations.<name>` tables is the operation whitelist. Nothing
//! else in the file implies an operation is enabled.
//!
//! ## Structural Validation
//!
//! | Check | Failure |
//! |-------|---------|
//! | Parseable TOML with `[signature]` and `[metadata]` | `Integrity` |
//! | `signature.version == "1.0"` | `Integrity` |
//! | Node and operation keys well-formed | `Integrity` |
//! | `auth.encrypted` decodes to nonce + tag at least | `Integrity` |
//! | `metadata.authenticated_nodes == len(nodes)` | `Integrity` |

use crate::crypto::{NONCE_SIZE, TAG_SIZE};
use crate::error::{Result, SignatureError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sigil_catalog::{Operation, OperationCategory};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Supported document format version.
pub const DOCUMENT_VERSION: &str = "1.0";

/// One whitelisted operation as stored in a signature entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledOperation {
    pub category: OperationCategory,
    #[serde(default)]
    pub description: String,
}

impl From<&Operation> for EnabledOperation {
    fn from(op: &Operation) -> Self {
        Self {
            category: op.category,
            description: op.description.clone(),
        }
    }
}

/// A user's configuration for one node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    pub node_type: String,
    pub enabled: bool,
    pub added_at: DateTime<Utc>,
    /// `nonce || ciphertext`; opaque outside the crypto module.
    pub encrypted_auth: Vec<u8>,
    pub defaults: BTreeMap<String, String>,
    /// Key set is the operation whitelist.
    pub enabled_operations: BTreeMap<String, EnabledOperation>,
}

impl SignatureEntry {
    pub fn operation_names(&self) -> BTreeSet<String> {
        self.enabled_operations.keys().cloned().collect()
    }

    pub fn is_authenticated(&self) -> bool {
        !self.encrypted_auth.is_empty()
    }

    pub fn allows(&self, operation: &str) -> bool {
        self.enabled && self.enabled_operations.contains_key(operation)
    }
}

/// A user's complete signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDocument {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub entries: BTreeMap<String, SignatureEntry>,
}

impl SignatureDocument {
    /// A document with no entries, as returned for users who never saved one.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            created_at: now,
            updated_at: now,
            entries: BTreeMap::new(),
        }
    }

    pub fn entry(&self, node_type: &str) -> Option<&SignatureEntry> {
        self.entries.get(node_type)
    }

    pub fn authenticated_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_authenticated()).count()
    }

    /// Encodes the document as TOML.
    pub fn to_toml(&self) -> Result<String> {
        let file = SignatureFile {
            signature: HeaderSection {
                version: self.version.clone(),
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            metadata: MetadataSection {
                authenticated_nodes: self.authenticated_count(),
                last_updated: self.updated_at,
            },
            nodes: self
                .entries
                .iter()
                .map(|(id, entry)| {
                    (
                        id.clone(),
                        NodeSection {
                            enabled: entry.enabled,
                            added_at: entry.added_at,
                            auth: AuthSection {
                                encrypted: BASE64.encode(&entry.encrypted_auth),
                            },
                            defaults: entry.defaults.clone(),
                            operations: entry.enabled_operations.clone(),
                        },
                    )
                })
                .collect(),
        };

        toml::to_string(&file).map_err(|e| SignatureError::Serialization(e.to_string()))
    }

    /// Decodes and structurally validates a document read from `path`.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self> {
        let file: SignatureFile =
            toml::from_str(text).map_err(|e| SignatureError::integrity(path, e.to_string()))?;

        if file.signature.version != DOCUMENT_VERSION {
            return Err(SignatureError::integrity(
                path,
                format!("unsupported version '{}'", file.signature.version),
            ));
        }

        let mut entries = BTreeMap::new();
        for (id, node) in file.nodes {
            if !is_valid_node_key(&id) {
                return Err(SignatureError::integrity(path, format!("malformed node key '{}'", id)));
            }
            if let Some(bad) = node.operations.keys().find(|op| !Operation::is_valid_name(op)) {
                return Err(SignatureError::integrity(
                    path,
                    format!("malformed operation key '{}' under node '{}'", bad, id),
                ));
            }

            let encrypted_auth = BASE64.decode(node.auth.encrypted.as_bytes()).map_err(|e| {
                SignatureError::integrity(path, format!("undecodable credentials for '{}': {}", id, e))
            })?;
            if encrypted_auth.len() < NONCE_SIZE + TAG_SIZE {
                return Err(SignatureError::integrity(
                    path,
                    format!("truncated credentials for '{}'", id),
                ));
            }

            entries.insert(
                id.clone(),
                SignatureEntry {
                    node_type: id,
                    enabled: node.enabled,
                    added_at: node.added_at,
                    encrypted_auth,
                    defaults: node.defaults,
                    enabled_operations: node.operations,
                },
            );
        }

        if file.metadata.authenticated_nodes != entries.len() {
            return Err(SignatureError::integrity(
                path,
                format!(
                    "metadata lists {} authenticated nodes but {} are present",
                    file.metadata.authenticated_nodes,
                    entries.len()
                ),
            ));
        }

        Ok(Self {
            version: file.signature.version,
            created_at: file.signature.created_at,
            updated_at: file.signature.updated_at,
            entries,
        })
    }
}

/// Node ids are lower-cased file stems.
fn is_valid_node_key(key: &str) -> bool {
    !key.is_empty()
        && key.trim() == key
        && !key.chars().any(char::is_control)
        && key.to_lowercase() == key
}


// On-disk shape. Kept private so the domain types stay free of encoding concerns.

#[derive(Serialize, Deserialize)]
struct SignatureFile {
    signature: HeaderSection,
    metadata: MetadataSection,
    #[serde(default)]
    nodes: BTreeMap<String, NodeSection>,
}

#[derive(Serialize, Deserialize)]
struct HeaderSection {
    version: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct MetadataSection {
    authenticated_nodes: usize,
    last_updated: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct NodeSection {
    enabled: bool,
    added_at: DateTime<Utc>,
    auth: AuthSection,
    #[serde(default)]
    defaults: BTreeMap<String, String>,
    #[serde(default)]
    operations: BTreeMap<String, EnabledOperation>,
}

#[derive(Serialize, Deserialize)]
struct AuthSection {
    encrypted: String,
}
