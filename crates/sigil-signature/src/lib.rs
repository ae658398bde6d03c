//! # Sigil Signature - Authentication Signature Store
//!
//! A durable, per-user record of which node types are enabled, their
//! encrypted credentials, parameter defaults, and the exact operations each
//! user whitelisted.
//!
//! ## Threat Model
//!
//! | Threat | Defense |
//! |--------|---------|
//! | Credential disclosure at rest | AES-256-GCM per entry, per-user derived key |
//! | Blob transplant between users or nodes | AEAD associated data binds `user_id` + `node_type` |
//! | Whitelist widening | Explicit operation lists are persisted exactly; unknown names reject the request |
//! | Lost update under concurrency | Per-user transaction with bounded lock wait |
//! | Torn or partial writes | Temp file + fsync + atomic rename |
//! | Corrupt document read as empty | Structural validation, `Integrity` error |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SIGNATURE MUTATOR                       │
//! │   add_node · remove_node · update_defaults · set_operations  │
//! │                  reconcile · decrypt_auth                    │
//! └───────┬────────────────────┬─────────────────────┬───────────┘
//!         │                    │                     │
//!         ▼                    ▼                     ▼
//! ┌───────────────┐   ┌────────────────┐   ┌──────────────────────┐
//! │ CatalogHandle │   │CredentialCipher│   │   SignatureStore     │
//! │ (snapshot)    │   │ AES-256-GCM    │   │ per-user lock        │
//! └───────────────┘   └────────────────┘   │ <root>/<user>/       │
//!                                          │   signature.toml     │
//!                                          └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sigil_catalog::{Catalog, CatalogHandle};
//! use sigil_signature::{AuthData, CredentialCipher, MasterKey, SignatureMutator, SignatureStore};
//! use std::collections::BTreeMap;
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let catalog = CatalogHandle::new(Catalog::build(Path::new("./nodes")).unwrap());
//! let store = Arc::new(SignatureStore::open("./signatures", Duration::from_secs(2)).unwrap());
//! let cipher = Arc::new(CredentialCipher::new(MasterKey::from_passphrase(b"secret")));
//! let mutator = SignatureMutator::new(catalog, store, cipher);
//!
//! let auth: AuthData = [("api_key", "sk-123")].into_iter().collect();
//! let ops = vec!["list_people".to_string()];
//! mutator
//!     .add_node("alice", "actionnetwork", &auth, BTreeMap::new(), Some(&ops))
//!     .unwrap();
//! ```

pub mod crypto;
pub mod document;
pub mod error;
pub mod mutator;
pub mod store;

pub use crypto::{AuthData, CredentialCipher, MasterKey};
pub use document::{EnabledOperation, SignatureDocument, SignatureEntry, DOCUMENT_VERSION};
pub use error::{Result, SignatureError};
pub use mutator::{
    resolve_operations, validate_auth, validate_defaults, ReconcileReport, RetryPolicy,
    SignatureMutator,
};
pub use store::{validate_user_id, Commit, SignatureStore, DEFAULT_LOCK_TIMEOUT};
