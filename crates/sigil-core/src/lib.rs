//! # Sigil Core - Node Service Facade
//!
//! Combines the node capability catalog and the authentication signature
//! store behind one query and mutation surface.
//!
//! ## Components
//!
//! | Component | Crate | Role |
//! |-----------|-------|------|
//! | Catalog snapshot | `sigil-catalog` | What node types exist and what they can do |
//! | Signature mutator | `sigil-signature` | What each user enabled, with which credentials |
//! | Availability view | this crate | Catalog ⋈ signature ⋈ live status |
//! | JSON surface | this crate | `{"action": ...}` requests, uniform responses |
//!
//! ## Response Envelope
//!
//! ```json
//! { "success": false, "data": null,
//!   "error": { "code": "VALIDATION_ERROR", "message": "...", "invalid": ["fly"] } }
//! ```
//!
//! Codes: `SCAN_ERROR`, `VALIDATION_ERROR`, `NOT_FOUND`, `INTEGRITY_ERROR`,
//! `CONCURRENCY_ERROR`, `CRYPTO_ERROR`, `IO_ERROR`, `CONFIG_ERROR`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sigil_core::{NodeService, SigilConfig};
//!
//! # async fn run() -> sigil_core::Result<()> {
//! let config = SigilConfig::default();
//! let service = NodeService::new(config)?;
//!
//! for node in service.list_nodes(None) {
//!     println!("{}: {} operations", node.id, node.operations.len());
//! }
//!
//! let reply = service
//!     .handle_json(r#"{"action": "get_signature_info", "user_id": "alice"}"#)
//!     .await;
//! println!("{}", reply);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod response;
pub mod service;
pub mod view;

pub use config::{CatalogConfig, CryptoConfig, SigilConfig, SignatureConfig};
pub use error::SigilError;
pub use response::{ErrorBody, Response};
pub use service::{NodeService, ParamReport, RebuildReport, Request};
pub use view::{
    AvailabilitySummary, AvailabilityView, EntryInfo, LiveStatus, LiveStatusSource,
    NoLiveStatus, NodeAvailability, OperationInfo, SignatureInfo, StaticLiveStatus,
};

pub use sigil_catalog::{CatalogFilter, NodeDescriptor, OperationCategory};
pub use sigil_signature::{AuthData, CredentialCipher, MasterKey};

/// Result type alias for Sigil operations.
pub type Result<T> = std::result::Result<T, SigilError>;
