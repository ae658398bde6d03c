//! # Sigil Catalog - Node Capability Catalog
//!
//! Turns a directory of heterogeneous node definition files into one
//! normalized, queryable catalog of integration capabilities, and derives the
//! credential requirements of every node.
//!
//! ## Purpose
//!
//! 1. **Definition Scanning** - Reads one file per node type in lexical order,
//!    isolating unreadable files.
//!
//! 2. **Schema Normalization** - Detects which of two incompatible definition
//!    patterns a file uses and converts it into a [`NodeDescriptor`].
//!
//! 3. **Auth Extraction** - Derives an [`AuthSpec`] (credential fields, patterns,
//!    auth type) from each descriptor.
//!
//! 4. **Snapshot Catalog** - Serves list/get/search queries from an immutable
//!    snapshot that is swapped atomically on rebuild.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          SIGIL CATALOG                            │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                                                                   │
//! │  definitions/        ┌────────────┐     ┌──────────────────────┐  │
//! │  ├─ slack.py   ───►  │  Scanner   │ ──► │     Normalizer       │  │
//! │  ├─ stripe.py        │ (lexical)  │     │  detect_form         │  │
//! │  └─ broken.py        └─────┬──────┘     │  ├─ inline config    │  │
//! │                            │            │  └─ declarative      │  │
//! │                      ScanError          └──────────┬───────────┘  │
//! │                      (isolated)                    │              │
//! │                                                    ▼              │
//! │  ┌──────────────────────┐            ┌──────────────────────┐     │
//! │  │   CatalogHandle      │ ◄───────── │  Catalog snapshot    │     │
//! │  │  (atomic swap)       │  publish   │  + auth extraction   │     │
//! │  └──────────────────────┘            └──────────────────────┘     │
//! │                                                                   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sigil_catalog::{Catalog, CatalogFilter, CatalogHandle, OperationCategory};
//! use std::path::Path;
//!
//! let catalog = Catalog::build(Path::new("./nodes")).unwrap();
//! for err in catalog.scan_errors() {
//!     eprintln!("skipped: {}", err);
//! }
//!
//! let handle = CatalogHandle::new(catalog);
//! let snapshot = handle.snapshot();
//!
//! let readers = CatalogFilter {
//!     category: Some(OperationCategory::Read),
//!     auth_required_only: true,
//! };
//! for node in snapshot.list(Some(&readers)) {
//!     println!("{} needs {:?}", node.id, node.auth_spec.auth_type);
//! }
//! ```

pub mod auth;
pub mod catalog;
pub mod error;
pub mod models;
pub mod normalize;
pub mod scanner;

pub use auth::{extract_auth_spec, is_credential_name};
pub use catalog::{Catalog, CatalogFilter, CatalogHandle, OperationMatch};
pub use error::{CatalogError, Result, ScanError, ScanErrorKind};
pub use models::{
    AuthField, AuthSpec, AuthType, Capabilities, NodeDescriptor, Operation, OperationCategory,
    ParameterSpec, ParameterType, SourceForm,
};
pub use normalize::{detect_form, normalize, DefinitionForm};
