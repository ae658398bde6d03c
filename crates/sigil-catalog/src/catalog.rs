//! # Capability Catalog
//!
//! An immutable, queryable snapshot of every [`NodeDescriptor`] built from
//! one scan of the definitions directory.
//!
//! ## Snapshot Model
//!
//! ```text
//!   scan + normalize ──► Catalog (immutable) ──► CatalogHandle::publish
//!                                                      │
//!         readers: handle.snapshot() ◄─────── Arc<Catalog> swapped atomically
//! ```
//!
//! A [`Catalog`] never changes after construction. A rebuild produces a new
//! catalog and [`CatalogHandle::publish`] replaces the shared reference in a
//! single write. Readers that already hold an `Arc<Catalog>` keep using the
//! old snapshot until they drop it; nobody ever observes a half-built map.
//!
//! ## Failure Isolation
//!
//! Per-file problems are collected in [`Catalog::scan_errors`]. Unreadable
//! files have no descriptor; unparseable files have an unparsed placeholder.
//! Either way every other node stays available.

use crate::error::{CatalogError, Result, ScanError, ScanErrorKind};
use crate::models::{NodeDescriptor, Operation, OperationCategory, SourceForm};
use crate::normalize::normalize;
use crate::scanner::{list_candidates, read_candidate, scan_dir, Candidate};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Optional filters for [`Catalog::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    /// Only nodes exposing at least one operation in this category.
    pub category: Option<OperationCategory>,
    /// Only nodes whose auth spec has at least one field.
    pub auth_required_only: bool,
}

/// One hit from [`Catalog::search_operations`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationMatch {
    pub node_id: String,
    pub operation: Operation,
}

/// One immutable catalog snapshot.
#[derive(Debug, Clone)]
pub struct Catalog {
    nodes: BTreeMap<String, NodeDescriptor>,
    scan_errors: Vec<ScanError>,
    built_at: DateTime<Utc>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::from_descriptors(Vec::new())
    }
}

impl Catalog {
    /// Builds a snapshot from already-normalized descriptors.
    ///
    /// Later descriptors with a duplicate id replace earlier ones.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = NodeDescriptor>) -> Self {
        let nodes = descriptors.into_iter().map(|d| (d.id.clone(), d)).collect();
        Self {
            nodes,
            scan_errors: Vec::new(),
            built_at: Utc::now(),
        }
    }

    /// Scans and normalizes the definitions directory on the calling thread.
    pub fn build(dir: &Path) -> Result<Self> {
        let batch = scan_dir(dir)?;
        let mut catalog = Self::from_descriptors(Vec::new());
        catalog.scan_errors = batch.errors;

        for raw in batch.definitions {
            let descriptor = normalize(&raw.id, &raw.content);
            catalog.record(descriptor, &raw.path);
        }

        catalog.log_summary(dir);
        Ok(catalog)
    }

    /// Scans and normalizes the definitions directory on a bounded pool of
    /// blocking tasks, merging results by id.
    ///
    /// Produces the same snapshot as [`Catalog::build`].
    pub async fn build_parallel(dir: &Path, workers: usize) -> Result<Self> {
        let (candidates, listing_errors) = list_candidates(dir)?;
        let permits = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                // A closed semaphore only means no throttling is left to do.
                let _permit = permits.acquire_owned().await.ok();
                tokio::task::spawn_blocking(move || load_one(candidate)).await
            });
        }

        let mut catalog = Self::from_descriptors(Vec::new());
        catalog.scan_errors = listing_errors;

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| CatalogError::Worker(e.to_string()))?
                .map_err(|e| CatalogError::Worker(e.to_string()))?;
            match outcome {
                Ok((descriptor, path)) => catalog.record(descriptor, &path),
                Err(err) => {
                    warn!("{}", err);
                    catalog.scan_errors.push(err);
                }
            }
        }

        // Completion order is arbitrary; keep reports reproducible.
        catalog
            .scan_errors
            .sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id)));
        catalog.log_summary(dir);
        Ok(catalog)
    }

    fn record(&mut self, descriptor: NodeDescriptor, path: &Path) {
        if let SourceForm::Unparsed { reason } = &descriptor.form {
            warn!("Definition '{}' could not be parsed: {}", descriptor.id, reason);
            self.scan_errors.push(ScanError::new(
                &descriptor.id,
                path,
                ScanErrorKind::Unparseable,
                reason.clone(),
            ));
        }
        self.nodes.insert(descriptor.id.clone(), descriptor);
    }

    fn log_summary(&self, dir: &Path) {
        info!(
            "Catalog built from {}: {} nodes, {} scan errors",
            dir.display(),
            self.nodes.len(),
            self.scan_errors.len()
        );
    }

    /// Lists descriptors in id order, optionally filtered.
    pub fn list(&self, filter: Option<&CatalogFilter>) -> Vec<&NodeDescriptor> {
        self.nodes
            .values()
            .filter(|d| match filter {
                None => true,
                Some(f) => {
                    f.category.map_or(true, |c| d.has_category(c))
                        && (!f.auth_required_only || d.capabilities.requires_auth)
                }
            })
            .collect()
    }

    /// Looks up a descriptor by id (case-insensitive).
    pub fn get(&self, id: &str) -> Result<&NodeDescriptor> {
        self.nodes
            .get(&id.trim().to_lowercase())
            .ok_or_else(|| CatalogError::NodeNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(&id.trim().to_lowercase())
    }

    /// All operations of one node.
    pub fn list_operations(&self, id: &str) -> Result<&[Operation]> {
        Ok(&self.get(id)?.operations)
    }

    /// Case-insensitive substring search over operation name, node id and
    /// operation description.
    pub fn search_operations(&self, query: &str) -> Vec<OperationMatch> {
        let needle = query.trim().to_lowercase();
        let mut hits = Vec::new();

        for node in self.nodes.values() {
            let id_hit = node.id.contains(&needle);
            for op in &node.operations {
                if id_hit
                    || op.name.to_lowercase().contains(&needle)
                    || op.description.to_lowercase().contains(&needle)
                {
                    hits.push(OperationMatch {
                        node_id: node.id.clone(),
                        operation: op.clone(),
                    });
                }
            }
        }

        debug!("Operation search '{}' matched {}", query, hits.len());
        hits
    }

    /// Details of one operation on one node.
    pub fn get_operation_details(&self, id: &str, operation: &str) -> Result<&Operation> {
        let node = self.get(id)?;
        node.operation(operation)
            .ok_or_else(|| CatalogError::OperationNotFound {
                node_type: node.id.clone(),
                operation: operation.to_string(),
            })
    }

    /// Per-file problems recorded while building this snapshot.
    pub fn scan_errors(&self) -> &[ScanError] {
        &self.scan_errors
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn load_one(candidate: Candidate) -> std::result::Result<(NodeDescriptor, std::path::PathBuf), ScanError> {
    let raw = read_candidate(&candidate)?;
    Ok((normalize(&raw.id, &raw.content), raw.path))
}

/// Shared reference to the current catalog snapshot.
///
/// Cloning the handle shares the same slot; every clone sees a publish.
#[derive(Debug, Clone, Default)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<Catalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// The snapshot current at the time of the call.
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the current snapshot. Returns the one it replaced.
    pub fn publish(&self, catalog: Catalog) -> Arc<Catalog> {
        let next = Arc::new(catalog);
        let previous = std::mem::replace(&mut *self.current.write(), next);
        info!("Published catalog snapshot with {} nodes", self.current.read().len());
        previous
    }
}
