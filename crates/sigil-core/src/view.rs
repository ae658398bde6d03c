//! # Availability View
//!
//! Joins the catalog, one user's signature, and live runtime status into a
//! single per-node record.
//!
//! | Source | Contributes |
//! |--------|-------------|
//! | Catalog snapshot | id, display name, auth requirement, operation count |
//! | Signature document | enabled, authenticated, whitelisted operations |
//! | [`LiveStatusSource`] | running services, deployed flows |
//!
//! Nothing here carries ciphertext or decrypted credentials.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sigil_catalog::{Catalog, OperationCategory};
use sigil_signature::{SignatureDocument, SignatureEntry};
use std::collections::{BTreeMap, HashMap};

/// Runtime status provided by collaborators outside this crate.
pub trait LiveStatusSource: Send + Sync {
    fn running_services(&self, node_type: &str) -> u32;
    fn deployed_flows(&self, node_type: &str) -> u32;
}

/// Reports zero for everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLiveStatus;

impl LiveStatusSource for NoLiveStatus {
    fn running_services(&self, _node_type: &str) -> u32 {
        0
    }

    fn deployed_flows(&self, _node_type: &str) -> u32 {
        0
    }
}

/// Fixed counts per node type.
#[derive(Debug, Clone, Default)]
pub struct StaticLiveStatus {
    services: HashMap<String, u32>,
    flows: HashMap<String, u32>,
}

impl StaticLiveStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(mut self, node_type: &str, count: u32) -> Self {
        self.services.insert(node_type.to_string(), count);
        self
    }

    pub fn with_flows(mut self, node_type: &str, count: u32) -> Self {
        self.flows.insert(node_type.to_string(), count);
        self
    }
}

impl LiveStatusSource for StaticLiveStatus {
    fn running_services(&self, node_type: &str) -> u32 {
        self.services.get(node_type).copied().unwrap_or(0)
    }

    fn deployed_flows(&self, node_type: &str) -> u32 {
        self.flows.get(node_type).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LiveStatus {
    pub running_services: u32,
    pub deployed_flows: u32,
}

/// One node as seen by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAvailability {
    pub id: String,
    pub display_name: String,
    pub requires_auth: bool,
    pub operation_count: usize,
    pub enabled: bool,
    pub authenticated: bool,
    pub enabled_operations: Vec<String>,
    pub live: LiveStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AvailabilitySummary {
    pub nodes: usize,
    pub enabled: usize,
    pub authenticated: usize,
    pub running: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityView {
    pub user_id: String,
    pub catalog_built_at: DateTime<Utc>,
    pub nodes: Vec<NodeAvailability>,
}

impl AvailabilityView {
    /// Builds the view in catalog order.
    pub fn build(
        catalog: &Catalog,
        user_id: &str,
        doc: &SignatureDocument,
        live: &dyn LiveStatusSource,
    ) -> Self {
        let nodes = catalog
            .list(None)
            .into_iter()
            .map(|node| {
                let entry = doc.entry(&node.id);
                NodeAvailability {
                    id: node.id.clone(),
                    display_name: node.display_name.clone(),
                    requires_auth: node.capabilities.requires_auth,
                    operation_count: node.operations.len(),
                    enabled: entry.map_or(false, |e| e.enabled),
                    authenticated: entry.map_or(false, SignatureEntry::is_authenticated),
                    enabled_operations: entry
                        .map(|e| e.enabled_operations.keys().cloned().collect())
                        .unwrap_or_default(),
                    live: LiveStatus {
                        running_services: live.running_services(&node.id),
                        deployed_flows: live.deployed_flows(&node.id),
                    },
                }
            })
            .collect();

        Self {
            user_id: user_id.to_string(),
            catalog_built_at: catalog.built_at(),
            nodes,
        }
    }

    pub fn summary(&self) -> AvailabilitySummary {
        AvailabilitySummary {
            nodes: self.nodes.len(),
            enabled: self.nodes.iter().filter(|n| n.enabled).count(),
            authenticated: self.nodes.iter().filter(|n| n.authenticated).count(),
            running: self
                .nodes
                .iter()
                .filter(|n| n.live.running_services > 0)
                .count(),
        }
    }
}

/// Credential-free projection of a signature document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureInfo {
    pub user_id: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub nodes: Vec<EntryInfo>,
}

/// Credential-free projection of one signature entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub node_type: String,
    pub enabled: bool,
    pub authenticated: bool,
    pub added_at: DateTime<Utc>,
    pub defaults: BTreeMap<String, String>,
    pub enabled_operations: Vec<OperationInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationInfo {
    pub name: String,
    pub category: OperationCategory,
    pub description: String,
}

impl From<&SignatureEntry> for EntryInfo {
    fn from(entry: &SignatureEntry) -> Self {
        Self {
            node_type: entry.node_type.clone(),
            enabled: entry.enabled,
            authenticated: entry.is_authenticated(),
            added_at: entry.added_at,
            defaults: entry.defaults.clone(),
            enabled_operations: entry
                .enabled_operations
                .iter()
                .map(|(name, op)| OperationInfo {
                    name: name.clone(),
                    category: op.category,
                    description: op.description.clone(),
                })
                .collect(),
        }
    }
}

impl SignatureInfo {
    /// Projects a document, optionally narrowed to one node type.
    pub fn project(user_id: &str, doc: &SignatureDocument, node_type: Option<&str>) -> Self {
        let nodes = doc
            .entries
            .values()
            .filter(|e| node_type.map_or(true, |n| e.node_type == n))
            .map(EntryInfo::from)
            .collect();
        Self {
            user_id: user_id.to_string(),
            version: doc.version.clone(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_catalog::normalize;
    use sigil_signature::EnabledOperation;

    fn catalog() -> Catalog {
        Catalog::from_descriptors([
            normalize("slack", "Parameter(name=\"bot_token\", type=\"secret\")\nOperation(name=\"post_message\")\nOperation(name=\"list_channels\")"),
            normalize("rss", "Operation(name=\"read_feed\")"),
        ])
    }

    fn doc() -> SignatureDocument {
        let now = Utc::now();
        let mut doc = SignatureDocument::empty(now);
        doc.entries.insert(
            "slack".to_string(),
            SignatureEntry {
                node_type: "slack".to_string(),
                enabled: true,
                added_at: now,
                encrypted_auth: vec![1u8; 40],
                defaults: BTreeMap::new(),
                enabled_operations: [(
                    "post_message".to_string(),
                    EnabledOperation {
                        category: OperationCategory::Create,
                        description: String::new(),
                    },
                )]
                .into_iter()
                .collect(),
            },
        );
        doc
    }

    #[test]
    fn test_view_joins_sources() {
        let live = StaticLiveStatus::new().with_services("slack", 2).with_flows("slack", 1);
        let view = AvailabilityView::build(&catalog(), "alice", &doc(), &live);

        let rss = &view.nodes[0];
        assert_eq!(rss.id, "rss");
        assert!(!rss.enabled && !rss.authenticated && !rss.requires_auth);

        let slack = &view.nodes[1];
        assert!(slack.enabled && slack.authenticated && slack.requires_auth);
        assert_eq!(slack.operation_count, 2);
        assert_eq!(slack.enabled_operations, vec!["post_message"]);
        assert_eq!(slack.live.running_services, 2);

        let summary = view.summary();
        assert_eq!(summary.nodes, 2);
        assert_eq!(summary.enabled, 1);
        assert_eq!(summary.running, 1);
    }

    #[test]
    fn test_projections_carry_no_ciphertext() {
        let info = SignatureInfo::project("alice", &doc(), None);
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("encrypted"));
        assert_eq!(info.nodes.len(), 1);
        assert!(SignatureInfo::project("alice", &doc(), Some("rss")).nodes.is_empty());

        let view = AvailabilityView::build(&catalog(), "alice", &doc(), &NoLiveStatus);
        assert!(!serde_json::to_string(&view).unwrap().contains("encrypted"));
    }
}
