//! # Sigil Integration Tests
//!
//! End-to-end tests through [`NodeService`] with real definition and store
//! directories.
//!
//! ## Coverage
//!
//! | Scenario | Component | Test |
//! |----------|-----------|------|
//! | Mixed definition forms | Catalog | `test_mixed_forms_build_one_catalog` |
//! | Corrupt definition isolated | Catalog | `test_corrupt_definition_is_isolated` |
//! | Whitelist regression | Signature | `test_single_operation_whitelist_survives_reload` |
//! | Credential pattern enforced | Signature | `test_credential_pattern_rejected` |
//! | Rebuild reconciles whitelist | Service | `test_rebuild_reconciles_default_user` |
//! | Availability join | View | `test_availability_reports_enabled_nodes` |
//! | Missing master key | Config | `test_missing_master_key_is_config_error` |

use serde_json::json;
use sigil_core::{AuthData, NodeService, SigilConfig, StaticLiveStatus};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const STRIPE: &str = r#"
# Payments
NODE_CONFIG = {
    'name': 'Stripe',
    'auth_type': 'api_key',
    'parameters': {
        'api_key': {'type': 'string', 'sensitive': True, 'required': True, 'pattern': '^sk_'},
        'currency': {'type': 'string', 'default': 'usd'},
    },
}

LIST_CHARGES = "list_charges"  # List charges
CREATE_CHARGE = "create_charge"
REFUND_CHARGE = "refund_charge"
"#;

const SLACK: &str = r#"
Node(name="Slack", description="Team chat")
Parameter(name="bot_token", type="secret", required=true, pattern="^xoxb-")
Parameter(name="channel", required=true)
Operation(name="post_message", description="Post a message")
Operation(name="list_channels")
"#;

fn write_definitions(dir: &Path) {
    fs::write(dir.join("stripe.py"), STRIPE).unwrap();
    fs::write(dir.join("slack.py"), SLACK).unwrap();
}

/// Creates a configuration rooted in a temporary directory.
fn test_config(root: &TempDir) -> SigilConfig {
    let defs = root.path().join("nodes");
    fs::create_dir_all(&defs).unwrap();
    write_definitions(&defs);

    let key = root.path().join("master.key");
    fs::write(&key, "integration passphrase").unwrap();

    let mut config = SigilConfig::default();
    config.catalog.definitions_dir = defs;
    config.catalog.scan_workers = 2;
    config.signature.store_dir = root.path().join("signatures");
    config.signature.default_user = "ops".to_string();
    config.crypto.key_file = Some(key);
    config
}

fn stripe_auth() -> AuthData {
    [("api_key", "sk_test_abc")].into_iter().collect()
}

// =============================================================================
// CATALOG
// =============================================================================

#[test]
fn test_mixed_forms_build_one_catalog() {
    let root = TempDir::new().unwrap();
    let service = NodeService::new(test_config(&root)).unwrap();

    let stripe = service.get_node("stripe").unwrap();
    assert_eq!(stripe.display_name, "Stripe");
    assert_eq!(stripe.operations.len(), 3);
    assert_eq!(stripe.auth_spec.fields[0].pattern.as_deref(), Some("^sk_"));

    let slack = service.get_node("slack").unwrap();
    assert_eq!(slack.description, "Team chat");
    assert!(slack.capabilities.requires_auth);

    let details = service.get_operation_details("stripe", "list_charges").unwrap();
    assert_eq!(details.description, "List charges");
}

#[test]
fn test_corrupt_definition_is_isolated() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    fs::write(config.catalog.definitions_dir.join("broken.py"), [0xFFu8, 0x00, 0xFE]).unwrap();

    let service = NodeService::new(config).unwrap();
    assert_eq!(service.list_nodes(None).len(), 2);
    assert_eq!(service.scan_errors().len(), 1);
}

// =============================================================================
// SIGNATURE
// =============================================================================

#[test]
fn test_single_operation_whitelist_survives_reload() {
    let root = TempDir::new().unwrap();
    let ops = vec!["list_charges".to_string()];

    {
        let service = NodeService::new(test_config(&root)).unwrap();
        service
            .add_node_to_signature(Some("alice"), "stripe", &stripe_auth(), BTreeMap::new(), Some(&ops))
            .unwrap();
    }

    let service = NodeService::new(test_config(&root)).unwrap();
    let info = service.get_signature_info(Some("alice"), Some("stripe")).unwrap();
    let names: Vec<_> = info.nodes[0].enabled_operations.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["list_charges"]);
}

#[test]
fn test_credential_pattern_rejected() {
    let root = TempDir::new().unwrap();
    let service = NodeService::new(test_config(&root)).unwrap();
    let bad: AuthData = [("bot_token", "xoxp-user"), ("channel", "general")].into_iter().collect();

    let err = service
        .add_node_to_signature(Some("alice"), "slack", &bad, BTreeMap::new(), None)
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(!err.to_string().contains("xoxp-user"));
    assert!(service.get_signature_info(Some("alice"), None).unwrap().nodes.is_empty());
}

// =============================================================================
// SERVICE
// =============================================================================

#[tokio::test]
async fn test_rebuild_reconciles_default_user() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let defs = config.catalog.definitions_dir.clone();
    let service = NodeService::new(config).unwrap();

    service
        .add_node_to_signature(None, "stripe", &stripe_auth(), BTreeMap::new(), None)
        .unwrap();

    fs::write(defs.join("stripe.py"), STRIPE.replace("REFUND_CHARGE = \"refund_charge\"\n", "")).unwrap();
    let reply = service.handle_json(r#"{"action": "rebuild_catalog"}"#).await;

    assert_eq!(reply["success"], json!(true), "{}", reply);
    assert_eq!(reply["data"]["nodes"], json!(2));
    assert_eq!(
        reply["data"]["reconcile"]["dropped_operations"],
        json!([["stripe", "refund_charge"]])
    );

    let info = service.get_signature_info(None, Some("stripe")).unwrap();
    assert_eq!(info.nodes[0].enabled_operations.len(), 2);
}

#[test]
fn test_availability_reports_enabled_nodes() {
    let root = TempDir::new().unwrap();
    let live = StaticLiveStatus::new().with_services("stripe", 1).with_flows("stripe", 3);
    let service = NodeService::new(test_config(&root))
        .unwrap()
        .with_live_status(Arc::new(live));

    service
        .add_node_to_signature(Some("alice"), "stripe", &stripe_auth(), BTreeMap::new(), None)
        .unwrap();

    let view = service.availability(Some("alice")).unwrap();
    let stripe = view.nodes.iter().find(|n| n.id == "stripe").unwrap();
    assert!(stripe.enabled && stripe.authenticated);
    assert_eq!(stripe.live.deployed_flows, 3);

    let summary = view.summary();
    assert_eq!(summary.nodes, 2);
    assert_eq!(summary.enabled, 1);
    assert_eq!(summary.running, 1);
}

// =============================================================================
// CONFIG
// =============================================================================

#[test]
fn test_missing_master_key_is_config_error() {
    let root = TempDir::new().unwrap();
    let mut config = test_config(&root);
    config.crypto.key_file = None;
    config.crypto.key_env = "SIGIL_INTEGRATION_KEY_NEVER_SET".to_string();

    let err = NodeService::new(config).err().unwrap();
    assert_eq!(err.code(), "CONFIG_ERROR");
}
