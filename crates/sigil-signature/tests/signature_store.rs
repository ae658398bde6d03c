//! # Signature Store Integration Tests
//!
//! Exercises the mutator against a real catalog directory and store root.
//!
//! | Scenario | Test |
//! |----------|------|
//! | Whitelist persisted exactly | `test_single_operation_whitelist_is_exact` |
//! | Omitted whitelist enables all | `test_omitted_operations_enable_full_set` |
//! | Failed mutation is fail-closed | `test_invalid_operation_leaves_document_unchanged` |
//! | Bad credentials are fail-closed | `test_invalid_auth_leaves_document_unchanged` |
//! | Removing absent node | `test_remove_absent_node_is_noop` |
//! | Concurrent adds | `test_concurrent_adds_lose_nothing` |
//! | Secrets never on disk | `test_plaintext_never_written` |
//! | Corrupt vs absent document | `test_corrupt_document_is_not_empty` |
//! | Unusual operation names read back | `test_edge_operation_names_read_back` |
//! | Credential defaults rejected on add | `test_add_rejects_credential_defaults` |
//! | Credential defaults rejected on update | `test_update_rejects_credential_defaults` |

use sigil_catalog::{Catalog, CatalogHandle};
use sigil_signature::{
    AuthData, CredentialCipher, MasterKey, RetryPolicy, SignatureError, SignatureMutator,
    SignatureStore,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const ACTIONNETWORK_OPERATIONS: [&str; 23] = [
    "list_people",
    "get_person",
    "create_person",
    "update_person",
    "list_events",
    "get_event",
    "create_event",
    "update_event",
    "list_petitions",
    "get_petition",
    "create_petition",
    "update_petition",
    "list_forms",
    "get_form",
    "create_form",
    "list_tags",
    "add_tag",
    "delete_tagging",
    "list_donations",
    "get_donation",
    "list_messages",
    "create_message",
    "send_message",
];

fn write_definitions(dir: &Path) {
    let mut an = String::from(
        r#"NODE_CONFIG = {
    "name": "Action Network",
    "auth_type": "api_key",
    "parameters": {
        "api_key": {"type": "string", "sensitive": True, "required": True},
        "group": {"type": "string", "required": False},
    },
}
"#,
    );
    for op in ACTIONNETWORK_OPERATIONS {
        an.push_str(&format!("{} = \"{}\"\n", op.to_uppercase(), op));
    }
    fs::write(dir.join("actionnetwork.py"), an).unwrap();

    fs::write(
        dir.join("openai.py"),
        r#"
Node(name="OpenAI")
Parameter(name="api_key", type="secret", required=true, pattern="^sk-")
Operation(name="create_completion")
Operation(name="list_models")
"#,
    )
    .unwrap();

    fs::write(
        dir.join("mail.py"),
        r#"
Parameter(name="password", type="secret", required=true)
Parameter(name="folder")
Operation(name="List-Inbox.v2")
Operation(name="send_email")
Operation(name="A")
"#,
    )
    .unwrap();

    fs::write(
        dir.join("spacey.py"),
        "Parameter(name=\"token\", type=\"secret\")\nOperation(name=\"send email\")\n",
    )
    .unwrap();

    for i in 0..8 {
        fs::write(
            dir.join(format!("svc{}.py", i)),
            "Parameter(name=\"token\", type=\"secret\", required=true)\nOperation(name=\"get_item\")\n",
        )
        .unwrap();
    }
}

struct Fixture {
    _defs: TempDir,
    _store: TempDir,
    mutator: SignatureMutator,
}

fn fixture() -> Fixture {
    let defs = TempDir::new().unwrap();
    write_definitions(defs.path());
    let store_dir = TempDir::new().unwrap();

    let catalog = CatalogHandle::new(Catalog::build(defs.path()).unwrap());
    let store = Arc::new(SignatureStore::open(store_dir.path(), Duration::from_secs(5)).unwrap());
    let cipher = Arc::new(CredentialCipher::new(MasterKey::from_passphrase(b"integration")));
    let mutator = SignatureMutator::new(catalog, store, cipher).with_retry(RetryPolicy {
        max_retries: 5,
        backoff: Duration::from_millis(10),
    });

    Fixture {
        _defs: defs,
        _store: store_dir,
        mutator,
    }
}

fn an_auth() -> AuthData {
    [("api_key", "osdi-key-123")].into_iter().collect()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_single_operation_whitelist_is_exact() {
    let f = fixture();
    f.mutator
        .add_node("alice", "actionnetwork", &an_auth(), BTreeMap::new(), Some(&names(&["list_people"])))
        .unwrap();

    let doc = f.mutator.store().get("alice").unwrap();
    let entry = doc.entry("actionnetwork").unwrap();
    assert_eq!(entry.enabled_operations.len(), 1);
    assert!(entry.allows("list_people"));
    assert!(!entry.allows("delete_tagging"));
}

#[test]
fn test_omitted_operations_enable_full_set() {
    let f = fixture();
    f.mutator
        .add_node("alice", "actionnetwork", &an_auth(), BTreeMap::new(), None)
        .unwrap();

    let doc = f.mutator.store().get("alice").unwrap();
    assert_eq!(doc.entry("actionnetwork").unwrap().enabled_operations.len(), 23);
}

#[test]
fn test_invalid_operation_leaves_document_unchanged() {
    let f = fixture();
    f.mutator
        .add_node("alice", "actionnetwork", &an_auth(), BTreeMap::new(), Some(&names(&["list_people"])))
        .unwrap();
    let before = f.mutator.store().read_raw("alice").unwrap();

    let result = f.mutator.set_operations(
        "alice",
        "actionnetwork",
        &names(&["list_people", "drop_database", "fly"]),
    );
    match result {
        Err(SignatureError::Validation { invalid, .. }) => {
            assert_eq!(invalid, vec!["drop_database", "fly"]);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(f.mutator.store().read_raw("alice").unwrap(), before);

    let readd = f.mutator.add_node(
        "alice",
        "actionnetwork",
        &an_auth(),
        BTreeMap::new(),
        Some(&names(&["nope"])),
    );
    assert!(readd.is_err());
    assert_eq!(f.mutator.store().read_raw("alice").unwrap(), before);
}

#[test]
fn test_invalid_auth_leaves_document_unchanged() {
    let f = fixture();
    let bad: AuthData = [("api_key", "pk-wrong")].into_iter().collect();
    let result = f.mutator.add_node("alice", "openai", &bad, BTreeMap::new(), None);

    match result {
        Err(SignatureError::Validation { invalid, message }) => {
            assert_eq!(invalid, vec!["api_key"]);
            assert!(!message.contains("pk-wrong"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(f.mutator.store().read_raw("alice").unwrap().is_none());

    let unknown = f.mutator.add_node("alice", "nonexistent", &an_auth(), BTreeMap::new(), None);
    assert!(matches!(unknown, Err(SignatureError::NotFound(_))));
}

#[test]
fn test_remove_absent_node_is_noop() {
    let f = fixture();
    assert!(!f.mutator.remove_node("alice", "openai").unwrap());
    assert!(f.mutator.store().read_raw("alice").unwrap().is_none());

    f.mutator
        .add_node("alice", "actionnetwork", &an_auth(), BTreeMap::new(), None)
        .unwrap();
    let before = f.mutator.store().read_raw("alice").unwrap();
    assert!(!f.mutator.remove_node("alice", "openai").unwrap());
    assert_eq!(f.mutator.store().read_raw("alice").unwrap(), before);

    assert!(f.mutator.remove_node("alice", "actionnetwork").unwrap());
    assert!(f.mutator.store().get("alice").unwrap().entries.is_empty());
}

#[test]
fn test_concurrent_adds_lose_nothing() {
    let f = fixture();
    let mutator = Arc::new(f.mutator.clone());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let m = Arc::clone(&mutator);
            thread::spawn(move || {
                let auth: AuthData = [("token", format!("tok-{}", i))].into_iter().collect();
                m.add_node("alice", &format!("svc{}", i), &auth, BTreeMap::new(), None)
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap().unwrap();
    }

    let doc = mutator.store().get("alice").unwrap();
    assert_eq!(doc.entries.len(), 8);
    for i in 0..8 {
        let creds = mutator.decrypt_auth("alice", &format!("svc{}", i)).unwrap();
        assert_eq!(creds.get("token"), Some(format!("tok-{}", i).as_str()));
    }
}

#[test]
fn test_plaintext_never_written() {
    let f = fixture();
    let auth: AuthData = [("api_key", "sk-super-secret-value")].into_iter().collect();
    f.mutator
        .add_node("alice", "openai", &auth, BTreeMap::new(), None)
        .unwrap();

    let raw = f.mutator.store().read_raw("alice").unwrap().unwrap();
    let text = String::from_utf8(raw).unwrap();
    assert!(!text.contains("sk-super-secret-value"));
    assert!(text.contains("[signature]"));
}

#[test]
fn test_corrupt_document_is_not_empty() {
    let f = fixture();
    assert!(f.mutator.store().get("bob").unwrap().entries.is_empty());

    let path = f.mutator.store().document_path("bob").unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "[signature]\nversion = \"1.0\"\n").unwrap();

    assert!(matches!(
        f.mutator.store().get("bob"),
        Err(SignatureError::Integrity { .. })
    ));
    let add = f.mutator.add_node("bob", "actionnetwork", &an_auth(), BTreeMap::new(), None);
    assert!(matches!(add, Err(SignatureError::Integrity { .. })));
    assert_eq!(fs::read_to_string(&path).unwrap(), "[signature]\nversion = \"1.0\"\n");
}

#[test]
fn test_edge_operation_names_read_back() {
    let f = fixture();
    let auth: AuthData = [("password", "hunter2")].into_iter().collect();
    let entry = f
        .mutator
        .add_node("alice", "mail", &auth, BTreeMap::new(), None)
        .unwrap();
    assert_eq!(entry.enabled_operations.len(), 3);

    let doc = f.mutator.store().get("alice").unwrap();
    let names: Vec<_> = doc.entries["mail"].operation_names().into_iter().collect();
    assert_eq!(names, vec!["A", "List-Inbox.v2", "send_email"]);

    // A name outside the grammar leaves the definition unparsed, never in a whitelist.
    let spacey = f
        .mutator
        .add_node("alice", "spacey", &AuthData::default(), BTreeMap::new(), None)
        .unwrap();
    assert!(spacey.enabled_operations.is_empty());
    assert_eq!(f.mutator.store().get("alice").unwrap().entries.len(), 2);
    assert!(f.mutator.remove_node("alice", "mail").unwrap());
}

#[test]
fn test_add_rejects_credential_defaults() {
    let f = fixture();
    let auth: AuthData = [("api_key", "sk-x")].into_iter().collect();
    let defaults: BTreeMap<_, _> = [("api_key".to_string(), "sk-PLAINTEXT".to_string())]
        .into_iter()
        .collect();

    match f.mutator.add_node("alice", "openai", &auth, defaults, None) {
        Err(SignatureError::Validation { invalid, message }) => {
            assert_eq!(invalid, vec!["api_key"]);
            assert!(!message.contains("sk-PLAINTEXT"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(f.mutator.store().read_raw("alice").unwrap().is_none());
}

#[test]
fn test_update_rejects_credential_defaults() {
    let f = fixture();
    let auth: AuthData = [("password", "hunter2")].into_iter().collect();
    f.mutator
        .add_node("alice", "mail", &auth, BTreeMap::new(), None)
        .unwrap();
    let before = f.mutator.store().read_raw("alice").unwrap();

    let defaults: BTreeMap<_, _> = [
        ("folder".to_string(), "INBOX".to_string()),
        ("Password".to_string(), "hunter3".to_string()),
    ]
    .into_iter()
    .collect();
    let result = f.mutator.update_defaults("alice", "mail", defaults);
    assert!(matches!(result, Err(SignatureError::Validation { .. })));
    assert_eq!(f.mutator.store().read_raw("alice").unwrap(), before);

    let text = String::from_utf8(before.unwrap()).unwrap();
    assert!(!text.contains("hunter"));
}
