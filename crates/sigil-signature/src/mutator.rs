//! # Signature Mutator
//!
//! Validated, atomic changes to a user's signature.
//!
//! ## Mutation Pipeline
//!
//! ```text
//!   request ─► catalog snapshot ─► auth check ─► operation whitelist ─► encrypt
//!                  │ NotFound          │ Validation      │ Validation
//!                  ▼                   ▼                 ▼
//!               (reject)           (reject)          (reject)
//!                                                         │
//!                                                         ▼
//!                                store.transaction(user) ─► temp file ─► rename
//! ```
//!
//! Every check runs before the transaction opens, so a rejected request never
//! touches the document. Operation lists are strict: one unknown name rejects
//! the whole request and every unknown name is reported.

use crate::crypto::{AuthData, CredentialCipher};
use crate::document::{EnabledOperation, SignatureEntry};
use crate::error::{Result, SignatureError};
use crate::store::{Commit, SignatureStore};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use sigil_catalog::{is_credential_name, AuthSpec, CatalogHandle, NodeDescriptor};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry policy for lock contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Attempt `n` waits `backoff * n` before retrying.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Outcome of [`SignatureMutator::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// `(node_type, operation)` pairs removed from whitelists.
    pub dropped_operations: Vec<(String, String)>,
    /// Entries whose node type is no longer in the catalog. They are kept.
    pub orphaned_nodes: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.dropped_operations.is_empty() && self.orphaned_nodes.is_empty()
    }
}

/// Applies validated mutations to signature documents.
#[derive(Debug, Clone)]
pub struct SignatureMutator {
    catalog: CatalogHandle,
    store: Arc<SignatureStore>,
    cipher: Arc<CredentialCipher>,
    retry: RetryPolicy,
}

impl SignatureMutator {
    pub fn new(catalog: CatalogHandle, store: Arc<SignatureStore>, cipher: Arc<CredentialCipher>) -> Self {
        Self {
            catalog,
            store,
            cipher,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &SignatureStore {
        &self.store
    }

    /// Enables a node for a user, or re-configures it if already enabled.
    ///
    /// # Arguments
    ///
    /// * `auth` - Credential values, validated against the node's auth spec
    /// * `defaults` - Non-secret parameter defaults stored in clear. Keys that
    ///   name credential fields are rejected
    /// * `operations` - `None` enables every operation; `Some` enables exactly
    ///   those names, which must all exist
    ///
    /// # Errors
    ///
    /// - `NotFound` if the node type is not in the catalog
    /// - `Validation` naming missing or malformed auth fields, credential
    ///   defaults, or unknown operations
    /// - `Concurrency` if the user's lock stays busy through every retry
    pub fn add_node(
        &self,
        user_id: &str,
        node_type: &str,
        auth: &AuthData,
        defaults: BTreeMap<String, String>,
        operations: Option<&[String]>,
    ) -> Result<SignatureEntry> {
        let snapshot = self.catalog.snapshot();
        let node = snapshot.get(node_type)?;

        validate_auth(&node.id, &node.auth_spec, auth)?;
        validate_defaults(&node.id, &node.auth_spec, &defaults)?;
        let enabled_operations = resolve_operations(node, operations)?;
        let encrypted_auth = self.cipher.encrypt(user_id, &node.id, auth)?;

        let entry = self.retrying(user_id, || {
            self.store.transaction(user_id, |doc| {
                let now = Utc::now();
                let added_at = doc.entry(&node.id).map(|e| e.added_at).unwrap_or(now);
                let entry = SignatureEntry {
                    node_type: node.id.clone(),
                    enabled: true,
                    added_at,
                    encrypted_auth: encrypted_auth.clone(),
                    defaults: defaults.clone(),
                    enabled_operations: enabled_operations.clone(),
                };

                let mut next = doc.clone();
                next.entries.insert(node.id.clone(), entry.clone());
                next.updated_at = now;
                Ok(Commit::Write(next, entry))
            })
        })?;

        info!(
            "Enabled node '{}' for '{}' with {} operations",
            node.id,
            user_id,
            entry.enabled_operations.len()
        );
        Ok(entry)
    }

    /// Removes a node from a user's signature.
    ///
    /// Returns `false` without writing when the node was not present.
    pub fn remove_node(&self, user_id: &str, node_type: &str) -> Result<bool> {
        let key = node_type.trim().to_lowercase();
        let removed = self.retrying(user_id, || {
            self.store.transaction(user_id, |doc| {
                if doc.entry(&key).is_none() {
                    return Ok(Commit::Skip(false));
                }
                let mut next = doc.clone();
                next.entries.remove(&key);
                next.updated_at = Utc::now();
                Ok(Commit::Write(next, true))
            })
        })?;

        if removed {
            info!("Removed node '{}' from '{}'", key, user_id);
        } else {
            debug!("Node '{}' not in signature for '{}', nothing to remove", key, user_id);
        }
        Ok(removed)
    }

    /// Merges `defaults` into an existing entry.
    ///
    /// Credential keys are rejected the same way as in
    /// [`SignatureMutator::add_node`]. An entry whose node has left the
    /// catalog is still checked by name.
    pub fn update_defaults(
        &self,
        user_id: &str,
        node_type: &str,
        defaults: BTreeMap<String, String>,
    ) -> Result<SignatureEntry> {
        let key = node_type.trim().to_lowercase();
        let snapshot = self.catalog.snapshot();
        let spec = snapshot
            .get(&key)
            .map(|node| node.auth_spec.clone())
            .unwrap_or_else(|_| AuthSpec::none());
        validate_defaults(&key, &spec, &defaults)?;

        let entry = self.retrying(user_id, || {
            self.store.transaction(user_id, |doc| {
                let current = doc
                    .entry(&key)
                    .ok_or_else(|| not_in_signature(user_id, &key))?;

                let mut entry = current.clone();
                entry.defaults.extend(defaults.clone());
                if entry == *current {
                    return Ok(Commit::Skip(entry));
                }

                let mut next = doc.clone();
                next.entries.insert(key.clone(), entry.clone());
                next.updated_at = Utc::now();
                Ok(Commit::Write(next, entry))
            })
        })?;

        info!("Updated defaults of '{}' for '{}'", key, user_id);
        Ok(entry)
    }

    /// Replaces the operation whitelist of an existing entry.
    ///
    /// The new list is validated the same way as in [`SignatureMutator::add_node`].
    pub fn set_operations(
        &self,
        user_id: &str,
        node_type: &str,
        operations: &[String],
    ) -> Result<SignatureEntry> {
        let snapshot = self.catalog.snapshot();
        let node = snapshot.get(node_type)?;
        let enabled_operations = resolve_operations(node, Some(operations))?;

        let entry = self.retrying(user_id, || {
            self.store.transaction(user_id, |doc| {
                let current = doc
                    .entry(&node.id)
                    .ok_or_else(|| not_in_signature(user_id, &node.id))?;

                let mut entry = current.clone();
                entry.enabled_operations = enabled_operations.clone();
                if entry == *current {
                    return Ok(Commit::Skip(entry));
                }

                let mut next = doc.clone();
                next.entries.insert(node.id.clone(), entry.clone());
                next.updated_at = Utc::now();
                Ok(Commit::Write(next, entry))
            })
        })?;

        info!(
            "Set {} operations on '{}' for '{}'",
            entry.enabled_operations.len(),
            node.id,
            user_id
        );
        Ok(entry)
    }

    /// Drops whitelisted operations the current catalog no longer offers.
    ///
    /// Entries whose node type disappeared are left in place and reported.
    pub fn reconcile(&self, user_id: &str) -> Result<ReconcileReport> {
        let snapshot = self.catalog.snapshot();

        let report = self.retrying(user_id, || {
            self.store.transaction(user_id, |doc| {
                let mut report = ReconcileReport::default();
                let mut next = doc.clone();

                for (id, entry) in next.entries.iter_mut() {
                    let Ok(node) = snapshot.get(id) else {
                        report.orphaned_nodes.push(id.clone());
                        continue;
                    };
                    let offered = node.operation_names();
                    entry.enabled_operations.retain(|op, _| {
                        let keep = offered.contains(op);
                        if !keep {
                            report.dropped_operations.push((id.clone(), op.clone()));
                        }
                        keep
                    });
                }

                if report.dropped_operations.is_empty() {
                    return Ok(Commit::Skip(report));
                }
                next.updated_at = Utc::now();
                Ok(Commit::Write(next, report))
            })
        })?;

        if !report.is_clean() {
            warn!(
                "Reconciled signature for '{}': {} operations dropped, {} orphaned nodes",
                user_id,
                report.dropped_operations.len(),
                report.orphaned_nodes.len()
            );
        }
        Ok(report)
    }

    /// Decrypts the stored credentials of one entry.
    ///
    /// For execution layers only. Never route the result to a query surface.
    pub fn decrypt_auth(&self, user_id: &str, node_type: &str) -> Result<AuthData> {
        let key = node_type.trim().to_lowercase();
        let doc = self.store.get(user_id)?;
        let entry = doc.entry(&key).ok_or_else(|| not_in_signature(user_id, &key))?;
        self.cipher.decrypt(user_id, &key, &entry.encrypted_auth)
    }

    fn retrying<T>(&self, user_id: &str, mut attempt: impl FnMut() -> Result<T>) -> Result<T> {
        let mut tries = 0u32;
        loop {
            match attempt() {
                Err(SignatureError::Concurrency { .. }) if tries < self.retry.max_retries => {
                    tries += 1;
                    warn!(
                        "Signature for '{}' busy, retry {}/{}",
                        user_id, tries, self.retry.max_retries
                    );
                    std::thread::sleep(self.retry.backoff * tries);
                }
                other => return other,
            }
        }
    }
}

fn not_in_signature(user_id: &str, node_type: &str) -> SignatureError {
    SignatureError::NotFound(format!(
        "node '{}' is not in the signature of '{}'",
        node_type, user_id
    ))
}

/// Checks credential values against a node's auth spec.
///
/// Required fields must be present and non-blank. Any supplied value for a
/// field with a pattern must match it. The error lists field names only.
pub fn validate_auth(node_type: &str, spec: &AuthSpec, auth: &AuthData) -> Result<()> {
    let mut missing = Vec::new();
    let mut invalid = Vec::new();

    for field in &spec.fields {
        let value = auth.get(&field.field).filter(|v| !v.trim().is_empty());
        match value {
            None if field.required => missing.push(field.field.clone()),
            None => {}
            Some(value) => {
                if let Some(pattern) = &field.pattern {
                    let matches = match Regex::new(pattern) {
                        Ok(re) => re.is_match(value),
                        Err(e) => {
                            warn!(
                                "Node '{}' declares an invalid pattern for '{}': {}",
                                node_type, field.field, e
                            );
                            false
                        }
                    };
                    if !matches {
                        invalid.push(field.field.clone());
                    }
                }
            }
        }
    }

    if missing.is_empty() && invalid.is_empty() {
        return Ok(());
    }

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing {}", missing.join(", ")));
    }
    if !invalid.is_empty() {
        parts.push(format!("malformed {}", invalid.join(", ")));
    }
    let fields = missing.into_iter().chain(invalid).collect();
    Err(SignatureError::validation(
        format!("credentials for '{}': {}", node_type, parts.join("; ")),
        fields,
    ))
}

/// Rejects parameter defaults that would store credential material in clear.
///
/// A key is a credential when it names a field of `spec` (case-insensitive)
/// or contains a credential keyword. The error lists key names only.
pub fn validate_defaults(
    node_type: &str,
    spec: &AuthSpec,
    defaults: &BTreeMap<String, String>,
) -> Result<()> {
    let secret: Vec<String> = defaults
        .keys()
        .filter(|key| {
            is_credential_name(key)
                || spec.fields.iter().any(|f| f.field.eq_ignore_ascii_case(key))
        })
        .cloned()
        .collect();

    if secret.is_empty() {
        return Ok(());
    }
    Err(SignatureError::validation(
        format!(
            "defaults for '{}' name credential fields: {}",
            node_type,
            secret.join(", ")
        ),
        secret,
    ))
}

/// Turns a requested operation list into the whitelist to persist.
///
/// `None` selects every operation. An explicit list must name only
/// operations the node offers; duplicates collapse. An explicit empty list
/// enables nothing.
pub fn resolve_operations(
    node: &NodeDescriptor,
    requested: Option<&[String]>,
) -> Result<BTreeMap<String, EnabledOperation>> {
    let Some(requested) = requested else {
        return Ok(node
            .operations
            .iter()
            .map(|op| (op.name.clone(), EnabledOperation::from(op)))
            .collect());
    };

    let mut resolved = BTreeMap::new();
    let mut unknown: Vec<String> = Vec::new();
    for name in requested.iter().map(|n| n.trim()) {
        match node.operation(name) {
            Some(op) => {
                resolved.insert(op.name.clone(), EnabledOperation::from(op));
            }
            None if !unknown.iter().any(|u| u == name) => unknown.push(name.to_string()),
            None => {}
        }
    }

    if !unknown.is_empty() {
        return Err(SignatureError::validation(
            format!(
                "unknown operations for node '{}': {}",
                node.id,
                unknown.join(", ")
            ),
            unknown,
        ));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_catalog::normalize;

    fn node() -> NodeDescriptor {
        normalize(
            "openai",
            r#"
Parameter(name="api_key", type="secret", required=true, pattern="^sk-")
Parameter(name="organization", type="secret")
Operation(name="create_completion")
Operation(name="list_models")
"#,
        )
    }

    fn names(ops: &BTreeMap<String, EnabledOperation>) -> Vec<&str> {
        ops.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_auth_accepts_valid_credentials() {
        let n = node();
        let auth: AuthData = [("api_key", "sk-abc")].into_iter().collect();
        assert!(validate_auth(&n.id, &n.auth_spec, &auth).is_ok());
    }

    #[test]
    fn test_auth_reports_missing_and_malformed() {
        let n = node();
        let auth: AuthData = [("api_key", "pk-abc")].into_iter().collect();
        match validate_auth(&n.id, &n.auth_spec, &auth) {
            Err(SignatureError::Validation { invalid, message }) => {
                assert_eq!(invalid, vec!["api_key"]);
                assert!(!message.contains("pk-abc"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let empty: AuthData = [("api_key", "  ")].into_iter().collect();
        match validate_auth(&n.id, &n.auth_spec, &empty) {
            Err(SignatureError::Validation { invalid, .. }) => assert_eq!(invalid, vec!["api_key"]),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_uncompilable_pattern_rejects_value() {
        let n = normalize(
            "broken",
            "Parameter(name=\"api_key\", type=\"secret\", required=true, pattern=\"[unclosed\")\nOperation(name=\"get_item\")\n",
        );
        let auth: AuthData = [("api_key", "anything")].into_iter().collect();
        match validate_auth(&n.id, &n.auth_spec, &auth) {
            Err(SignatureError::Validation { invalid, .. }) => assert_eq!(invalid, vec!["api_key"]),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_reject_credential_keys() {
        let n = node();
        let ok: BTreeMap<_, _> = [("model".to_string(), "gpt".to_string())].into_iter().collect();
        assert!(validate_defaults(&n.id, &n.auth_spec, &ok).is_ok());

        let bad: BTreeMap<_, _> = [
            ("Organization".to_string(), "org-1".to_string()),
            ("refresh_token".to_string(), "r".to_string()),
            ("model".to_string(), "gpt".to_string()),
        ]
        .into_iter()
        .collect();
        match validate_defaults(&n.id, &n.auth_spec, &bad) {
            Err(SignatureError::Validation { invalid, message }) => {
                assert_eq!(invalid, vec!["Organization", "refresh_token"]);
                assert!(!message.contains("org-1"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_field_pattern_only_checked_when_present() {
        let n = node();
        let auth: AuthData = [("api_key", "sk-1")].into_iter().collect();
        assert!(validate_auth(&n.id, &n.auth_spec, &auth).is_ok());
    }

    #[test]
    fn test_omitted_operations_enable_all() {
        let ops = resolve_operations(&node(), None).unwrap();
        assert_eq!(names(&ops), vec!["create_completion", "list_models"]);
    }

    #[test]
    fn test_explicit_operations_exact_subset() {
        let req = vec!["list_models".to_string(), "list_models".to_string()];
        let ops = resolve_operations(&node(), Some(&req)).unwrap();
        assert_eq!(names(&ops), vec!["list_models"]);
    }

    #[test]
    fn test_explicit_empty_operations_enable_nothing() {
        let ops = resolve_operations(&node(), Some(&[])).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_unknown_operations_all_reported() {
        let req = vec![
            "list_models".to_string(),
            "delete_everything".to_string(),
            "fly".to_string(),
        ];
        match resolve_operations(&node(), Some(&req)) {
            Err(SignatureError::Validation { invalid, .. }) => {
                assert_eq!(invalid, vec!["delete_everything", "fly"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
