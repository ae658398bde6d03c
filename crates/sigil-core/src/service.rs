//! The unified node service facade.
//!
//! [`NodeService`] owns the catalog handle, the signature mutator and the
//! live-status source, and exposes the whole query and mutation surface
//! both as typed methods and as a JSON [`Request`] dispatcher.

use crate::{
    config::SigilConfig,
    error::SigilError,
    response::Response,
    view::{AvailabilityView, EntryInfo, LiveStatusSource, NoLiveStatus, SignatureInfo},
    Result,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sigil_catalog::{
    Catalog, CatalogFilter, CatalogHandle, NodeDescriptor, Operation, OperationCategory,
    OperationMatch, ScanError,
};
use sigil_signature::{
    AuthData, CredentialCipher, ReconcileReport, SignatureMutator, SignatureStore,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of [`NodeService::validate_params`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParamReport {
    pub valid: bool,
    /// Required parameters with no value from params, descriptor or user defaults.
    pub missing: Vec<String>,
    /// Supplied values that do not match the declared pattern.
    pub invalid: Vec<String>,
    /// Supplied names the node does not declare. Warnings only.
    pub unknown: Vec<String>,
}

/// Result of [`NodeService::rebuild_catalog`].
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub nodes: usize,
    pub scan_errors: Vec<ScanError>,
    /// Reconciliation of the default user's signature, when it succeeded.
    pub reconcile: Option<ReconcileReport>,
}

/// JSON request surface. `{"action": "list_nodes", ...}`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    ListNodes {
        #[serde(default)]
        category: Option<OperationCategory>,
        #[serde(default)]
        auth_required: bool,
    },
    GetNode {
        node_type: String,
    },
    ListOperations {
        node_type: String,
    },
    SearchOperations {
        query: String,
    },
    GetOperationDetails {
        node_type: String,
        operation: String,
    },
    GetSignatureInfo {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        node_type: Option<String>,
    },
    AddNodeToSignature {
        #[serde(default)]
        user_id: Option<String>,
        node_type: String,
        #[serde(default)]
        auth: AuthData,
        #[serde(default)]
        defaults: BTreeMap<String, String>,
        #[serde(default)]
        operations: Option<Vec<String>>,
    },
    RemoveNodeFromSignature {
        #[serde(default)]
        user_id: Option<String>,
        node_type: String,
    },
    UpdateNodeDefaults {
        #[serde(default)]
        user_id: Option<String>,
        node_type: String,
        defaults: BTreeMap<String, String>,
    },
    SetOperations {
        #[serde(default)]
        user_id: Option<String>,
        node_type: String,
        operations: Vec<String>,
    },
    ValidateParams {
        #[serde(default)]
        user_id: Option<String>,
        node_type: String,
        operation: String,
        #[serde(default)]
        params: Map<String, Value>,
    },
    Availability {
        #[serde(default)]
        user_id: Option<String>,
    },
    RebuildCatalog,
}

/// The unified Sigil facade.
///
/// # Example
///
/// ```rust,ignore
/// let service = NodeService::new(SigilConfig::default())?;
///
/// let reply = service
///     .handle_json(r#"{"action": "search_operations", "query": "list"}"#)
///     .await;
/// println!("{}", reply);
/// ```
#[derive(Clone)]
pub struct NodeService {
    config: SigilConfig,
    catalog: CatalogHandle,
    mutator: SignatureMutator,
    live: Arc<dyn LiveStatusSource>,
}

impl NodeService {
    /// Builds the catalog, resolves the master key and opens the store.
    ///
    /// # Errors
    ///
    /// - `Scan` if the definitions directory cannot be listed
    /// - `Config` if no master key is available
    /// - `Io` if the store directory cannot be created
    pub fn new(config: SigilConfig) -> Result<Self> {
        let catalog = Catalog::build(&config.catalog.definitions_dir)?;
        let cipher = CredentialCipher::new(config.crypto.load_master_key()?);
        Self::with_parts(config, catalog, cipher)
    }

    /// Assembles a service from an already built catalog and cipher.
    pub fn with_parts(config: SigilConfig, catalog: Catalog, cipher: CredentialCipher) -> Result<Self> {
        let store = SignatureStore::open(&config.signature.store_dir, config.signature.lock_timeout())?;
        let handle = CatalogHandle::new(catalog);
        let mutator = SignatureMutator::new(handle.clone(), Arc::new(store), Arc::new(cipher))
            .with_retry(config.signature.retry_policy());

        info!(
            "Node service ready: {} nodes, store at {}",
            handle.snapshot().len(),
            config.signature.store_dir.display()
        );

        Ok(Self {
            config,
            catalog: handle,
            mutator,
            live: Arc::new(NoLiveStatus),
        })
    }

    pub fn with_live_status(mut self, live: Arc<dyn LiveStatusSource>) -> Self {
        self.live = live;
        self
    }

    pub fn config(&self) -> &SigilConfig {
        &self.config
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.snapshot()
    }

    fn user<'a>(&'a self, user_id: Option<&'a str>) -> &'a str {
        user_id.unwrap_or(&self.config.signature.default_user)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn list_nodes(&self, filter: Option<&CatalogFilter>) -> Vec<NodeDescriptor> {
        self.catalog.snapshot().list(filter).into_iter().cloned().collect()
    }

    pub fn get_node(&self, node_type: &str) -> Result<NodeDescriptor> {
        Ok(self.catalog.snapshot().get(node_type)?.clone())
    }

    pub fn list_operations(&self, node_type: &str) -> Result<Vec<Operation>> {
        Ok(self.catalog.snapshot().list_operations(node_type)?.to_vec())
    }

    pub fn search_operations(&self, query: &str) -> Vec<OperationMatch> {
        self.catalog.snapshot().search_operations(query)
    }

    pub fn get_operation_details(&self, node_type: &str, operation: &str) -> Result<Operation> {
        Ok(self
            .catalog
            .snapshot()
            .get_operation_details(node_type, operation)?
            .clone())
    }

    pub fn scan_errors(&self) -> Vec<ScanError> {
        self.catalog.snapshot().scan_errors().to_vec()
    }

    /// A user's signature without credentials, optionally narrowed to one node.
    pub fn get_signature_info(&self, user_id: Option<&str>, node_type: Option<&str>) -> Result<SignatureInfo> {
        let user = self.user(user_id);
        let doc = self.mutator.store().get(user)?;
        let key = node_type.map(|n| n.trim().to_lowercase());

        if let Some(key) = &key {
            if doc.entry(key).is_none() {
                return Err(SigilError::NotFound(format!(
                    "node '{}' is not in the signature of '{}'",
                    key, user
                )));
            }
        }
        Ok(SignatureInfo::project(user, &doc, key.as_deref()))
    }

    /// Joined catalog, signature and live status for one user.
    pub fn availability(&self, user_id: Option<&str>) -> Result<AvailabilityView> {
        let user = self.user(user_id);
        let doc = self.mutator.store().get(user)?;
        Ok(AvailabilityView::build(
            &self.catalog.snapshot(),
            user,
            &doc,
            self.live.as_ref(),
        ))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub fn add_node_to_signature(
        &self,
        user_id: Option<&str>,
        node_type: &str,
        auth: &AuthData,
        defaults: BTreeMap<String, String>,
        operations: Option<&[String]>,
    ) -> Result<EntryInfo> {
        let entry = self
            .mutator
            .add_node(self.user(user_id), node_type, auth, defaults, operations)?;
        Ok(EntryInfo::from(&entry))
    }

    pub fn remove_node_from_signature(&self, user_id: Option<&str>, node_type: &str) -> Result<bool> {
        Ok(self.mutator.remove_node(self.user(user_id), node_type)?)
    }

    pub fn update_node_defaults(
        &self,
        user_id: Option<&str>,
        node_type: &str,
        defaults: BTreeMap<String, String>,
    ) -> Result<EntryInfo> {
        let entry = self
            .mutator
            .update_defaults(self.user(user_id), node_type, defaults)?;
        Ok(EntryInfo::from(&entry))
    }

    pub fn set_operations(
        &self,
        user_id: Option<&str>,
        node_type: &str,
        operations: &[String],
    ) -> Result<EntryInfo> {
        let entry = self
            .mutator
            .set_operations(self.user(user_id), node_type, operations)?;
        Ok(EntryInfo::from(&entry))
    }

    /// Checks call parameters for one operation.
    ///
    /// Required non-credential parameters must come from `params`, the
    /// descriptor default, or the user's stored defaults. Supplied values
    /// must match declared patterns. Undeclared names are reported, not
    /// rejected.
    pub fn validate_params(
        &self,
        user_id: Option<&str>,
        node_type: &str,
        operation: &str,
        params: &Map<String, Value>,
    ) -> Result<ParamReport> {
        let snapshot = self.catalog.snapshot();
        let node = snapshot.get(node_type)?;
        snapshot.get_operation_details(&node.id, operation)?;

        let doc = self.mutator.store().get(self.user(user_id))?;
        let stored = doc.entry(&node.id).map(|e| &e.defaults);

        let mut report = ParamReport::default();
        for param in &node.parameters {
            if node.auth_spec.field(&param.name).is_some() {
                continue;
            }
            let supplied = params.get(&param.name).filter(|v| !v.is_null());

            match supplied {
                None => {
                    let defaulted = param.default.is_some()
                        || stored.map_or(false, |d| d.contains_key(&param.name));
                    if param.required && !defaulted {
                        report.missing.push(param.name.clone());
                    }
                }
                Some(value) => {
                    if let Some(pattern) = &param.pattern {
                        let text = match value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        let ok = match Regex::new(pattern) {
                            Ok(re) => re.is_match(&text),
                            Err(e) => {
                                warn!(
                                    "Node '{}' declares an invalid pattern for '{}': {}",
                                    node.id, param.name, e
                                );
                                false
                            }
                        };
                        if !ok {
                            report.invalid.push(param.name.clone());
                        }
                    }
                }
            }
        }

        report.unknown = params
            .keys()
            .filter(|k| node.parameter(k).is_none())
            .cloned()
            .collect();
        report.valid = report.missing.is_empty() && report.invalid.is_empty();

        debug!(
            "Validated params for {}.{}: valid={}",
            node.id, operation, report.valid
        );
        Ok(report)
    }

    /// Rescans the definitions directory, swaps the snapshot, and reconciles
    /// the default user's whitelist against it.
    pub async fn rebuild_catalog(&self) -> Result<RebuildReport> {
        let catalog = Catalog::build_parallel(
            &self.config.catalog.definitions_dir,
            self.config.catalog.scan_workers,
        )
        .await?;

        let nodes = catalog.len();
        let scan_errors = catalog.scan_errors().to_vec();
        self.catalog.publish(catalog);
        info!("Catalog rebuilt: {} nodes, {} scan errors", nodes, scan_errors.len());

        let reconcile = match self.mutator.reconcile(&self.config.signature.default_user) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Reconciliation after rebuild failed: {}", e);
                None
            }
        };

        Ok(RebuildReport {
            nodes,
            scan_errors,
            reconcile,
        })
    }

    // =========================================================================
    // JSON Surface
    // =========================================================================

    /// Parses and dispatches one JSON request.
    pub async fn handle_json(&self, raw: &str) -> Value {
        match serde_json::from_str::<Request>(raw) {
            Ok(request) => self.handle(request).await,
            Err(e) => respond::<()>(Err(SigilError::validation(
                format!("malformed request: {}", e),
                Vec::new(),
            ))),
        }
    }

    /// Dispatches one request and wraps the outcome in a [`Response`].
    ///
    /// Everything except a rebuild touches the signature store, which blocks
    /// on file locks and retry backoff, so it runs on the blocking pool.
    pub async fn handle(&self, request: Request) -> Value {
        if let Request::RebuildCatalog = request {
            return respond(self.rebuild_catalog().await);
        }

        let service = self.clone();
        tokio::task::spawn_blocking(move || service.dispatch(request))
            .await
            .unwrap_or_else(|e| {
                warn!("Request task failed: {}", e);
                respond::<()>(Err(SigilError::Io(format!("request task failed: {}", e))))
            })
    }

    fn dispatch(&self, request: Request) -> Value {
        match request {
            Request::ListNodes {
                category,
                auth_required,
            } => {
                let filter = CatalogFilter {
                    category,
                    auth_required_only: auth_required,
                };
                respond(Ok(self.list_nodes(Some(&filter))))
            }
            Request::GetNode { node_type } => respond(self.get_node(&node_type)),
            Request::ListOperations { node_type } => respond(self.list_operations(&node_type)),
            Request::SearchOperations { query } => respond(Ok(self.search_operations(&query))),
            Request::GetOperationDetails {
                node_type,
                operation,
            } => respond(self.get_operation_details(&node_type, &operation)),
            Request::GetSignatureInfo { user_id, node_type } => {
                respond(self.get_signature_info(user_id.as_deref(), node_type.as_deref()))
            }
            Request::AddNodeToSignature {
                user_id,
                node_type,
                auth,
                defaults,
                operations,
            } => respond(self.add_node_to_signature(
                user_id.as_deref(),
                &node_type,
                &auth,
                defaults,
                operations.as_deref(),
            )),
            Request::RemoveNodeFromSignature { user_id, node_type } => respond(
                self.remove_node_from_signature(user_id.as_deref(), &node_type)
                    .map(|removed| json!({ "removed": removed })),
            ),
            Request::UpdateNodeDefaults {
                user_id,
                node_type,
                defaults,
            } => respond(self.update_node_defaults(user_id.as_deref(), &node_type, defaults)),
            Request::SetOperations {
                user_id,
                node_type,
                operations,
            } => respond(self.set_operations(user_id.as_deref(), &node_type, &operations)),
            Request::ValidateParams {
                user_id,
                node_type,
                operation,
                params,
            } => respond(self.validate_params(user_id.as_deref(), &node_type, &operation, &params)),
            Request::Availability { user_id } => respond(self.availability(user_id.as_deref()).map(
                |view| {
                    let summary = view.summary();
                    json!({ "view": view, "summary": summary })
                },
            )),
            Request::RebuildCatalog => respond::<()>(Err(SigilError::validation(
                "rebuild_catalog must go through NodeService::handle",
                Vec::new(),
            ))),
        }
    }
}

fn respond<T: Serialize>(result: Result<T>) -> Value {
    if let Err(e) = &result {
        debug!("Request failed with {}: {}", e.code(), e);
    }
    serde_json::to_value(Response::from(result)).unwrap_or_else(|e| {
        json!({
            "success": false,
            "data": null,
            "error": { "code": "IO_ERROR", "message": format!("response encoding failed: {}", e) }
        })
    })
}
