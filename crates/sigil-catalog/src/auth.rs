//! # Auth Requirement Extractor
//!
//! Pure derivation of an [`AuthSpec`] from a [`NodeDescriptor`].
//!
//! ## Priority
//!
//! 1. An auth type declared by an inline config source is used as-is.
//! 2. Every parameter marked `sensitive` is an auth field.
//! 3. Every parameter whose name contains a credential keyword is an auth
//!    field as well, even when not marked sensitive. A parameter already
//!    captured by rule 2 is never added twice.
//!
//! When no type was declared it is inferred from the captured field names.
//!
//! ## Example
//!
//! ```rust
//! use sigil_catalog::{normalize, AuthType};
//!
//! let src = r#"
//! CONFIG = {"parameters": {"api_key": {"type": "string", "sensitive": True, "pattern": "^sk-"}}}
//! LIST_MODELS = "list_models"
//! "#;
//! let node = normalize("openai", src);
//! assert_eq!(node.auth_spec.auth_type, AuthType::ApiKey);
//! assert_eq!(node.auth_spec.fields.len(), 1);
//! assert!(node.capabilities.requires_auth);
//! ```

use crate::models::{AuthField, AuthSpec, AuthType, NodeDescriptor, ParameterSpec};
use std::collections::HashSet;

/// Name fragments that mark a parameter as credential material.
pub const CREDENTIAL_KEYWORDS: &[&str] = &[
    "api_key",
    "token",
    "password",
    "secret",
    "credential",
    "connection_string",
];

/// True if `name` contains any credential keyword (case-insensitive).
pub fn is_credential_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    CREDENTIAL_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Derives the auth requirements of a descriptor.
pub fn extract_auth_spec(descriptor: &NodeDescriptor) -> AuthSpec {
    let mut seen = HashSet::new();
    let mut fields = Vec::new();

    let sensitive = descriptor.parameters.iter().filter(|p| p.sensitive);
    let by_keyword = descriptor
        .parameters
        .iter()
        .filter(|p| !p.sensitive && is_credential_name(&p.name));

    for param in sensitive.chain(by_keyword) {
        if seen.insert(param.name.as_str()) {
            fields.push(to_field(param));
        }
    }

    let auth_type = descriptor
        .declared_auth
        .unwrap_or_else(|| infer_auth_type(&fields));

    AuthSpec { auth_type, fields }
}

fn to_field(param: &ParameterSpec) -> AuthField {
    AuthField {
        field: param.name.clone(),
        field_type: param.param_type.as_str().to_string(),
        required: param.required,
        pattern: param.pattern.clone(),
        // Keyword matches are credentials whether or not the source said so.
        sensitive: true,
    }
}

/// Infers the auth type from captured field names.
pub fn infer_auth_type(fields: &[AuthField]) -> AuthType {
    let has = |needle: &str| fields.iter().any(|f| f.field.to_lowercase().contains(needle));

    if has("connection_string") {
        AuthType::ConnectionString
    } else if has("username") && has("password") {
        AuthType::BasicAuth
    } else if has("api_key") || has("apikey") {
        AuthType::ApiKey
    } else if has("token") {
        AuthType::BearerToken
    } else {
        AuthType::Custom
    }
}
