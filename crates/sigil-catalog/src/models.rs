//! # Core Data Models for the Capability Catalog
//!
//! This module defines the normalized types every definition source is
//! converted into. Whatever shape a node definition arrives in, the rest of
//! the system only ever sees a [`NodeDescriptor`].
//!
//! ## Invariants
//!
//! - `Operation::name` is unique within a descriptor.
//! - `AuthField::field` is unique within an [`AuthSpec`].
//! - A descriptor id is always the lower-cased definition file stem.
//!
//! Both uniqueness rules are enforced once, when the normalizer assembles a
//! descriptor. Nothing downstream re-deduplicates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Coarse CRUD classification of an operation.
///
/// Categories drive the derived [`Capabilities`] and the catalog's
/// category filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    /// Creates a new remote resource.
    Create,
    /// Reads or lists remote resources.
    Read,
    /// Modifies an existing remote resource.
    Update,
    /// Removes a remote resource.
    Delete,
    /// Anything the heuristic cannot place.
    Other,
}

impl OperationCategory {
    /// Classifies an operation by substring heuristics against its name.
    ///
    /// Checked in order: create, read, update, delete. The first group with
    /// a matching keyword wins, so `get_or_create_person` is a create.
    ///
    /// ```rust
    /// use sigil_catalog::OperationCategory;
    ///
    /// assert_eq!(OperationCategory::classify("list_people"), OperationCategory::Read);
    /// assert_eq!(OperationCategory::classify("ADD_TAG"), OperationCategory::Create);
    /// assert_eq!(OperationCategory::classify("sync"), OperationCategory::Other);
    /// ```
    pub fn classify(name: &str) -> Self {
        const GROUPS: [(OperationCategory, &[&str]); 4] = [
            (OperationCategory::Create, &["create", "add", "insert"]),
            (OperationCategory::Read, &["get", "find", "list", "read"]),
            (OperationCategory::Update, &["update", "modify", "put", "patch"]),
            (OperationCategory::Delete, &["delete", "remove", "drop"]),
        ];

        let lowered = name.to_lowercase();
        GROUPS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(category, _)| *category)
            .unwrap_or(OperationCategory::Other)
    }

    /// Parses an explicit category spelling.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "create" => Some(Self::Create),
            "read" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Returns the lowercase wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single action a node type can perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique name within the owning descriptor (e.g. `list_people`).
    pub name: String,

    /// CRUD classification.
    pub category: OperationCategory,

    /// Human-readable description, possibly empty.
    pub description: String,
}

impl Operation {
    /// Creates an operation whose category is derived from its name.
    pub fn classified(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            category: OperationCategory::classify(&name),
            name,
            description: description.into(),
        }
    }

    /// Whether `name` is acceptable as an operation name.
    ///
    /// An ASCII letter followed by ASCII letters, digits, `_`, `-` or `.`.
    /// Every operation the catalog emits satisfies this, and signature
    /// documents are validated against the same rule.
    pub fn is_valid_name(name: &str) -> bool {
        let mut chars = name.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }
}

/// Closed set of parameter value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    /// Plain string value.
    String,
    /// Credential material; always sensitive.
    Secret,
    /// Structured value (object, map, JSON).
    Object,
}

impl ParameterType {
    /// Maps a declared type spelling onto the closed set.
    ///
    /// Returns the mapped type and whether the spelling had to be coerced.
    /// Coerced spellings are preserved by the normalizer in
    /// [`ParameterSpec::extra`] under `declared_type`.
    pub fn from_declared(raw: &str) -> (Self, bool) {
        match raw.trim().to_lowercase().as_str() {
            "string" | "str" => (Self::String, false),
            "secret" => (Self::Secret, false),
            "password" | "credential" => (Self::Secret, true),
            "object" => (Self::Object, false),
            "dict" | "map" | "json" | "array" | "list" => (Self::Object, true),
            _ => (Self::String, true),
        }
    }

    /// Returns the lowercase wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Secret => "secret",
            Self::Object => "object",
        }
    }
}

/// A normalized parameter declaration.
///
/// Keys a definition source carries that this struct does not model are kept
/// in `extra` rather than dropped, so nothing is lost in normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParameterType,

    pub required: bool,

    /// Marked as credential material by the source.
    pub sensitive: bool,

    /// Regular expression a supplied value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Unrecognized source keys, stringified.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ParameterSpec {
    /// Creates a string parameter with no pattern, default, or extras.
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            sensitive: param_type == ParameterType::Secret,
            pattern: None,
            description: String::new(),
            default: None,
            extra: BTreeMap::new(),
        }
    }
}

/// How a node type authenticates against its remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    BearerToken,
    ApiKey,
    BasicAuth,
    ConnectionString,
    Custom,
}

impl AuthType {
    /// Maps a declared auth type spelling. Unknown spellings become `Custom`.
    pub fn from_declared(raw: &str) -> Self {
        match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "bearer_token" | "bearer" | "token" | "oauth2" => Self::BearerToken,
            "api_key" | "apikey" => Self::ApiKey,
            "basic_auth" | "basic" => Self::BasicAuth,
            "connection_string" => Self::ConnectionString,
            _ => Self::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BearerToken => "bearer_token",
            Self::ApiKey => "api_key",
            Self::BasicAuth => "basic_auth",
            Self::ConnectionString => "connection_string",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One credential field a node type requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthField {
    pub field: String,

    #[serde(rename = "type")]
    pub field_type: String,

    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    pub sensitive: bool,
}

/// Credential requirements derived from a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSpec {
    pub auth_type: AuthType,

    /// Deduplicated by `field`.
    pub fields: Vec<AuthField>,
}

impl AuthSpec {
    /// An auth spec with no fields.
    pub fn none() -> Self {
        Self {
            auth_type: AuthType::Custom,
            fields: Vec::new(),
        }
    }

    /// True when at least one credential field is declared.
    pub fn requires_auth(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&AuthField> {
        self.fields.iter().find(|f| f.field == name)
    }

    /// Names of the fields that must be supplied.
    pub fn required_fields(&self) -> impl Iterator<Item = &AuthField> {
        self.fields.iter().filter(|f| f.required)
    }
}

/// Booleans derived from a descriptor's operations and auth spec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_read: bool,
    pub can_write: bool,
    pub can_update: bool,
    pub can_delete: bool,
    pub requires_auth: bool,
}

impl Capabilities {
    pub fn derive(operations: &[Operation], auth: &AuthSpec) -> Self {
        let has = |category| operations.iter().any(|op| op.category == category);
        Self {
            can_read: has(OperationCategory::Read),
            can_write: has(OperationCategory::Create),
            can_update: has(OperationCategory::Update),
            can_delete: has(OperationCategory::Delete),
            requires_auth: auth.requires_auth(),
        }
    }
}

/// Which definition pattern produced a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceForm {
    /// A single nested configuration block plus uppercase operation constants.
    InlineConfig,
    /// Repeated `Parameter(...)` declarations.
    DeclarativeParams,
    /// Neither pattern matched, or the selected branch could not parse the file.
    Unparsed { reason: String },
}

/// The normalized capability record for one integration type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Canonical lowercase id (the definition file stem).
    pub id: String,

    pub display_name: String,

    pub description: String,

    pub operations: Vec<Operation>,

    pub parameters: Vec<ParameterSpec>,

    pub auth_spec: AuthSpec,

    pub capabilities: Capabilities,

    pub form: SourceForm,

    /// Auth type declared verbatim by an inline config source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_auth: Option<AuthType>,
}

impl NodeDescriptor {
    /// A placeholder descriptor for a file that could not be parsed.
    pub fn unparsed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: display_name_from_id(&id),
            id,
            description: String::new(),
            operations: Vec::new(),
            parameters: Vec::new(),
            auth_spec: AuthSpec::none(),
            capabilities: Capabilities::default(),
            form: SourceForm::Unparsed {
                reason: reason.into(),
            },
            declared_auth: None,
        }
    }

    /// False for placeholder descriptors.
    pub fn is_parsed(&self) -> bool {
        !matches!(self.form, SourceForm::Unparsed { .. })
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// The full operation-name set of this node.
    pub fn operation_names(&self) -> BTreeSet<String> {
        self.operations.iter().map(|op| op.name.clone()).collect()
    }

    /// True if any operation falls in `category`.
    pub fn has_category(&self, category: OperationCategory) -> bool {
        self.operations.iter().any(|op| op.category == category)
    }
}

/// Turns `google_sheets` into `Google Sheets`.
pub fn display_name_from_id(id: &str) -> String {
    id.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_heuristics() {
        assert_eq!(OperationCategory::classify("create_event"), OperationCategory::Create);
        assert_eq!(OperationCategory::classify("insert_row"), OperationCategory::Create);
        assert_eq!(OperationCategory::classify("find_person"), OperationCategory::Read);
        assert_eq!(OperationCategory::classify("patch_record"), OperationCategory::Update);
        assert_eq!(OperationCategory::classify("drop_table"), OperationCategory::Delete);
        assert_eq!(OperationCategory::classify("send_message"), OperationCategory::Other);
    }

    #[test]
    fn test_operation_name_rule() {
        for ok in ["list_people", "ListPeople", "v2.send-email", "a"] {
            assert!(Operation::is_valid_name(ok), "{}", ok);
        }
        for bad in ["", "send email", "_private", "2fa", "list\tpeople", "café"] {
            assert!(!Operation::is_valid_name(bad), "{:?}", bad);
        }
    }

    #[test]
    fn test_classify_create_wins_over_read() {
        // "get_or_create" contains both keywords; create is checked first
        assert_eq!(OperationCategory::classify("get_or_create"), OperationCategory::Create);
    }

    #[test]
    fn test_parameter_type_coercion() {
        assert_eq!(ParameterType::from_declared("secret"), (ParameterType::Secret, false));
        assert_eq!(ParameterType::from_declared("password"), (ParameterType::Secret, true));
        assert_eq!(ParameterType::from_declared("dict"), (ParameterType::Object, true));
        assert_eq!(ParameterType::from_declared("int"), (ParameterType::String, true));
    }

    #[test]
    fn test_auth_type_from_declared() {
        assert_eq!(AuthType::from_declared("Bearer-Token"), AuthType::BearerToken);
        assert_eq!(AuthType::from_declared("api_key"), AuthType::ApiKey);
        assert_eq!(AuthType::from_declared("hmac"), AuthType::Custom);
    }

    #[test]
    fn test_capabilities_derive() {
        let ops = vec![
            Operation::classified("list_people", ""),
            Operation::classified("delete_person", ""),
        ];
        let caps = Capabilities::derive(&ops, &AuthSpec::none());
        assert!(caps.can_read);
        assert!(caps.can_delete);
        assert!(!caps.can_write);
        assert!(!caps.can_update);
        assert!(!caps.requires_auth);
    }

    #[test]
    fn test_display_name_from_id() {
        assert_eq!(display_name_from_id("google_sheets"), "Google Sheets");
        assert_eq!(display_name_from_id("actionnetwork"), "Actionnetwork");
    }

    #[test]
    fn test_unparsed_descriptor_is_empty() {
        let d = NodeDescriptor::unparsed("broken", "no signature");
        assert!(!d.is_parsed());
        assert!(d.operations.is_empty());
        assert!(d.parameters.is_empty());
        assert!(!d.capabilities.requires_auth);
    }
}
