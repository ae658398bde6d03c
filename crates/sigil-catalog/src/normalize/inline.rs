//! Inline config branch.
//!
//! ```text
//! NODE_CONFIG = {
//!     "name": "Action Network",
//!     "auth_type": "api_key",
//!     "parameters": {
//!         "api_key": {"type": "string", "sensitive": True, "pattern": "^[a-f0-9]{32}$"},
//!         "group": {"type": "string", "required": False},
//!     },
//! }
//!
//! LIST_PEOPLE = "list_people"  # List people in the group
//! ```
//!
//! The brace block is read as JSON once Python-style literals, single quotes
//! and trailing commas are normalized. Operations are the uppercase constants
//! assigned identifier-like string literals *outside* the block.

use super::{matching_close, skip_string, ParsedDefinition};
use crate::models::{Operation, ParameterSpec, ParameterType};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Constant names that describe the node rather than name an operation.
const RESERVED_CONSTANTS: &[&str] = &[
    "AUTH_TYPE",
    "NODE_TYPE",
    "NODE_NAME",
    "DISPLAY_NAME",
    "DESCRIPTION",
    "CATEGORY",
    "VERSION",
    "ICON",
];

fn block_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*[A-Z][A-Z0-9_]*[ \t]*(?::[^=\n]*)?=[ \t]*(\{)").expect("valid regex")
    })
}

fn constant_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^[ \t]*([A-Z][A-Z0-9_]*)[ \t]*(?::[^=\n]*)?=[ \t]*["']([A-Za-z0-9_.\- ]*)["'][ \t]*(?:#[ \t]*(.*?))?[ \t]*$"#,
        )
        .expect("valid regex")
    })
}

fn operation_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"))
}

pub(crate) fn parse(content: &str) -> Result<ParsedDefinition, String> {
    let open = block_start_re()
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.start())
        .ok_or_else(|| "configuration block not found".to_string())?;
    let close = matching_close(content, open).ok_or_else(|| "unterminated configuration block".to_string())?;

    let block_json = to_json(&content[open..=close]);
    let block: Value =
        serde_json::from_str(&block_json).map_err(|e| format!("configuration block is not valid: {}", e))?;
    let block = block
        .as_object()
        .ok_or_else(|| "configuration block is not an object".to_string())?;

    // Constants are only read outside the block.
    let outside = format!("{}\n{}", &content[..open], &content[close + 1..]);

    let mut parsed = ParsedDefinition {
        display_name: str_field(block, &["display_name", "name"]),
        description: str_field(block, &["description"]),
        declared_auth: declared_auth(block),
        ..ParsedDefinition::default()
    };

    if let Some(params) = block.get("parameters") {
        parsed.parameters = parse_parameters(params)?;
    }

    for caps in constant_re().captures_iter(&outside) {
        let constant = &caps[1];
        let value = &caps[2];

        if constant == "AUTH_TYPE" && parsed.declared_auth.is_none() {
            parsed.declared_auth = Some(value.to_string());
            continue;
        }
        if RESERVED_CONSTANTS.contains(&constant) || !operation_name_re().is_match(value) {
            continue;
        }

        let description = caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default();
        parsed.operations.push(Operation::classified(value, description));
    }

    Ok(parsed)
}

fn str_field(block: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| block.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn declared_auth(block: &Map<String, Value>) -> Option<String> {
    if let Some(auth) = block.get("auth_type").and_then(Value::as_str) {
        return Some(auth.to_string());
    }
    match block.get("auth") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(obj)) => obj.get("type").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Accepts either `{"name": {...}}` or `[{"name": "...", ...}]`.
fn parse_parameters(value: &Value) -> Result<Vec<ParameterSpec>, String> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(name, spec)| parse_parameter(name, spec))
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|spec| {
                let name = spec
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "parameter entry without a name".to_string())?;
                parse_parameter(name, spec)
            })
            .collect(),
        _ => Err("parameters must be an object or a list".to_string()),
    }
}

fn parse_parameter(name: &str, spec: &Value) -> Result<ParameterSpec, String> {
    let empty = Map::new();
    let obj = match spec {
        Value::Object(obj) => obj,
        // A bare type string: "token": "secret"
        Value::String(_) => &empty,
        _ => return Err(format!("parameter '{}' must be an object", name)),
    };

    let declared_type = match spec {
        Value::String(t) => t.as_str(),
        _ => obj.get("type").and_then(Value::as_str).unwrap_or("string"),
    };
    let (param_type, coerced) = ParameterType::from_declared(declared_type);

    let sensitive = obj.get("sensitive").and_then(Value::as_bool).unwrap_or(false)
        || param_type == ParameterType::Secret;
    let required = obj.get("required").and_then(Value::as_bool).unwrap_or(sensitive);

    let mut extra = BTreeMap::new();
    if coerced {
        extra.insert("declared_type".to_string(), declared_type.to_string());
    }
    for (key, value) in obj {
        if matches!(
            key.as_str(),
            "name" | "type" | "required" | "sensitive" | "pattern" | "description" | "default"
        ) {
            continue;
        }
        extra.insert(key.clone(), stringify(value));
    }

    Ok(ParameterSpec {
        name: name.to_string(),
        param_type,
        required,
        sensitive,
        pattern: obj.get("pattern").and_then(Value::as_str).map(str::to_string),
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        default: obj.get("default").filter(|v| !v.is_null()).map(stringify),
        extra,
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rewrites a Python-flavoured literal block as JSON.
///
/// Outside string literals: `True`/`False`/`None` become `true`/`false`/`null`,
/// `#` comments are dropped, and commas directly before a closing bracket are
/// removed. Single-quoted strings are re-quoted with double quotes.
fn to_json(block: &str) -> String {
    let bytes = block.as_bytes();
    let mut out = String::with_capacity(block.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' => {
                let end = skip_string(block, i).unwrap_or(bytes.len());
                out.push_str(&block[i..end]);
                i = end;
            }
            b'\'' => {
                let end = skip_string(block, i).unwrap_or(bytes.len());
                let inner = &block[i + 1..end.saturating_sub(1).max(i + 1)];
                out.push('"');
                out.push_str(&inner.replace("\\'", "'").replace('"', "\\\""));
                out.push('"');
                i = end;
            }
            b'#' => {
                i = block[i..].find('\n').map(|n| i + n).unwrap_or(bytes.len());
            }
            b',' => {
                let rest = skip_blank(&block[i + 1..]);
                if !(rest.starts_with('}') || rest.starts_with(']')) {
                    out.push(',');
                }
                i += 1;
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let len = block[i..]
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(block.len() - i);
                let word = &block[i..i + len];
                out.push_str(match word {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
                i += len;
            }
            _ => {
                let len = block[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                out.push_str(&block[i..i + len]);
                i += len;
            }
        }
    }
    out
}

/// Skips whitespace and `#` comments.
fn skip_blank(mut rest: &str) -> &str {
    loop {
        rest = rest.trim_start();
        if !rest.starts_with('#') {
            return rest;
        }
        rest = rest.find('\n').map(|n| &rest[n..]).unwrap_or("");
    }
}
