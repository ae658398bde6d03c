//! Declarative parameter branch.
//!
//! ```text
//! Node(name="Stripe", description="Payments")
//!
//! Parameter(name="secret_key", type="secret", required=true, pattern="^sk_")
//! Parameter(name="currency", type="string", required=false, default="usd")
//!
//! Operation(name="create_charge", description="Charge a card")
//! Operation(name="refund", category="update")
//! ```
//!
//! Each declaration is a call with `key=value` arguments. A leading
//! positional argument is taken as the `name`.

use super::{matching_close, skip_string, strip_comments, ParsedDefinition};
use crate::models::{Operation, OperationCategory, ParameterSpec, ParameterType};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(Node|Parameter|Operation)\s*\(").expect("valid regex"))
}

pub(crate) fn parse(content: &str) -> Result<ParsedDefinition, String> {
    let code = strip_comments(content);
    let mut parsed = ParsedDefinition::default();
    let mut cursor = 0;

    while let Some(caps) = call_re().captures_at(&code, cursor) {
        let Some(whole) = caps.get(0) else { break };
        let kind = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let open = whole.end() - 1;
        let close = matching_close(&code, open)
            .ok_or_else(|| format!("unterminated {} declaration", kind))?;
        let args = parse_args(&code[open + 1..close])
            .map_err(|e| format!("{} declaration: {}", kind, e))?;

        match kind {
            "Node" => {
                parsed.display_name = args.get("name").cloned();
                parsed.description = args.get("description").cloned();
            }
            "Parameter" => parsed.parameters.push(build_parameter(args)?),
            "Operation" => parsed.operations.push(build_operation(args)?),
            _ => {}
        }
        cursor = close + 1;
    }

    Ok(parsed)
}

fn build_parameter(mut args: BTreeMap<String, String>) -> Result<ParameterSpec, String> {
    let name = args
        .remove("name")
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "Parameter declaration without a name".to_string())?;

    let declared_type = args.remove("type").unwrap_or_else(|| "string".to_string());
    let (param_type, coerced) = ParameterType::from_declared(&declared_type);

    let sensitive = args.remove("sensitive").map(|v| is_true(&v)).unwrap_or(false)
        || param_type == ParameterType::Secret;
    let required = args.remove("required").map(|v| is_true(&v)).unwrap_or(false);

    let pattern = args.remove("pattern");
    let description = args.remove("description").unwrap_or_default();
    let default = args.remove("default");

    if coerced {
        args.insert("declared_type".to_string(), declared_type);
    }

    Ok(ParameterSpec {
        name,
        param_type,
        required,
        sensitive,
        pattern,
        description,
        default,
        extra: args,
    })
}

fn build_operation(mut args: BTreeMap<String, String>) -> Result<Operation, String> {
    let name = args
        .remove("name")
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "Operation declaration without a name".to_string())?;
    if !Operation::is_valid_name(&name) {
        return Err(format!("invalid operation name '{}'", name));
    }
    let description = args.remove("description").unwrap_or_default();
    let category = args
        .remove("category")
        .and_then(|c| OperationCategory::parse(&c))
        .unwrap_or_else(|| OperationCategory::classify(&name));

    Ok(Operation {
        name,
        category,
        description,
    })
}

fn is_true(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Splits `a="x", b=true, c=3` into a map. String values are unquoted and
/// unescaped; everything else is kept as its trimmed source text.
fn parse_args(src: &str) -> Result<BTreeMap<String, String>, String> {
    let mut args = BTreeMap::new();

    for (position, raw) in split_top_level(src)?.into_iter().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (key, value) = match find_top_level_eq(raw) {
            Some(eq) => (raw[..eq].trim().to_string(), raw[eq + 1..].trim()),
            None if position == 0 => ("name".to_string(), raw),
            None => return Err(format!("unexpected positional argument '{}'", raw)),
        };
        args.insert(key, unquote(value)?);
    }
    Ok(args)
}

fn split_top_level(src: &str) -> Result<Vec<&str>, String> {
    let bytes = src.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(src, i).ok_or_else(|| "unterminated string".to_string())?;
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&src[start..]);
    Ok(parts)
}

fn find_top_level_eq(arg: &str) -> Option<usize> {
    let bytes = arg.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => return None,
            b'=' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn unquote(value: &str) -> Result<String, String> {
    let bytes = value.as_bytes();
    match bytes.first() {
        Some(b'"') | Some(b'\'') => {
            let end = skip_string(value, 0).ok_or_else(|| "unterminated string".to_string())?;
            if end != value.len() {
                return Err(format!("unexpected text after string: {}", &value[end..]));
            }
            Ok(unescape(&value[1..end - 1]))
        }
        _ => Ok(value.to_string()),
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
