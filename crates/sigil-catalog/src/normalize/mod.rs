//! # Schema Normalizer
//!
//! Converts raw definition content into a [`NodeDescriptor`].
//!
//! Two incompatible definition shapes exist in the wild:
//!
//! | Form | Signature | Operations from | Auth fields from |
//! |------|-----------|-----------------|------------------|
//! | Inline config | `NAME = {` brace block | `UPPER = "lower_name"` constants | `sensitive` parameters |
//! | Declarative params | `Parameter(...)` calls | `Operation(...)` calls | `type="secret"` parameters |
//!
//! Format detection runs first and selects exactly one branch. The other
//! branch never sees the content, so a stray `Parameter(` inside an inline
//! file cannot add parameters to it.
//!
//! A file matching neither signature, or whose branch fails, becomes an
//! unparsed placeholder rather than an error.
//!
//! ```text
//!   raw content ──► detect_form ──┬─► inline::parse ──────┐
//!                                 ├─► declarative::parse ─┼─► assemble ──► NodeDescriptor
//!                                 └─► (unrecognized) ─────┘
//! ```

mod declarative;
mod inline;

use crate::auth::extract_auth_spec;
use crate::models::{
    display_name_from_id, AuthSpec, AuthType, Capabilities, NodeDescriptor, Operation, ParameterSpec,
    SourceForm,
};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

/// Result of structural format detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionForm {
    InlineConfig,
    DeclarativeParams,
    Unrecognized,
}

/// Everything a parsing branch extracts before assembly.
#[derive(Debug, Default)]
pub(crate) struct ParsedDefinition {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub declared_auth: Option<String>,
    pub operations: Vec<Operation>,
    pub parameters: Vec<ParameterSpec>,
}

fn config_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*[A-Z][A-Z0-9_]*[ \t]*(?::[^=\n]*)?=[ \t]*\{").expect("valid regex")
    })
}

fn declaration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:Parameter|Operation)\s*\(").expect("valid regex"))
}

/// Detects which definition pattern a file uses.
///
/// The inline signature is checked first. Comments are ignored for
/// detection purposes.
pub fn detect_form(content: &str) -> DefinitionForm {
    let code = strip_comments(content);
    if config_block_re().is_match(&code) {
        DefinitionForm::InlineConfig
    } else if declaration_re().is_match(&code) {
        DefinitionForm::DeclarativeParams
    } else {
        DefinitionForm::Unrecognized
    }
}

/// Normalizes one definition file. Never fails: unparseable content yields
/// a descriptor with [`SourceForm::Unparsed`].
pub fn normalize(id: &str, content: &str) -> NodeDescriptor {
    let form = detect_form(content);
    let parsed = match form {
        DefinitionForm::InlineConfig => inline::parse(content).map(|p| (p, SourceForm::InlineConfig)),
        DefinitionForm::DeclarativeParams => {
            declarative::parse(content).map(|p| (p, SourceForm::DeclarativeParams))
        }
        DefinitionForm::Unrecognized => Err("no known definition pattern matched".to_string()),
    };

    match parsed {
        Ok((parsed, source_form)) => assemble(id, source_form, parsed),
        Err(reason) => {
            debug!("Definition '{}' left unparsed: {}", id, reason);
            NodeDescriptor::unparsed(id, reason)
        }
    }
}

/// Deduplicates, derives auth and capabilities, and builds the descriptor.
fn assemble(id: &str, form: SourceForm, parsed: ParsedDefinition) -> NodeDescriptor {
    let operations = dedup_by_name(id, "operation", parsed.operations, |op| &op.name);
    let parameters = dedup_by_name(id, "parameter", parsed.parameters, |p| &p.name);

    let mut descriptor = NodeDescriptor {
        id: id.to_string(),
        display_name: parsed
            .display_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| display_name_from_id(id)),
        description: parsed.description.unwrap_or_default(),
        operations,
        parameters,
        auth_spec: AuthSpec::none(),
        capabilities: Capabilities::default(),
        form,
        declared_auth: parsed.declared_auth.as_deref().map(AuthType::from_declared),
    };

    descriptor.auth_spec = extract_auth_spec(&descriptor);
    descriptor.capabilities = Capabilities::derive(&descriptor.operations, &descriptor.auth_spec);
    descriptor
}

fn dedup_by_name<T>(id: &str, what: &str, items: Vec<T>, name: impl Fn(&T) -> &String) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(name(item).clone());
            if !fresh {
                debug!("Dropping duplicate {} '{}' in '{}'", what, name(item), id);
            }
            fresh
        })
        .collect()
}

// =============================================================================
// Shared lexing helpers
// =============================================================================

/// Returns the byte index just past the string literal starting at `start`.
///
/// `start` must point at the opening quote. Backslash escapes are honored.
/// Returns `None` for an unterminated literal.
pub(crate) fn skip_string(src: &str, start: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Finds the index of the bracket closing the one at `open`, skipping
/// string literals.
pub(crate) fn matching_close(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let (opener, closer) = match bytes[open] {
        b'{' => (b'{', b'}'),
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        _ => return None,
    };

    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' || b == b'\'' {
            i = skip_string(src, i)?;
            continue;
        }
        if b == b'#' {
            i = src[i..].find('\n').map(|n| i + n).unwrap_or(bytes.len());
            continue;
        }
        if b == opener {
            depth += 1;
        } else if b == closer {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Removes `#` comments that are not inside string literals.
pub(crate) fn strip_comments(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len());
    let mut i = 0;
    let mut copied = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(src, i).unwrap_or(bytes.len());
            }
            b'#' => {
                out.push_str(&src[copied..i]);
                i = src[i..].find('\n').map(|n| i + n).unwrap_or(bytes.len());
                copied = i;
            }
            _ => i += 1,
        }
    }
    out.push_str(&src[copied..]);
    out
}
