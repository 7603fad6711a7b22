//! Tag codec.
//!
//! Tags reached the store in three historical encodings: space-separated
//! tokens, JSON arrays, and JSON objects (whose entries read as `key` and
//! `key:value` tokens). All shape-sniffing lives here; the rest of the crate
//! only ever sees the canonical form — an ordered list of unique strings,
//! deduplicated case-insensitively with the first-seen casing preserved.
//!
//! New writes always persist the JSON-array form via [`encode`]; the legacy
//! forms stay readable through [`decode_text`].

use std::collections::HashSet;

use serde_json::Value;

/// Decode a raw tag value (array, object, string, scalar) into the canonical
/// tag list. Never fails: unusable input decodes to an empty list.
#[must_use]
pub fn decode(value: &Value) -> Vec<String> {
    normalize(flatten(value))
}

/// Decode the persisted column text into the canonical tag list.
///
/// JSON payloads are parsed and recursed; anything that is not valid JSON
/// falls back to comma splitting, then whitespace splitting.
#[must_use]
pub fn decode_text(raw: &str) -> Vec<String> {
    normalize(flatten_text(raw))
}

/// Encode the canonical tag list as its persisted form: a compact JSON array
/// of the original-cased tag strings.
#[must_use]
pub fn encode(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Lowercased identity used for deduplication and containment checks.
#[must_use]
pub fn tag_key(tag: &str) -> String {
    tag.to_lowercase()
}

fn flatten(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => flatten_text(s),
        Value::Array(items) => items.iter().filter_map(scalar_token).collect(),
        Value::Object(map) => {
            let mut out = Vec::new();
            for (key, val) in map {
                out.push(key.clone());
                if let Some(v) = scalar_token(val) {
                    out.push(format!("{key}:{v}"));
                }
            }
            out
        }
        Value::Bool(b) => vec![b.to_string()],
        Value::Number(n) => vec![n.to_string()],
    }
}

fn flatten_text(raw: &str) -> Vec<String> {
    let s = raw.trim();
    if s.is_empty() {
        return Vec::new();
    }
    if s.starts_with('[') || s.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(s) {
            return flatten(&value);
        }
        // Broken JSON: fall through to delimiter splitting.
    }
    if s.contains(',') {
        s.split(',').map(str::to_string).collect()
    } else {
        s.split_whitespace().map(str::to_string).collect()
    }
}

fn scalar_token(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Trim, drop empties, and deduplicate case-insensitively while keeping the
/// first occurrence's casing and position.
fn normalize(tokens: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for token in tokens {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(tag_key(trimmed)) {
            out.push(trimmed.to_string());
        }
    }
    out
}
