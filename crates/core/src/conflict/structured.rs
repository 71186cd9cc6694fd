//! Key-union merging for structured data conflicts.
//!
//! Both sides of the conflict are parsed as whole documents. If both are
//! key-value maps, the merge is their key union with the incoming branch
//! winning on collisions. The merge is shallow: a colliding nested value
//! is replaced wholesale, never recursed into.

use std::path::Path;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::errors::ParseError;

enum Format {
    Json,
    Toml,
}

fn format_for(path: &str) -> Format {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("toml") => Format::Toml,
        // .json and sniffed extensionless documents both parse as JSON.
        _ => Format::Json,
    }
}

/// Merge both sides of a structured-data conflict into one document.
///
/// Fails with [`ParseError`] when either side is malformed or not map-like
/// at the top level; the caller downgrades that file to manual handling.
pub fn merge(path: &str, ours: &[u8], theirs: &[u8]) -> Result<Vec<u8>, ParseError> {
    match format_for(path) {
        Format::Json => merge_json(ours, theirs),
        Format::Toml => merge_toml(ours, theirs),
    }
}

fn merge_json(ours: &[u8], theirs: &[u8]) -> Result<Vec<u8>, ParseError> {
    let ours: JsonValue = serde_json::from_slice(ours)?;
    let theirs: JsonValue = serde_json::from_slice(theirs)?;

    let mut merged = match ours {
        JsonValue::Object(map) => map,
        other => return Err(ParseError::NotMap(json_kind(&other))),
    };
    let incoming = match theirs {
        JsonValue::Object(map) => map,
        other => return Err(ParseError::NotMap(json_kind(&other))),
    };

    let collisions = incoming.keys().filter(|k| merged.contains_key(*k)).count();
    debug!(
        ours_keys = merged.len(),
        theirs_keys = incoming.len(),
        collisions,
        "merging structured JSON by key union"
    );
    for (key, value) in incoming {
        merged.insert(key, value);
    }

    let mut out = serde_json::to_vec_pretty(&JsonValue::Object(merged))?;
    out.push(b'\n');
    Ok(out)
}

fn merge_toml(ours: &[u8], theirs: &[u8]) -> Result<Vec<u8>, ParseError> {
    let ours = std::str::from_utf8(ours).map_err(|_| ParseError::NotText)?;
    let theirs = std::str::from_utf8(theirs).map_err(|_| ParseError::NotText)?;

    // A TOML document is a table by definition, so NotMap cannot occur here.
    let mut merged: toml::value::Table = toml::from_str(ours)?;
    let incoming: toml::value::Table = toml::from_str(theirs)?;

    let collisions = incoming.keys().filter(|k| merged.contains_key(*k)).count();
    debug!(
        ours_keys = merged.len(),
        theirs_keys = incoming.len(),
        collisions,
        "merging structured TOML by key union"
    );
    for (key, value) in incoming {
        merged.insert(key, value);
    }

    Ok(toml::to_string_pretty(&merged)?.into_bytes())
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
