//! Content classification for conflicted files.
//!
//! Classification decides which resolution strategy applies. Anything not
//! positively recognized is [`ContentCategory::Unknown`], which the resolver
//! always escalates to manual handling.

use std::path::Path;

use crate::models::ContentCategory;

/// Classify a conflicted file by extension, falling back to a content
/// sniff for extensionless paths.
///
/// The sniff consults every side that is present: extensionless content is
/// structured only when each available side reads as JSON.
pub fn classify(path: &str, ours: Option<&[u8]>, theirs: Option<&[u8]>) -> ContentCategory {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("json") | Some("toml") => ContentCategory::StructuredData,
        Some("md") | Some("markdown") | Some("txt") | Some("rst") => ContentCategory::Prose,
        Some(_) => ContentCategory::Unknown,
        None => sniff(ours, theirs),
    }
}

/// Sniff extensionless content. Every present side must be clean UTF-8 with
/// a leading `{`; anything else stays unknown.
fn sniff(ours: Option<&[u8]>, theirs: Option<&[u8]>) -> ContentCategory {
    let structured = match (ours, theirs) {
        (None, None) => false,
        (Some(o), Some(t)) => looks_like_json(o) && looks_like_json(t),
        (Some(one), None) | (None, Some(one)) => looks_like_json(one),
    };
    if structured {
        ContentCategory::StructuredData
    } else {
        ContentCategory::Unknown
    }
}

/// A NUL byte means binary regardless of UTF-8 validity.
fn looks_like_json(bytes: &[u8]) -> bool {
    if bytes.contains(&0) {
        return false;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_start().starts_with('{'),
        Err(_) => false,
    }
}
