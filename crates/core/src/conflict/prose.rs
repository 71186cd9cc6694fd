//! Dual retention for prose conflicts.
//!
//! Prose is never auto-merged: competing edits to documentation usually
//! both carry intent, and losing one side is worse than duplicating text.
//! Both versions are kept whole, each under a header naming where it came
//! from, for a human to reconcile later.

use crate::errors::ParseError;

/// Concatenate both sides of a prose conflict under labeled headers.
///
/// Fails with [`ParseError::NotText`] when either side is binary; the
/// caller downgrades that file to manual handling.
pub fn dual_retain(
    ours: &[u8],
    theirs: &[u8],
    ours_label: &str,
    theirs_label: &str,
) -> Result<Vec<u8>, ParseError> {
    if ours.contains(&0) || theirs.contains(&0) {
        return Err(ParseError::NotText);
    }
    let ours = std::str::from_utf8(ours).map_err(|_| ParseError::NotText)?;
    let theirs = std::str::from_utf8(theirs).map_err(|_| ParseError::NotText)?;

    let mut out = String::with_capacity(ours.len() + theirs.len() + 64);
    push_section(&mut out, ours_label, ours);
    push_section(&mut out, theirs_label, theirs);
    Ok(out.into_bytes())
}

fn push_section(out: &mut String, label: &str, content: &str) {
    out.push_str("======= retained: ");
    out.push_str(label);
    out.push_str(" =======\n");
    out.push_str(content);
    if !content.ends_with('\n') {
        out.push('\n');
    }
}
