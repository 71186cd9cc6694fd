//! Per-conflict resolution dispatch.
//!
//! The [`ConflictResolver`] classifies each conflicted file and applies the
//! strategy for its category: key-union merging for structured data, dual
//! retention for prose, manual escalation for everything else. The result
//! is all-or-nothing: either every file resolved and the replacement
//! contents are returned for staging, or nothing is staged at all.

use tracing::{debug, info, warn};

use crate::conflict::{classify, prose, structured, ConflictSides, ResolvedFile};
use crate::errors::ParseError;
use crate::models::{ConflictEntry, ContentCategory, Resolution};

/// The outcome of resolving one branch's conflict set.
#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    /// Every conflicted file was auto-resolved; contents ready to stage.
    Resolved(Vec<ResolvedFile>),
    /// At least one file needs a human. Nothing may be staged; the entries
    /// cover every conflicted path for the report.
    Unresolved(Vec<ConflictEntry>),
}

/// Applies per-category resolution strategies to a set of conflicts.
pub struct ConflictResolver {
    /// Label for the mainline side in dual-retained output.
    ours_label: String,
    /// Label for the contributor side in dual-retained output.
    theirs_label: String,
}

impl ConflictResolver {
    pub fn new(ours_label: impl Into<String>, theirs_label: impl Into<String>) -> Self {
        Self {
            ours_label: ours_label.into(),
            theirs_label: theirs_label.into(),
        }
    }

    /// Attempt to resolve every conflicted file.
    ///
    /// A file that fails resolution never aborts the others; it is recorded
    /// as [`Resolution::RequiresManual`] and the remaining files are still
    /// attempted so the report can show the complete picture.
    pub fn resolve(&self, conflicts: &[ConflictSides]) -> ResolutionOutcome {
        let mut resolved = Vec::new();
        let mut entries = Vec::new();
        let mut manual = 0usize;

        for sides in conflicts {
            match self.resolve_one(sides) {
                Ok(file) => {
                    entries.push(file.entry.clone());
                    resolved.push(file);
                }
                Err(entry) => {
                    manual += 1;
                    entries.push(entry);
                }
            }
        }

        if manual > 0 {
            info!(
                total = conflicts.len(),
                manual, "conflict set needs manual resolution"
            );
            ResolutionOutcome::Unresolved(entries)
        } else {
            info!(total = conflicts.len(), "conflict set fully auto-resolved");
            ResolutionOutcome::Resolved(resolved)
        }
    }

    fn resolve_one(&self, sides: &ConflictSides) -> Result<ResolvedFile, ConflictEntry> {
        let category = classify(&sides.path, sides.ours.as_deref(), sides.theirs.as_deref());
        debug!(path = %sides.path, category = %category, "classifying conflict");

        let (ours, theirs) = match (&sides.ours, &sides.theirs) {
            (Some(o), Some(t)) => (o.as_slice(), t.as_slice()),
            _ => {
                // Delete/modify conflicts have no safe automatic answer.
                let err =
                    ParseError::MissingSide(if sides.ours.is_none() { "ours" } else { "theirs" });
                warn!(path = %sides.path, error = %err, "escalating to manual");
                return Err(ConflictEntry::manual(&sides.path, category));
            }
        };

        let result = match category {
            ContentCategory::StructuredData => structured::merge(&sides.path, ours, theirs)
                .map(|content| (content, Resolution::AutoMerged)),
            ContentCategory::Prose => {
                prose::dual_retain(ours, theirs, &self.ours_label, &self.theirs_label)
                    .map(|content| (content, Resolution::DualRetained))
            }
            ContentCategory::Unknown => {
                debug!(path = %sides.path, "unrecognized content, escalating to manual");
                return Err(ConflictEntry::manual(&sides.path, category));
            }
        };

        match result {
            Ok((content, resolution)) => Ok(ResolvedFile {
                path: sides.path.clone(),
                content,
                entry: ConflictEntry::new(&sides.path, category, resolution),
            }),
            Err(err) => {
                warn!(path = %sides.path, error = %err, "auto-resolution failed, escalating to manual");
                Err(ConflictEntry::manual(&sides.path, category))
            }
        }
    }
}
