//! Conflict classification and automatic resolution.
//!
//! Everything in this module is pure: the gateway extracts both sides of
//! each conflicted file from the merge index, the resolver decides what to
//! do with them, and the gateway writes the results back. No function here
//! touches the repository.

pub mod classify;
pub mod prose;
pub mod resolver;
pub mod structured;

pub use classify::classify;
pub use resolver::{ConflictResolver, ResolutionOutcome};

use crate::models::ConflictEntry;

/// Both sides of one conflicted file, as captured from the merge index.
///
/// `ours` is the integration branch content (stage 2), `theirs` the
/// contributor branch content (stage 3). A side is `None` when that stage
/// has no entry, e.g. the file was deleted on one side.
#[derive(Debug, Clone)]
pub struct ConflictSides {
    /// Repository-relative path of the conflicted file.
    pub path: String,
    pub ours: Option<Vec<u8>>,
    pub theirs: Option<Vec<u8>>,
}

/// Replacement content for one conflicted file, ready to stage.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// Repository-relative path of the file.
    pub path: String,
    /// Full file content to write in place of the conflicted version.
    pub content: Vec<u8>,
    /// Audit entry describing how the file was resolved.
    pub entry: ConflictEntry,
}
