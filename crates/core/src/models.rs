//! Domain model types used throughout Mergeline.
//!
//! These types bridge the orchestrator, the conflict resolver, and the
//! report artifacts written for external consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

/// A candidate branch enumerated at run start.
///
/// Immutable for the duration of a run; `name` is the short form shown in
/// reports (e.g. `agent/pricing`), `refname` the full reference the gateway
/// resolves (e.g. `refs/remotes/origin/agent/pricing`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub refname: String,
    pub is_remote: bool,
}

impl Branch {
    /// A remote-tracking branch under the given remote.
    pub fn remote(remote: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            refname: format!("refs/remotes/{}/{}", remote, name),
            is_remote: true,
        }
    }

    /// Branch name reduced to a form safe for reference and file name
    /// components (`agent/pricing` becomes `agent-pricing`).
    pub fn slug(&self) -> String {
        slug(&self.name)
    }
}

/// Reduce an arbitrary branch name to filesystem- and refname-safe form.
pub fn slug(name: &str) -> String {
    static SLUG: OnceLock<regex_lite::Regex> = OnceLock::new();
    let re = SLUG.get_or_init(|| regex_lite::Regex::new(r"[^A-Za-z0-9._-]+").unwrap());
    re.replace_all(name, "-").trim_matches('-').to_string()
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal result of one merge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Merge succeeded with changes present.
    Clean,
    /// Merge succeeded but produced no diff against mainline.
    NoChange,
    /// Conflicts were detected and every file was automatically resolved.
    ResolvedConflict,
    /// At least one conflicted file requires manual intervention.
    UnresolvedConflict,
    /// An operation failed unexpectedly (checkout, commit, ...).
    Error,
}

impl Outcome {
    /// Map onto the four-value status vocabulary used in report artifacts.
    ///
    /// A resolved conflict is a landed merge, so it surfaces as `success`;
    /// the report's details and conflict entries carry the evidence that
    /// resolution happened.
    pub fn status(&self) -> ReportStatus {
        match self {
            Self::Clean | Self::ResolvedConflict => ReportStatus::Success,
            Self::NoChange => ReportStatus::NoChanges,
            Self::UnresolvedConflict => ReportStatus::Conflict,
            Self::Error => ReportStatus::Error,
        }
    }

    /// Whether this outcome advanced the mainline.
    pub fn advanced_mainline(&self) -> bool {
        matches!(self, Self::Clean | Self::ResolvedConflict)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::NoChange => write!(f, "no_change"),
            Self::ResolvedConflict => write!(f, "resolved_conflict"),
            Self::UnresolvedConflict => write!(f, "unresolved_conflict"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// External status vocabulary for report artifacts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    NoChanges,
    Conflict,
    Error,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NoChanges => write!(f, "no_changes"),
            Self::Conflict => write!(f, "conflict"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Conflict entries
// ---------------------------------------------------------------------------

/// Detected content category of a conflicted file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    /// Key-value serialization formats (JSON, TOML).
    StructuredData,
    /// Free-text documentation.
    Prose,
    /// Binary or unrecognized formats.
    Unknown,
}

impl std::fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StructuredData => write!(f, "structured_data"),
            Self::Prose => write!(f, "prose"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// How one conflicted file was (or was not) resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Both sides merged by key union, theirs winning collisions.
    AutoMerged,
    /// Both versions kept verbatim under labeled headers.
    DualRetained,
    /// No safe automatic strategy; left for a human.
    RequiresManual,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoMerged => write!(f, "auto_merged"),
            Self::DualRetained => write!(f, "dual_retained"),
            Self::RequiresManual => write!(f, "requires_manual"),
        }
    }
}

/// One conflicted file's classification and resolution result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictEntry {
    pub path: String,
    pub category: ContentCategory,
    pub resolution: Resolution,
}

impl ConflictEntry {
    pub fn new(path: impl Into<String>, category: ContentCategory, resolution: Resolution) -> Self {
        Self {
            path: path.into(),
            category,
            resolution,
        }
    }

    /// Shorthand for the unresolvable case.
    pub fn manual(path: impl Into<String>, category: ContentCategory) -> Self {
        Self::new(path, category, Resolution::RequiresManual)
    }
}

// ---------------------------------------------------------------------------
// Merge report
// ---------------------------------------------------------------------------

/// The per-branch audit record, written once per branch per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub id: String,
    pub branch: String,
    pub status: ReportStatus,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub mainline_branch: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictEntry>,
}

impl MergeReport {
    /// Create a report from a terminal outcome.
    pub fn new(
        branch: &Branch,
        outcome: Outcome,
        details: impl Into<String>,
        mainline_branch: &str,
        conflicts: Vec<ConflictEntry>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            branch: branch.name.clone(),
            status: outcome.status(),
            details: details.into(),
            timestamp: Utc::now(),
            mainline_branch: mainline_branch.to_string(),
            conflicts,
        }
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// Final repository state captured after the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSnapshot {
    /// Branch the working tree is checked out on.
    pub current_branch: String,
    /// Commit id the mainline reference points at.
    pub mainline_tip: String,
    /// Integration branches still present (expected empty).
    pub integration_branches: Vec<String>,
}

/// One row per processed branch in the run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRecord {
    pub branch: String,
    pub status: ReportStatus,
    pub details: String,
    /// File name of this branch's report artifact, when recording succeeded.
    pub artifact: Option<String>,
}

/// Aggregate of one invocation: every branch considered, every outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Compact UTC stamp keying this run's artifacts.
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mainline_branch: String,
    /// Branch names in discovery order.
    pub branches: Vec<String>,
    pub records: Vec<BranchRecord>,
    /// Set when the halt checkpoint stopped the run early.
    pub interrupted: bool,
    /// Newest-first tail of per-branch artifacts in the reports directory.
    #[serde(default)]
    pub recent_artifacts: Vec<String>,
    pub final_state: Option<RepoSnapshot>,
}

impl RunSummary {
    /// Number of branches whose merge landed on the mainline.
    pub fn merged_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == ReportStatus::Success)
            .count()
    }

    /// Number of branches needing manual attention.
    pub fn conflict_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == ReportStatus::Conflict)
            .count()
    }
}
