//! Repository access for the integration engine.
//!
//! All repository mutation funnels through [`RepositoryGateway`]: the
//! orchestrator and resolver never touch the working tree directly. That
//! keeps the sequential single-writer discipline enforceable in one place
//! and lets the orchestrator be tested against a scripted fake.

pub mod git;

pub use git::GitGateway;

use crate::conflict::{ConflictSides, ResolvedFile};
use crate::errors::GatewayError;
use crate::models::{Branch, RepoSnapshot};

/// Prefix for the short-lived local branches merges are attempted on.
pub const INTEGRATION_PREFIX: &str = "integration/";

/// Handle to a short-lived integration branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHandle {
    pub name: String,
}

/// Result of a non-committing merge attempt.
///
/// Conflicts are a normal return value here, never an error: only failures
/// of the merge machinery itself surface as [`GatewayError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeProbe {
    /// The branch is already contained in the integration tip.
    NoOp,
    /// The merge applied cleanly and is staged, with changes present.
    Staged,
    /// The merge stopped on conflicts in these workspace-relative paths.
    Conflicted(Vec<String>),
}

/// The only component permitted to mutate repository state.
pub trait RepositoryGateway {
    /// Fetch all remote state and prune stale references. Failure is fatal
    /// to the run: processing cannot start on stale data.
    fn synchronize(&self) -> Result<(), GatewayError>;

    /// List remote-tracking branches whose short name starts with `prefix`,
    /// excluding symbolic references such as the remote HEAD pointer.
    /// Returned in a stable order; this order defines report order.
    fn list_candidate_branches(&self, prefix: &str) -> Result<Vec<Branch>, GatewayError>;

    /// Create a uniquely named (timestamp-suffixed) local integration branch
    /// at the mainline tip and check it out.
    fn create_integration_branch(&self, for_branch: &Branch)
        -> Result<BranchHandle, GatewayError>;

    /// Attempt a non-committing, no-fast-forward merge of `branch` into the
    /// currently checked-out integration branch.
    fn attempt_merge(&self, branch: &Branch) -> Result<MergeProbe, GatewayError>;

    /// Both sides of every conflicted path in the in-progress merge, as raw
    /// bytes so binary content survives extraction.
    fn conflict_sides(&self) -> Result<Vec<ConflictSides>, GatewayError>;

    /// Write resolved file contents into the working tree and stage them,
    /// clearing their conflict entries.
    fn apply_resolutions(&self, files: &[ResolvedFile]) -> Result<(), GatewayError>;

    /// Commit the staged merge with both parents recorded; returns the new
    /// commit id.
    fn commit_staged(&self, message: &str) -> Result<String, GatewayError>;

    /// Discard an in-progress merge and restore the pre-merge tree.
    fn abort_merge(&self) -> Result<(), GatewayError>;

    /// Advance the mainline reference to the integration branch tip. Refused
    /// unless the tip is a descendant of the current mainline.
    fn fast_forward_mainline(&self, from: &BranchHandle) -> Result<(), GatewayError>;

    /// Force the working tree back onto the mainline branch.
    fn checkout_mainline(&self) -> Result<(), GatewayError>;

    /// Delete a local integration branch after its attempt is finalized.
    fn delete_branch(&self, handle: &BranchHandle) -> Result<(), GatewayError>;

    /// Current branch, mainline tip and surviving integration branches, for
    /// the run summary and post-condition checks.
    fn status_snapshot(&self) -> Result<RepoSnapshot, GatewayError>;
}
