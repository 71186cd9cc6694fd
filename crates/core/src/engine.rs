//! Sequential integration of contributor branches into the mainline.
//!
//! The [`MergeEngine`] is the heart of Mergeline. It drives every branch
//! through the same state machine:
//!
//! 1. Isolate: create a disposable integration branch at the mainline tip.
//! 2. Attempt: merge the contributor branch without committing.
//! 3. Resolve: on conflicts, delegate to the [`ConflictResolver`].
//! 4. Land: commit and fast-forward the mainline when the merge succeeded.
//! 5. Finalize: return to the mainline and delete the integration branch.
//!
//! Branches are processed strictly sequentially. The working tree is the
//! one shared mutable resource and has exactly one valid checkout at a
//! time, so there is nothing to parallelize without a worktree per branch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::conflict::{ConflictResolver, ResolutionOutcome};
use crate::errors::EngineError;
use crate::gateway::{BranchHandle, MergeProbe, RepositoryGateway};
use crate::models::{
    Branch, BranchRecord, ConflictEntry, MergeReport, Outcome, Resolution, RunSummary,
};
use crate::report::ReportEmitter;

// ---------------------------------------------------------------------------
// Per-branch state machine
// ---------------------------------------------------------------------------

/// States a branch passes through while being integrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePhase {
    Discovered,
    Isolated,
    Attempted,
    Resolving,
    Finalized,
}

impl std::fmt::Display for MergePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovered => write!(f, "discovered"),
            Self::Isolated => write!(f, "isolated"),
            Self::Attempted => write!(f, "attempted"),
            Self::Resolving => write!(f, "resolving"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// One branch being driven through the state machine. Discarded once its
/// report is emitted.
struct MergeAttempt {
    branch: Branch,
    handle: Option<BranchHandle>,
    phase: MergePhase,
    started_at: DateTime<Utc>,
}

impl MergeAttempt {
    fn new(branch: Branch) -> Self {
        Self {
            branch,
            handle: None,
            phase: MergePhase::Discovered,
            started_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The sequential integration engine.
///
/// Generic over the gateway so the state machine can be exercised against
/// a scripted fake as well as a real repository.
pub struct MergeEngine<G: RepositoryGateway> {
    config: EngineConfig,
    gateway: G,
    emitter: ReportEmitter,
    /// Cooperative stop flag, honored between branches only.
    halt: Arc<AtomicBool>,
}

impl<G: RepositoryGateway> MergeEngine<G> {
    pub fn new(config: EngineConfig, gateway: G) -> Self {
        let emitter = ReportEmitter::from_config(&config);
        info!(mainline = %config.repository.mainline, "initializing merge engine");
        Self {
            config,
            gateway,
            emitter,
            halt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Handle a caller can set to stop the run at the next checkpoint.
    /// A halt never interrupts the branch currently being processed.
    pub fn halt_handle(&self) -> Arc<AtomicBool> {
        self.halt.clone()
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Execute one full integration run.
    ///
    /// Fails only when the repository cannot be synchronized or the branch
    /// list cannot be discovered; everything after that point is recorded
    /// per branch and the run carries on. Every processed branch yields
    /// exactly one [`MergeReport`], emitted in discovery order.
    pub fn run(&self) -> Result<RunSummary, EngineError> {
        let run_id = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, "starting integration run");

        self.gateway
            .synchronize()
            .map_err(EngineError::Synchronize)?;
        let branches = self
            .gateway
            .list_candidate_branches(&self.config.repository.branch_prefix)
            .map_err(EngineError::Discovery)?;
        info!(candidates = branches.len(), "beginning merge pass");

        let mut records = Vec::new();
        let mut interrupted = false;

        for branch in &branches {
            // Cooperative checkpoint: a halt takes effect here, never
            // mid-attempt.
            if self.halt.load(Ordering::SeqCst) {
                warn!(remaining = branches.len() - records.len(), "halt requested, stopping run");
                interrupted = true;
                break;
            }

            let report = self.process_branch(branch);
            let artifact = match self.emitter.record(&report, &run_id) {
                Ok(name) => Some(name),
                Err(err) => {
                    warn!(branch = %report.branch, error = %err, "could not write report artifact");
                    None
                }
            };
            records.push(BranchRecord {
                branch: report.branch,
                status: report.status,
                details: report.details,
                artifact,
            });
        }

        let final_state = match self.gateway.status_snapshot() {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(error = %err, "could not capture final repository state");
                None
            }
        };

        let mut summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            mainline_branch: self.config.repository.mainline.clone(),
            branches: branches.iter().map(|b| b.name.clone()).collect(),
            records,
            interrupted,
            recent_artifacts: Vec::new(),
            final_state,
        };
        if let Err(err) = self.emitter.summarize(&mut summary) {
            warn!(error = %err, "could not write run summary");
        }

        info!(
            merged = summary.merged_count(),
            conflicts = summary.conflict_count(),
            interrupted = summary.interrupted,
            "integration run finished"
        );
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Per-branch processing
    // -----------------------------------------------------------------------

    /// Drive one branch to a terminal outcome. Never fails: anything
    /// unexpected becomes [`Outcome::Error`] in the branch's report.
    fn process_branch(&self, branch: &Branch) -> MergeReport {
        info!(branch = %branch, "processing branch");
        let mut attempt = MergeAttempt::new(branch.clone());

        let (outcome, details, conflicts) = self.advance(&mut attempt);
        self.finalize(&mut attempt);

        info!(branch = %branch, outcome = %outcome, "branch finalized");
        MergeReport::new(
            branch,
            outcome,
            details,
            &self.config.repository.mainline,
            conflicts,
        )
    }

    fn advance(&self, attempt: &mut MergeAttempt) -> (Outcome, String, Vec<ConflictEntry>) {
        // Discovered -> Isolated
        let handle = match self.gateway.create_integration_branch(&attempt.branch) {
            Ok(handle) => handle,
            Err(err) => {
                error!(branch = %attempt.branch, error = %err, "could not isolate branch");
                return (
                    Outcome::Error,
                    format!("could not create integration branch: {err}"),
                    Vec::new(),
                );
            }
        };
        attempt.handle = Some(handle.clone());
        attempt.phase = MergePhase::Isolated;

        // Isolated -> Attempted
        let probe = match self.gateway.attempt_merge(&attempt.branch) {
            Ok(probe) => probe,
            Err(err) => {
                error!(branch = %attempt.branch, error = %err, "merge attempt failed");
                self.try_abort();
                return (
                    Outcome::Error,
                    format!("merge attempt failed: {err}"),
                    Vec::new(),
                );
            }
        };
        attempt.phase = MergePhase::Attempted;

        match probe {
            MergeProbe::NoOp => (
                Outcome::NoChange,
                "no changes relative to mainline".to_string(),
                Vec::new(),
            ),
            MergeProbe::Staged => self.land(attempt, &handle, Vec::new()),
            MergeProbe::Conflicted(paths) => self.resolve(attempt, &handle, &paths),
        }
    }

    /// Commit the staged merge and fast-forward the mainline onto it.
    fn land(
        &self,
        attempt: &MergeAttempt,
        handle: &BranchHandle,
        entries: Vec<ConflictEntry>,
    ) -> (Outcome, String, Vec<ConflictEntry>) {
        let message = commit_message(
            &attempt.branch.name,
            &self.config.repository.mainline,
            entries.len(),
        );
        let sha = match self.gateway.commit_staged(&message) {
            Ok(sha) => sha,
            Err(err) => {
                error!(branch = %attempt.branch, error = %err, "commit failed");
                self.try_abort();
                return (
                    Outcome::Error,
                    format!("commit failed: {err}"),
                    entries,
                );
            }
        };

        if let Err(err) = self.gateway.fast_forward_mainline(handle) {
            error!(branch = %attempt.branch, error = %err, "fast-forward failed");
            return (
                Outcome::Error,
                format!("fast-forward failed: {err}"),
                entries,
            );
        }

        let short = &sha[..8.min(sha.len())];
        if entries.is_empty() {
            (Outcome::Clean, format!("merged as {short}"), entries)
        } else {
            let details = format!(
                "merged as {short} after resolving {} conflict(s)",
                entries.len()
            );
            (Outcome::ResolvedConflict, details, entries)
        }
    }

    /// Delegate a conflicted merge to the resolver, then land or abort.
    fn resolve(
        &self,
        attempt: &mut MergeAttempt,
        handle: &BranchHandle,
        paths: &[String],
    ) -> (Outcome, String, Vec<ConflictEntry>) {
        attempt.phase = MergePhase::Resolving;
        info!(branch = %attempt.branch, conflicts = paths.len(), "attempting automatic resolution");

        let sides = match self.gateway.conflict_sides() {
            Ok(sides) => sides,
            Err(err) => {
                error!(branch = %attempt.branch, error = %err, "could not read conflict contents");
                self.try_abort();
                return (
                    Outcome::Error,
                    format!("could not read conflict contents: {err}"),
                    Vec::new(),
                );
            }
        };

        let resolver = ConflictResolver::new(
            &self.config.repository.mainline,
            &attempt.branch.name,
        );
        match resolver.resolve(&sides) {
            ResolutionOutcome::Resolved(files) => {
                let entries: Vec<ConflictEntry> =
                    files.iter().map(|f| f.entry.clone()).collect();
                if let Err(err) = self.gateway.apply_resolutions(&files) {
                    error!(branch = %attempt.branch, error = %err, "could not stage resolutions");
                    self.try_abort();
                    return (
                        Outcome::Error,
                        format!("could not stage resolutions: {err}"),
                        entries,
                    );
                }
                self.land(attempt, handle, entries)
            }
            ResolutionOutcome::Unresolved(entries) => {
                let manual = entries
                    .iter()
                    .filter(|e| e.resolution == Resolution::RequiresManual)
                    .count();
                // Outcome is already decided; a failed abort is logged only.
                if let Err(err) = self.gateway.abort_merge() {
                    error!(branch = %attempt.branch, error = %err, "abort after unresolved conflicts failed");
                }
                let details = format!(
                    "{manual} of {} conflicted file(s) require manual resolution",
                    entries.len()
                );
                (Outcome::UnresolvedConflict, details, entries)
            }
        }
    }

    /// Return to the mainline and delete the integration branch. Runs on
    /// every exit path; failures here never change the decided outcome.
    fn finalize(&self, attempt: &mut MergeAttempt) {
        if let Err(err) = self.gateway.checkout_mainline() {
            warn!(branch = %attempt.branch, error = %err, "could not return to mainline");
        }
        if let Some(handle) = &attempt.handle {
            if let Err(err) = self.gateway.delete_branch(handle) {
                warn!(
                    branch = %attempt.branch,
                    integration = %handle.name,
                    error = %err,
                    "could not delete integration branch"
                );
            }
        }
        attempt.phase = MergePhase::Finalized;
        debug!(
            branch = %attempt.branch,
            phase = %attempt.phase,
            elapsed_ms = (Utc::now() - attempt.started_at).num_milliseconds(),
            "attempt complete"
        );
    }

    fn try_abort(&self) {
        if let Err(err) = self.gateway.abort_merge() {
            warn!(error = %err, "abort of in-progress merge failed");
        }
    }
}

fn commit_message(branch: &str, mainline: &str, resolved: usize) -> String {
    if resolved == 0 {
        format!("merge {branch} into {mainline} (auto-integration)")
    } else {
        format!("merge {branch} into {mainline} (auto-integration) [resolved {resolved} conflict(s)]")
    }
}
