//! Error types for the Mergeline core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! The gateway taxonomy matters to the orchestrator: [`EngineError`] wraps
//! the two run-fatal cases (synchronize and discovery), while every other
//! gateway failure stays scoped to the branch being processed.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Insight(#[from] InsightError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Repository gateway errors
// ---------------------------------------------------------------------------

/// Errors from local repository (git2) operations.
///
/// Variants mirror the gateway operations so the orchestrator can tell a
/// branch-scoped failure from a cleanup problem it only needs to log.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The workspace path does not exist or is not a git repo.
    #[error("repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// Remote branch enumeration failed; the run cannot proceed.
    #[error("branch discovery failed: {0}")]
    Discovery(String),

    /// Fetching/pruning remote state failed; the run cannot proceed.
    #[error("failed to synchronize with remote '{remote}': {source}")]
    Synchronize {
        remote: String,
        #[source]
        source: git2::Error,
    },

    /// An integration branch could not be created or checked out.
    #[error("checkout failed for '{target}': {source}")]
    Checkout {
        target: String,
        #[source]
        source: git2::Error,
    },

    /// The merge machinery itself failed (not an ordinary conflict).
    #[error("merge attempt of '{branch}' failed: {source}")]
    Merge {
        branch: String,
        #[source]
        source: git2::Error,
    },

    /// The staged merge could not be committed.
    #[error("commit of staged merge failed: {0}")]
    Commit(String),

    /// An in-progress merge could not be discarded.
    #[error("merge abort failed: {source}")]
    Abort {
        #[source]
        source: git2::Error,
    },

    /// The mainline reference could not be advanced.
    #[error("fast-forward of '{branch}' refused: {detail}")]
    FastForward {
        branch: String,
        detail: String,
    },

    /// An integration branch could not be deleted after its attempt.
    #[error("cleanup failed for '{branch}': {source}")]
    Cleanup {
        branch: String,
        #[source]
        source: git2::Error,
    },

    /// A resolved file could not be written back or staged.
    #[error("failed to stage resolution for '{path}': {detail}")]
    Stage {
        path: String,
        detail: String,
    },

    /// A `git2` library error outside the named operations.
    #[error("git2 error: {0}")]
    Git(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("repository I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Conflict resolution errors
// ---------------------------------------------------------------------------

/// Per-file failures inside the conflict resolver.
///
/// These never propagate: the resolver downgrades the affected file to
/// `RequiresManual` and keeps going.
#[derive(Debug, Error)]
pub enum ParseError {
    /// One side of the conflict is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// One side of the conflict is not valid TOML.
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Merged TOML could not be rendered back to text.
    #[error("cannot render merged TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),

    /// The document parsed but is not a key-value map at the top level.
    #[error("top-level value is {0}, expected a key-value map")]
    NotMap(&'static str),

    /// The content is binary or not valid UTF-8.
    #[error("content is not text")]
    NotText,

    /// The conflict has no content for one side (e.g. delete/modify).
    #[error("missing '{0}' side of the conflict")]
    MissingSide(&'static str),
}

// ---------------------------------------------------------------------------
// Report emitter errors
// ---------------------------------------------------------------------------

/// Errors writing report artifacts. Logged by the orchestrator, never fatal.
#[derive(Debug, Error)]
pub enum ReportError {
    /// JSON serialization failure.
    #[error("report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Generic I/O error creating or writing an artifact.
    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Insight summarizer errors
// ---------------------------------------------------------------------------

/// Errors reading the shared-state file. Advisory only; the digest falls
/// back to empty output when these occur.
#[derive(Debug, Error)]
pub enum InsightError {
    /// The shared-state file exists but is not valid JSON.
    #[error("shared-state parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The shared-state file could not be read.
    #[error("shared-state I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Run-fatal failures. Everything else the engine absorbs into per-branch
/// outcomes; these two mean the run could not begin at all.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The initial fetch/prune failed; local state may be stale.
    #[error("cannot start run, remote synchronization failed: {0}")]
    Synchronize(#[source] GatewayError),

    /// The candidate branch list could not be enumerated.
    #[error("cannot start run, branch discovery failed: {0}")]
    Discovery(#[source] GatewayError),
}
