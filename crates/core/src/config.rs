//! TOML-based configuration for Mergeline.
//!
//! Every field has a serde default so a missing file (or a partial one)
//! yields a working configuration; an explicitly-passed path that does not
//! exist is an error. Relative report and shared-state paths are resolved
//! against the workspace directory so runs behave the same from any cwd.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// File name probed in the current directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "mergeline.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level engine configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Repository location and branch naming.
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Report artifact settings.
    #[serde(default)]
    pub reports: ReportsConfig,

    /// Advisory shared-state digest settings.
    #[serde(default)]
    pub insights: InsightsConfig,

    /// Committer identity for integration merge commits.
    #[serde(default)]
    pub identity: IdentityConfig,
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Workspace repository and branch naming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Path to the working-tree repository the engine operates in.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Long-lived branch contributor work is integrated into.
    #[serde(default = "default_mainline")]
    pub mainline: String,

    /// Remote whose branches are enumerated and fetched.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Prefix selecting candidate contributor branches.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}
fn default_mainline() -> String {
    "main".into()
}
fn default_remote() -> String {
    "origin".into()
}
fn default_branch_prefix() -> String {
    "agent/".into()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            mainline: default_mainline(),
            remote: default_remote(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Report artifact configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Directory report artifacts are written to.
    #[serde(default = "default_reports_dir")]
    pub directory: PathBuf,

    /// How many recent per-branch artifacts the run summary references.
    #[serde(default = "default_tail")]
    pub tail: usize,
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from(".mergeline/reports")
}
fn default_tail() -> usize {
    10
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            directory: default_reports_dir(),
            tail: default_tail(),
        }
    }
}

// ---------------------------------------------------------------------------
// Insights
// ---------------------------------------------------------------------------

/// Shared-state digest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsConfig {
    /// Path to the contributors' shared-memory JSON file.
    #[serde(default = "default_shared_state")]
    pub shared_state: PathBuf,
}

fn default_shared_state() -> PathBuf {
    PathBuf::from("shared/agent_memory.json")
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            shared_state: default_shared_state(),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Committer identity used for integration merge commits.
///
/// Not read from ambient git configuration, so runs behave the same in
/// clean environments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_name")]
    pub name: String,

    #[serde(default = "default_identity_email")]
    pub email: String,
}

fn default_identity_name() -> String {
    "mergeline".into()
}
fn default_identity_email() -> String {
    "mergeline@localhost".into()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_identity_name(),
            email: default_identity_email(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl EngineConfig {
    /// Load an [`EngineConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load from an explicit path, or probe [`DEFAULT_CONFIG_FILE`] and fall
    /// back to defaults when it is absent.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load_from_file(fallback)
                } else {
                    debug!("no configuration file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.mainline.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.mainline".into(),
                detail: "mainline branch name must not be empty".into(),
            });
        }
        if self.repository.mainline.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                field: "repository.mainline".into(),
                detail: "mainline branch name must not contain whitespace".into(),
            });
        }
        if self.repository.remote.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.remote".into(),
                detail: "remote name must not be empty".into(),
            });
        }
        if self.repository.branch_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.branch_prefix".into(),
                detail: "branch prefix must not be empty (it selects candidates)".into(),
            });
        }
        if self.repository.branch_prefix.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                field: "repository.branch_prefix".into(),
                detail: "branch prefix must not contain whitespace".into(),
            });
        }
        if self.reports.tail == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reports.tail".into(),
                detail: "summary tail must be > 0".into(),
            });
        }
        if self.identity.name.is_empty() || self.identity.email.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "identity".into(),
                detail: "committer name and email must not be empty".into(),
            });
        }

        Ok(())
    }

    /// Reports directory with a relative path resolved against the workspace.
    pub fn reports_dir(&self) -> PathBuf {
        resolve_against_workspace(&self.repository.workspace, &self.reports.directory)
    }

    /// Shared-state path with a relative path resolved against the workspace.
    pub fn shared_state_path(&self) -> PathBuf {
        resolve_against_workspace(&self.repository.workspace, &self.insights.shared_state)
    }
}

fn resolve_against_workspace(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}
