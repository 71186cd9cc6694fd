//! Report artifacts for merge runs.
//!
//! Every processed branch gets one JSON artifact and every run one
//! summary artifact, both under the configured reports directory. Artifact
//! names carry the branch slug and the run stamp so repeated runs never
//! overwrite each other. Reporting failures are the caller's to log; they
//! must never abort integration work.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::errors::ReportError;
use crate::models::{self, MergeReport, RunSummary};

/// Writes per-branch report artifacts and the run-level summary.
pub struct ReportEmitter {
    directory: PathBuf,
    tail: usize,
}

impl ReportEmitter {
    pub fn new(directory: impl Into<PathBuf>, tail: usize) -> Self {
        Self {
            directory: directory.into(),
            tail,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.reports_dir(), config.reports.tail)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write one branch's report artifact. Returns the artifact file name.
    pub fn record(&self, report: &MergeReport, run_id: &str) -> Result<String, ReportError> {
        fs::create_dir_all(&self.directory)?;
        let name = format!("report-{}-{}.json", models::slug(&report.branch), run_id);
        let path = self.directory.join(&name);
        let mut body = serde_json::to_vec_pretty(report)?;
        body.push(b'\n');
        fs::write(&path, body)?;
        debug!(artifact = %name, branch = %report.branch, status = %report.status, "wrote merge report");
        Ok(name)
    }

    /// Fill the summary's artifact tail and write the run-level artifact.
    pub fn summarize(&self, summary: &mut RunSummary) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.directory)?;
        summary.recent_artifacts = self.recent_artifacts()?;
        let name = format!("summary-{}.json", summary.run_id);
        let path = self.directory.join(&name);
        let mut body = serde_json::to_vec_pretty(summary)?;
        body.push(b'\n');
        fs::write(&path, body)?;
        info!(artifact = %name, branches = summary.records.len(), "wrote run summary");
        Ok(path)
    }

    /// Load one report artifact by file name.
    pub fn load(&self, name: &str) -> Result<MergeReport, ReportError> {
        let bytes = fs::read(self.directory.join(name))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All per-branch artifacts on disk, newest first.
    pub fn list(&self) -> Result<Vec<String>, ReportError> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }
        self.artifacts_by_age().map(|v| v.into_iter().map(|(_, n)| n).collect())
    }

    /// Newest-first tail of per-branch artifacts currently on disk.
    fn recent_artifacts(&self) -> Result<Vec<String>, ReportError> {
        Ok(self
            .artifacts_by_age()?
            .into_iter()
            .take(self.tail)
            .map(|(_, n)| n)
            .collect())
    }

    fn artifacts_by_age(&self) -> Result<Vec<(SystemTime, String)>, ReportError> {
        let mut entries: Vec<(SystemTime, String)> = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("report-") || !name.ends_with(".json") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((modified, name));
        }
        entries.sort_by(|a, b| b.cmp(a));
        Ok(entries)
    }
}
