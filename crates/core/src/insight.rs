//! Advisory digest of the contributors' shared-state file.
//!
//! Contributing agents append discoveries, pre-flagged key conflicts, and
//! decisions to a shared JSON file while they work. Before a merge pass
//! the engine surfaces a short digest of that file so the operator knows
//! what the contributors already know. The digest is advisory only: a
//! missing or malformed file logs a warning and renders nothing.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::InsightError;

/// Shared-state file layout produced by the contributing agents.
///
/// Every field defaults so partially written or older files still parse.
#[derive(Debug, Default, Deserialize)]
pub struct SharedState {
    /// Discovery records keyed by agent id, then by discovery key.
    #[serde(default)]
    pub discoveries: BTreeMap<String, BTreeMap<String, Discovery>>,
    /// Conflicts the agents flagged themselves while working.
    #[serde(default)]
    pub conflicts: Vec<KeyConflict>,
    /// Decisions recorded to settle conflicting discoveries.
    #[serde(default)]
    pub decisions: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Bookkeeping block the agents maintain alongside the data.
#[derive(Debug, Default, Deserialize)]
pub struct Metadata {
    /// Running discovery total; recomputed here when absent.
    #[serde(default)]
    pub total_discoveries: Option<usize>,
}

/// One discovery entry. Only the fields the digest consumes are modeled.
#[derive(Debug, Default, Deserialize)]
pub struct Discovery {
    #[serde(default)]
    pub timestamp: String,
}

/// A key claimed by more than one agent with differing values.
#[derive(Debug, Default, Deserialize)]
pub struct KeyConflict {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub agents: Vec<String>,
}

/// Renders the pre-run digest of agent activity.
pub struct InsightSummarizer;

impl InsightSummarizer {
    /// Read and render the digest. Never fails: problems are logged and an
    /// empty digest returned so the merge pass proceeds regardless.
    pub fn digest(path: &Path) -> String {
        match Self::load(path) {
            Ok(state) => Self::render(&state),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "shared state unavailable, skipping digest");
                String::new()
            }
        }
    }

    /// Parse the shared-state file.
    pub fn load(path: &Path) -> Result<SharedState, InsightError> {
        let bytes = fs::read(path)?;
        let state = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), "loaded shared state");
        Ok(state)
    }

    fn render(state: &SharedState) -> String {
        let total = state
            .metadata
            .total_discoveries
            .unwrap_or_else(|| state.discoveries.values().map(|d| d.len()).sum());
        let mut out = String::new();
        let _ = writeln!(
            out,
            "agent activity: {} agents, {} discoveries, {} pre-flagged conflicts, {} decisions",
            state.discoveries.len(),
            total,
            state.conflicts.len(),
            state.decisions.len(),
        );

        for (agent, discoveries) in &state.discoveries {
            let last_active = discoveries
                .values()
                .map(|d| d.timestamp.as_str())
                .max()
                .filter(|t| !t.is_empty())
                .unwrap_or("never");
            let _ = writeln!(
                out,
                "  {}: {} discoveries, last active {}",
                agent,
                discoveries.len(),
                last_active,
            );
        }

        if !state.conflicts.is_empty() {
            let _ = writeln!(out, "pre-flagged key conflicts:");
            for conflict in &state.conflicts {
                let _ = writeln!(
                    out,
                    "  '{}' between {}",
                    conflict.key,
                    conflict.agents.join(", "),
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "discoveries": {
            "backend_agent": {
                "api_endpoint_pattern": {
                    "agent_id": "backend_agent",
                    "key": "api_endpoint_pattern",
                    "value": {"pattern": "/api/v1/{resource}/{id}"},
                    "timestamp": "2025-06-02T10:00:00",
                    "confidence": 0.95,
                    "tags": ["api", "rest"]
                },
                "db_schema": {
                    "timestamp": "2025-06-02T11:30:00"
                }
            },
            "frontend_agent": {
                "api_endpoint_pattern": {
                    "timestamp": "2025-06-02T09:00:00"
                }
            }
        },
        "conflicts": [
            {
                "key": "api_endpoint_pattern",
                "agents": ["frontend_agent", "backend_agent"],
                "values": ["a", "b"],
                "timestamp": "2025-06-02T10:00:01"
            }
        ],
        "decisions": {
            "api_endpoint_pattern": {
                "decision": {"winner": "backend_agent"},
                "decided_by": "coordinator",
                "timestamp": "2025-06-02T12:00:00"
            }
        },
        "metadata": {
            "created": "2025-06-02T08:00:00",
            "version": "1.0",
            "total_discoveries": 3
        }
    }"#;

    #[test]
    fn test_digest_summarizes_agents_and_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_memory.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let digest = InsightSummarizer::digest(&path);
        assert!(digest.contains("2 agents, 3 discoveries, 1 pre-flagged conflicts, 1 decisions"));
        assert!(digest.contains("backend_agent: 2 discoveries, last active 2025-06-02T11:30:00"));
        assert!(digest.contains("frontend_agent: 1 discoveries"));
        assert!(digest.contains("'api_endpoint_pattern' between frontend_agent, backend_agent"));
    }

    #[test]
    fn test_digest_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let digest = InsightSummarizer::digest(&dir.path().join("absent.json"));
        assert!(digest.is_empty());
    }

    #[test]
    fn test_digest_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_memory.json");
        std::fs::write(&path, b"not json {").unwrap();
        assert!(InsightSummarizer::digest(&path).is_empty());
    }

    #[test]
    fn test_minimal_object_renders_zero_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_memory.json");
        std::fs::write(&path, b"{}").unwrap();

        let digest = InsightSummarizer::digest(&path);
        assert!(digest.contains("0 agents, 0 discoveries, 0 pre-flagged conflicts, 0 decisions"));
    }

    #[test]
    fn test_load_tolerates_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_memory.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let state = InsightSummarizer::load(&path).unwrap();
        assert_eq!(state.discoveries.len(), 2);
        assert_eq!(state.conflicts[0].agents.len(), 2);
        assert_eq!(state.decisions.len(), 1);
        assert_eq!(state.metadata.total_discoveries, Some(3));
    }

    #[test]
    fn test_metadata_total_wins_over_counting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_memory.json");
        std::fs::write(
            &path,
            br#"{"discoveries": {"a": {"k": {"timestamp": ""}}},
                 "metadata": {"total_discoveries": 7}}"#,
        )
        .unwrap();

        let digest = InsightSummarizer::digest(&path);
        assert!(digest.contains("1 agents, 7 discoveries"));
    }
}
