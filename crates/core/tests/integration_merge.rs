//! End-to-end tests driving [`MergeEngine`] over real git repositories.
//!
//! Each test wires up the real stack: a bare "origin" repository, a
//! workspace clone with a working tree, contributor branches seeded in the
//! origin, and a `MergeEngine<GitGateway>` run against it. No network I/O:
//! the remote is a local bare repository reached through the filesystem.

use std::path::{Path, PathBuf};

use git2::{Oid, Repository, RepositoryInitOptions};
use tempfile::TempDir;

use mergeline_core::config::EngineConfig;
use mergeline_core::engine::MergeEngine;
use mergeline_core::gateway::GitGateway;
use mergeline_core::models::{ReportStatus, RunSummary};

// ===========================================================================
// Helpers
// ===========================================================================

/// Create a bare origin plus a workspace whose `main` holds the given
/// initial files, already pushed to the origin. Returns both directories.
fn setup_workspace(tmp: &Path, files: &[(&str, &[u8])]) -> (PathBuf, PathBuf) {
    let origin_dir = tmp.join("origin.git");
    let mut opts = RepositoryInitOptions::new();
    opts.bare(true).initial_head("main");
    Repository::init_opts(&origin_dir, &opts).expect("init bare origin");

    let work_dir = tmp.join("workspace");
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(&work_dir, &opts).expect("init workspace");
    let mut cfg = repo.config().unwrap();
    cfg.set_str("user.name", "Fixture").unwrap();
    cfg.set_str("user.email", "fixture@example.com").unwrap();
    repo.remote("origin", origin_dir.to_str().unwrap())
        .expect("add origin remote");

    commit_files(&repo, files, "initial layout");
    push_main(&repo);
    (work_dir, origin_dir)
}

/// Write files into the working tree, stage them, and commit on HEAD.
fn commit_files(repo: &Repository, files: &[(&str, &[u8])], msg: &str) -> Oid {
    let workdir = repo.workdir().expect("workspace has a working tree");
    let mut index = repo.index().unwrap();
    for (path, content) in files {
        let full = workdir.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = repo.signature().unwrap();
    // Unborn HEAD on the very first commit.
    let parents: Vec<git2::Commit> = repo
        .head()
        .ok()
        .and_then(|h| h.peel_to_commit().ok())
        .into_iter()
        .collect();
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parent_refs)
        .unwrap()
}

fn push_main(repo: &Repository) {
    let mut remote = repo.find_remote("origin").unwrap();
    remote
        .push(&["refs/heads/main:refs/heads/main"], None)
        .expect("push main to origin");
}

/// Create a contributor branch in the origin from `base`, layering file
/// edits on top. Stands in for an agent pushing its branch.
fn seed_origin_branch(
    origin_dir: &Path,
    branch: &str,
    base: Oid,
    files: &[(&str, &[u8])],
    msg: &str,
) -> Oid {
    let origin = Repository::open(origin_dir).unwrap();
    let parent = origin.find_commit(base).expect("base pushed to origin");
    let mut builder = origin.treebuilder(Some(&parent.tree().unwrap())).unwrap();
    for (path, content) in files {
        let blob = origin.blob(content).unwrap();
        builder.insert(*path, blob, 0o100644).unwrap();
    }
    let tree = origin.find_tree(builder.write().unwrap()).unwrap();
    let sig = git2::Signature::now("Agent", "agent@example.com").unwrap();
    let oid = origin
        .commit(None, &sig, &sig, msg, &tree, &[&parent])
        .unwrap();
    origin
        .reference(&format!("refs/heads/{}", branch), oid, true, "seed branch")
        .unwrap();
    oid
}

/// Open the real gateway over the workspace and build an engine on it.
fn engine_for(work_dir: &Path) -> MergeEngine<GitGateway> {
    let mut config = EngineConfig::default();
    config.repository.workspace = work_dir.to_path_buf();
    let gateway = GitGateway::open(&config).expect("open workspace gateway");
    MergeEngine::new(config, gateway)
}

fn mainline_tip(work_dir: &Path) -> Oid {
    let repo = Repository::open(work_dir).unwrap();
    repo.refname_to_id("refs/heads/main").unwrap()
}

fn current_branch(work_dir: &Path) -> String {
    let repo = Repository::open(work_dir).unwrap();
    let head = repo.head().unwrap();
    head.shorthand().unwrap_or("HEAD").to_string()
}

fn local_branches(work_dir: &Path) -> Vec<String> {
    let repo = Repository::open(work_dir).unwrap();
    let mut names: Vec<String> = repo
        .branches(Some(git2::BranchType::Local))
        .unwrap()
        .filter_map(|b| b.ok())
        .filter_map(|(b, _)| b.name().ok().flatten().map(str::to_string))
        .collect();
    names.sort();
    names
}

fn head_parent_count(work_dir: &Path) -> usize {
    let repo = Repository::open(work_dir).unwrap();
    let commit = repo.head().unwrap().peel_to_commit().unwrap();
    commit.parent_count()
}

fn head_message(work_dir: &Path) -> String {
    let repo = Repository::open(work_dir).unwrap();
    let commit = repo.head().unwrap().peel_to_commit().unwrap();
    commit.message().unwrap_or_default().to_string()
}

fn read_file(work_dir: &Path, rel: &str) -> String {
    std::fs::read_to_string(work_dir.join(rel)).expect("read merged file")
}

/// Parse a report artifact written during the run.
fn load_artifact(work_dir: &Path, name: &str) -> serde_json::Value {
    let raw = std::fs::read_to_string(work_dir.join(".mergeline/reports").join(name))
        .expect("read report artifact");
    serde_json::from_str(&raw).expect("artifact is valid JSON")
}

/// Assert the invariant every run must leave behind: working tree on the
/// mainline and no integration branches remaining.
fn assert_back_on_mainline(work_dir: &Path) {
    assert_eq!(current_branch(work_dir), "main");
    assert_eq!(local_branches(work_dir), vec!["main"]);
    let repo = Repository::open(work_dir).unwrap();
    assert_eq!(repo.state(), git2::RepositoryState::Clean);
    assert!(!repo.index().unwrap().has_conflicts());
}

// ===========================================================================
// Test 1: clean merge of non-overlapping work
// ===========================================================================

/// A contributor branch touches a file mainline never changed; the merge
/// lands as a two-parent commit and the mainline fast-forwards onto it.
#[test]
fn test_clean_merge_lands_on_mainline() {
    let tmp = TempDir::new().unwrap();
    let (work_dir, origin_dir) = setup_workspace(
        tmp.path(),
        &[
            ("config.json", b"{\n  \"timeout\": 30\n}\n"),
            ("README.md", b"# Project\n"),
        ],
    );
    let base = mainline_tip(&work_dir);
    seed_origin_branch(
        &origin_dir,
        "agent/pricing",
        base,
        &[("pricing.json", b"{\n  \"discount\": 10\n}\n")],
        "add pricing rules",
    );

    let engine = engine_for(&work_dir);
    let summary = engine.run().expect("run failed");

    assert_eq!(summary.branches, vec!["agent/pricing"]);
    assert_eq!(summary.records.len(), 1);
    assert_eq!(summary.records[0].status, ReportStatus::Success);
    assert!(
        summary.records[0].details.starts_with("merged as "),
        "unexpected details: {}",
        summary.records[0].details
    );
    assert_eq!(summary.merged_count(), 1);
    assert_eq!(summary.conflict_count(), 0);
    assert!(!summary.interrupted);

    // Mainline advanced to a merge commit joining both histories.
    assert_ne!(mainline_tip(&work_dir), base);
    assert_eq!(head_parent_count(&work_dir), 2);
    let msg = head_message(&work_dir);
    assert!(
        msg.contains("merge agent/pricing into main"),
        "unexpected commit message: {}",
        msg
    );

    // Committer identity comes from the configuration, not ambient git config.
    let repo = Repository::open(&work_dir).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.author().name(), Some("mergeline"));

    // Contributor file landed; untouched files survive.
    assert_eq!(read_file(&work_dir, "pricing.json"), "{\n  \"discount\": 10\n}\n");
    assert_eq!(read_file(&work_dir, "README.md"), "# Project\n");

    assert_back_on_mainline(&work_dir);
    let state = summary.final_state.expect("final snapshot");
    assert_eq!(state.current_branch, "main");
    assert!(state.integration_branches.is_empty());
}

// ===========================================================================
// Test 2: reruns are idempotent
// ===========================================================================

/// Rerunning after a branch has landed reports `no_changes` and leaves the
/// mainline tip exactly where the first run put it.
#[test]
fn test_second_run_reports_no_changes() {
    let tmp = TempDir::new().unwrap();
    let (work_dir, origin_dir) =
        setup_workspace(tmp.path(), &[("README.md", b"# Project\n")]);
    let base = mainline_tip(&work_dir);
    seed_origin_branch(
        &origin_dir,
        "agent/docs",
        base,
        &[("GUIDE.md", b"# Guide\n")],
        "add guide",
    );

    let first = engine_for(&work_dir).run().expect("first run failed");
    assert_eq!(first.records[0].status, ReportStatus::Success);
    let landed_tip = mainline_tip(&work_dir);

    let second = engine_for(&work_dir).run().expect("second run failed");
    assert_eq!(second.records.len(), 1);
    assert_eq!(second.records[0].status, ReportStatus::NoChanges);
    assert_eq!(second.records[0].details, "no changes relative to mainline");
    assert_eq!(second.merged_count(), 0);

    // The tip did not move and no extra commit was created.
    assert_eq!(mainline_tip(&work_dir), landed_tip);
    assert_eq!(head_parent_count(&work_dir), 2);
    assert_back_on_mainline(&work_dir);
}

// ===========================================================================
// Test 3: structured conflict resolved with contributor precedence
// ===========================================================================

/// Mainline and a contributor both rewrite the same JSON document. The
/// conflict is resolved by key union with the contributor's value winning
/// the collision, and the merge still lands.
#[test]
fn test_structured_conflict_auto_resolves() {
    let tmp = TempDir::new().unwrap();
    let (work_dir, origin_dir) =
        setup_workspace(tmp.path(), &[("config.json", b"{\n  \"timeout\": 30\n}\n")]);
    let base = mainline_tip(&work_dir);
    seed_origin_branch(
        &origin_dir,
        "agent/tuning",
        base,
        &[("config.json", b"{\n  \"timeout\": 60,\n  \"limit\": 9\n}\n")],
        "raise timeout, add limit",
    );
    // Mainline moved on after the branch forked.
    let repo = Repository::open(&work_dir).unwrap();
    commit_files(
        &repo,
        &[("config.json", b"{\n  \"timeout\": 45\n}\n")],
        "bump timeout on mainline",
    );
    let premerged = mainline_tip(&work_dir);

    let engine = engine_for(&work_dir);
    let summary = engine.run().expect("run failed");

    assert_eq!(summary.records.len(), 1);
    assert_eq!(summary.records[0].status, ReportStatus::Success);
    assert!(
        summary.records[0]
            .details
            .contains("after resolving 1 conflict"),
        "unexpected details: {}",
        summary.records[0].details
    );

    // Union of keys, contributor value on the collision.
    let merged: serde_json::Value =
        serde_json::from_str(&read_file(&work_dir, "config.json")).expect("merged JSON parses");
    assert_eq!(merged["timeout"], 60);
    assert_eq!(merged["limit"], 9);

    assert_ne!(mainline_tip(&work_dir), premerged);
    assert_eq!(head_parent_count(&work_dir), 2);
    let msg = head_message(&work_dir);
    assert!(
        msg.contains("[resolved 1 conflict(s)]"),
        "unexpected commit message: {}",
        msg
    );

    // The artifact records what was resolved and how.
    let artifact = summary.records[0].artifact.clone().expect("artifact name");
    let report = load_artifact(&work_dir, &artifact);
    assert_eq!(report["status"], "success");
    assert_eq!(report["conflicts"][0]["path"], "config.json");
    assert_eq!(report["conflicts"][0]["category"], "structured_data");
    assert_eq!(report["conflicts"][0]["resolution"], "auto_merged");

    assert_back_on_mainline(&work_dir);
}

// ===========================================================================
// Test 4: prose conflict keeps both versions
// ===========================================================================

/// Conflicting prose is never silently dropped: both full versions are
/// retained under labeled section headers.
#[test]
fn test_prose_conflict_retains_both_passages() {
    let tmp = TempDir::new().unwrap();
    let (work_dir, origin_dir) = setup_workspace(
        tmp.path(),
        &[("NOTES.md", b"# Notes\n\nshared context\n")],
    );
    let base = mainline_tip(&work_dir);
    seed_origin_branch(
        &origin_dir,
        "agent/notes",
        base,
        &[("NOTES.md", b"# Notes\n\nshared context\nagent passage\n")],
        "extend notes",
    );
    let repo = Repository::open(&work_dir).unwrap();
    commit_files(
        &repo,
        &[("NOTES.md", b"# Notes\n\nshared context\nmainline passage\n")],
        "extend notes on mainline",
    );

    let summary = engine_for(&work_dir).run().expect("run failed");
    assert_eq!(summary.records[0].status, ReportStatus::Success);

    let merged = read_file(&work_dir, "NOTES.md");
    let expected = "======= retained: main =======\n\
                    # Notes\n\nshared context\nmainline passage\n\
                    ======= retained: agent/notes =======\n\
                    # Notes\n\nshared context\nagent passage\n";
    assert_eq!(merged, expected);

    let artifact = summary.records[0].artifact.clone().expect("artifact name");
    let report = load_artifact(&work_dir, &artifact);
    assert_eq!(report["conflicts"][0]["category"], "prose");
    assert_eq!(report["conflicts"][0]["resolution"], "dual_retained");

    assert_back_on_mainline(&work_dir);
}

// ===========================================================================
// Test 5: binary conflict stays unresolved
// ===========================================================================

/// A conflicted binary file has no safe automatic strategy. The merge is
/// abandoned, the mainline keeps its premerged content, and the report
/// names exactly the file a human must look at.
#[test]
fn test_binary_conflict_requires_manual_resolution() {
    let tmp = TempDir::new().unwrap();
    let (work_dir, origin_dir) =
        setup_workspace(tmp.path(), &[("data.bin", b"\x00\x01\x02\n")]);
    let base = mainline_tip(&work_dir);
    seed_origin_branch(
        &origin_dir,
        "agent/assets",
        base,
        &[("data.bin", b"\x00\xbb\x02\n")],
        "replace asset",
    );
    let repo = Repository::open(&work_dir).unwrap();
    commit_files(&repo, &[("data.bin", b"\x00\xaa\x02\n")], "replace asset on mainline");
    let premerged = mainline_tip(&work_dir);

    let summary = engine_for(&work_dir).run().expect("run failed");

    assert_eq!(summary.records.len(), 1);
    assert_eq!(summary.records[0].status, ReportStatus::Conflict);
    assert_eq!(
        summary.records[0].details,
        "1 of 1 conflicted file(s) require manual resolution"
    );
    assert_eq!(summary.conflict_count(), 1);

    // Nothing landed: tip unchanged, working tree back to mainline content.
    assert_eq!(mainline_tip(&work_dir), premerged);
    let on_disk = std::fs::read(work_dir.join("data.bin")).unwrap();
    assert_eq!(on_disk, b"\x00\xaa\x02\n");

    let artifact = summary.records[0].artifact.clone().expect("artifact name");
    let report = load_artifact(&work_dir, &artifact);
    assert_eq!(report["status"], "conflict");
    assert_eq!(report["conflicts"].as_array().unwrap().len(), 1);
    assert_eq!(report["conflicts"][0]["path"], "data.bin");
    assert_eq!(report["conflicts"][0]["category"], "unknown");
    assert_eq!(report["conflicts"][0]["resolution"], "requires_manual");

    assert_back_on_mainline(&work_dir);

    // No tracked modifications linger after the abort.
    let repo = Repository::open(&work_dir).unwrap();
    let mut opts = git2::StatusOptions::new();
    opts.include_untracked(false);
    let statuses = repo.statuses(Some(&mut opts)).unwrap();
    assert!(statuses.is_empty(), "working tree should be clean");
}

// ===========================================================================
// Test 6: mixed run writes one report per branch plus a summary
// ===========================================================================

/// Three contributor branches with different fates in one run. Every branch
/// gets a report in discovery order, a conflict late in the run does not
/// disturb earlier artifacts, and branches outside the prefix are ignored.
#[test]
fn test_mixed_run_reports_every_branch() {
    let tmp = TempDir::new().unwrap();
    let (work_dir, origin_dir) = setup_workspace(
        tmp.path(),
        &[("README.md", b"# Project\n"), ("data.bin", b"\x00\x01\n")],
    );
    let base = mainline_tip(&work_dir);
    seed_origin_branch(
        &origin_dir,
        "agent/docs",
        base,
        &[("GUIDE.md", b"# Guide\n")],
        "add guide",
    );
    // Sits at the mainline base, so it is already contained.
    let origin = Repository::open(&origin_dir).unwrap();
    origin
        .reference("refs/heads/agent/same", base, true, "seed branch")
        .unwrap();
    seed_origin_branch(
        &origin_dir,
        "agent/zz-assets",
        base,
        &[("data.bin", b"\x00\xbb\n")],
        "replace asset",
    );
    // Outside the candidate prefix; must be ignored.
    seed_origin_branch(
        &origin_dir,
        "feature/unrelated",
        base,
        &[("other.txt", b"other\n")],
        "unrelated work",
    );
    let repo = Repository::open(&work_dir).unwrap();
    commit_files(&repo, &[("data.bin", b"\x00\xaa\n")], "replace asset on mainline");

    let summary = engine_for(&work_dir).run().expect("run failed");

    // Discovery order is name order; the unprefixed branch never appears.
    assert_eq!(
        summary.branches,
        vec!["agent/docs", "agent/same", "agent/zz-assets"]
    );
    let statuses: Vec<ReportStatus> = summary.records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ReportStatus::Success,
            ReportStatus::NoChanges,
            ReportStatus::Conflict
        ]
    );
    assert_eq!(summary.merged_count(), 1);
    assert_eq!(summary.conflict_count(), 1);
    assert!(!summary.interrupted);

    // One artifact per branch on disk, plus the run summary. The aborted
    // merge at the end of the run must not have eaten earlier artifacts.
    let reports_dir = work_dir.join(".mergeline/reports");
    let mut names: Vec<String> = std::fs::read_dir(&reports_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names.iter().filter(|n| n.starts_with("report-")).count(),
        3,
        "artifacts on disk: {:?}",
        names
    );
    assert_eq!(names.iter().filter(|n| n.starts_with("summary-")).count(), 1);
    for record in &summary.records {
        let artifact = record.artifact.clone().expect("artifact name");
        assert!(names.contains(&artifact), "missing artifact {}", artifact);
    }

    // The summary artifact round-trips and captures the final state.
    let summary_name = names
        .iter()
        .find(|n| n.starts_with("summary-"))
        .unwrap()
        .clone();
    let raw = std::fs::read_to_string(reports_dir.join(&summary_name)).unwrap();
    let stored: RunSummary = serde_json::from_str(&raw).expect("summary parses");
    assert_eq!(stored.records.len(), 3);
    assert_eq!(stored.recent_artifacts.len(), 3);
    let state = stored.final_state.expect("final snapshot");
    assert_eq!(state.current_branch, "main");
    assert!(state.integration_branches.is_empty());

    // The clean branch landed despite the conflicted one.
    assert_eq!(read_file(&work_dir, "GUIDE.md"), "# Guide\n");
    assert_eq!(std::fs::read(work_dir.join("data.bin")).unwrap(), b"\x00\xaa\n");

    assert_back_on_mainline(&work_dir);
}
