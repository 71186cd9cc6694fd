//! Local repository operations via `git2`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use git2::build::CheckoutBuilder;
use git2::{
    BranchType, FetchOptions, FetchPrune, IndexEntry, MergeOptions, ReferenceType, Repository,
    ResetType, Signature,
};
use tracing::{debug, info};

use crate::config::{EngineConfig, IdentityConfig};
use crate::conflict::{ConflictSides, ResolvedFile};
use crate::errors::GatewayError;
use crate::gateway::{BranchHandle, MergeProbe, RepositoryGateway, INTEGRATION_PREFIX};
use crate::models::{Branch, RepoSnapshot};

/// [`RepositoryGateway`] implementation over a `git2::Repository`.
pub struct GitGateway {
    repo: Repository,
    workdir: PathBuf,
    mainline: String,
    remote: String,
    identity: IdentityConfig,
}

impl GitGateway {
    /// Open the workspace repository named by the configuration.
    pub fn open(config: &EngineConfig) -> Result<Self, GatewayError> {
        let path = &config.repository.workspace;
        info!(path = %path.display(), "opening workspace repository");
        let repo = Repository::open(path)
            .map_err(|_| GatewayError::RepositoryNotFound(path.display().to_string()))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| {
                GatewayError::RepositoryNotFound(format!(
                    "{} (bare repository has no working tree)",
                    path.display()
                ))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir,
            mainline: config.repository.mainline.clone(),
            remote: config.repository.remote.clone(),
            identity: config.identity.clone(),
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn mainline_refname(&self) -> String {
        format!("refs/heads/{}", self.mainline)
    }

    /// Point HEAD at `refname` and force the working tree to match.
    fn set_head_checkout(&self, refname: &str) -> Result<(), git2::Error> {
        self.repo.set_head(refname)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        self.repo.checkout_head(Some(&mut checkout))
    }

    fn signature(&self) -> Result<Signature<'static>, GatewayError> {
        Signature::now(&self.identity.name, &self.identity.email)
            .map_err(|e| GatewayError::Commit(e.to_string()))
    }

    fn read_blob(&self, entry: Option<&IndexEntry>) -> Result<Option<Vec<u8>>, GatewayError> {
        match entry {
            Some(e) => {
                let blob = self.repo.find_blob(e.id)?;
                Ok(Some(blob.content().to_vec()))
            }
            None => Ok(None),
        }
    }
}

fn entry_path(conflict: &git2::IndexConflict) -> Option<String> {
    conflict
        .our
        .as_ref()
        .or(conflict.their.as_ref())
        .or(conflict.ancestor.as_ref())
        .map(|e| String::from_utf8_lossy(&e.path).into_owned())
}

impl RepositoryGateway for GitGateway {
    fn synchronize(&self) -> Result<(), GatewayError> {
        info!(remote = %self.remote, "fetching and pruning remote state");
        let mut remote =
            self.repo
                .find_remote(&self.remote)
                .map_err(|e| GatewayError::Synchronize {
                    remote: self.remote.clone(),
                    source: e,
                })?;
        let mut opts = FetchOptions::new();
        opts.prune(FetchPrune::On);
        remote
            .fetch(&[] as &[&str], Some(&mut opts), Some("mergeline: synchronize"))
            .map_err(|e| GatewayError::Synchronize {
                remote: self.remote.clone(),
                source: e,
            })?;
        debug!("synchronize completed");
        Ok(())
    }

    fn list_candidate_branches(&self, prefix: &str) -> Result<Vec<Branch>, GatewayError> {
        let remote_prefix = format!("{}/", self.remote);
        let branches = self
            .repo
            .branches(Some(BranchType::Remote))
            .map_err(|e| GatewayError::Discovery(e.to_string()))?;

        let mut found = Vec::new();
        for entry in branches {
            let (branch, _) = entry.map_err(|e| GatewayError::Discovery(e.to_string()))?;
            // Remote HEAD pointers are symbolic, never mergeable candidates.
            if branch.get().kind() == Some(ReferenceType::Symbolic) {
                continue;
            }
            let full = match branch.name().map_err(|e| GatewayError::Discovery(e.to_string()))? {
                Some(name) => name,
                None => continue,
            };
            let short = match full.strip_prefix(&remote_prefix) {
                Some(s) => s,
                None => continue,
            };
            if short == "HEAD" || !short.starts_with(prefix) {
                continue;
            }
            found.push(Branch::remote(&self.remote, short));
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        info!(prefix, count = found.len(), "enumerated candidate branches");
        Ok(found)
    }

    fn create_integration_branch(
        &self,
        for_branch: &Branch,
    ) -> Result<BranchHandle, GatewayError> {
        let base = self
            .repo
            .find_reference(&self.mainline_refname())
            .and_then(|r| r.peel_to_commit())
            .map_err(|e| GatewayError::Checkout {
                target: self.mainline.clone(),
                source: e,
            })?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let name = format!("{}{}-{}", INTEGRATION_PREFIX, for_branch.slug(), stamp);
        self.repo
            .branch(&name, &base, false)
            .map_err(|e| GatewayError::Checkout {
                target: name.clone(),
                source: e,
            })?;
        self.set_head_checkout(&format!("refs/heads/{}", name))
            .map_err(|e| GatewayError::Checkout {
                target: name.clone(),
                source: e,
            })?;

        info!(branch = %for_branch, integration = %name, "created integration branch");
        Ok(BranchHandle { name })
    }

    fn attempt_merge(&self, branch: &Branch) -> Result<MergeProbe, GatewayError> {
        let merge_err = |e: git2::Error| GatewayError::Merge {
            branch: branch.name.clone(),
            source: e,
        };

        let oid = self.repo.refname_to_id(&branch.refname).map_err(merge_err)?;
        let annotated = self.repo.find_annotated_commit(oid).map_err(merge_err)?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated]).map_err(merge_err)?;
        if analysis.is_up_to_date() {
            debug!(branch = %branch, "branch already contained in integration tip");
            return Ok(MergeProbe::NoOp);
        }

        // No-fast-forward policy: a fast-forwardable branch still goes
        // through a real merge so mainline history records the integration.
        let mut merge_opts = MergeOptions::new();
        let mut checkout = CheckoutBuilder::new();
        checkout.allow_conflicts(true).conflict_style_merge(true).force();
        self.repo
            .merge(&[&annotated], Some(&mut merge_opts), Some(&mut checkout))
            .map_err(merge_err)?;

        let mut index = self.repo.index().map_err(merge_err)?;
        if index.has_conflicts() {
            let mut paths = Vec::new();
            for conflict in index.conflicts().map_err(merge_err)? {
                let conflict = conflict.map_err(merge_err)?;
                if let Some(path) = entry_path(&conflict) {
                    paths.push(path);
                }
            }
            paths.sort();
            paths.dedup();
            info!(branch = %branch, conflicts = paths.len(), "merge attempt hit conflicts");
            return Ok(MergeProbe::Conflicted(paths));
        }

        // The staged tree can equal HEAD's when the branch's changes are
        // already content-identical; that is a no-change, not a merge.
        let tree_id = index.write_tree().map_err(merge_err)?;
        let head_tree = self
            .repo
            .head()
            .and_then(|h| h.peel_to_tree())
            .map_err(merge_err)?;
        if tree_id == head_tree.id() {
            debug!(branch = %branch, "merge staged an empty diff");
            self.abort_merge()?;
            return Ok(MergeProbe::NoOp);
        }

        debug!(branch = %branch, "merge staged cleanly");
        Ok(MergeProbe::Staged)
    }

    fn conflict_sides(&self) -> Result<Vec<ConflictSides>, GatewayError> {
        let index = self.repo.index()?;
        let mut sides = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let path = match entry_path(&conflict) {
                Some(p) => p,
                None => continue,
            };
            let ours = self.read_blob(conflict.our.as_ref())?;
            let theirs = self.read_blob(conflict.their.as_ref())?;
            sides.push(ConflictSides { path, ours, theirs });
        }
        sides.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(sides)
    }

    fn apply_resolutions(&self, files: &[ResolvedFile]) -> Result<(), GatewayError> {
        let mut index = self.repo.index()?;
        for file in files {
            let full = self.workdir.join(&file.path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).map_err(|e| GatewayError::Stage {
                    path: file.path.clone(),
                    detail: e.to_string(),
                })?;
            }
            std::fs::write(&full, &file.content).map_err(|e| GatewayError::Stage {
                path: file.path.clone(),
                detail: e.to_string(),
            })?;
            // add_path on a conflicted path clears its conflict entries.
            index
                .add_path(Path::new(&file.path))
                .map_err(|e| GatewayError::Stage {
                    path: file.path.clone(),
                    detail: e.to_string(),
                })?;
            debug!(path = %file.path, resolution = %file.entry.resolution, "staged resolution");
        }
        index.write()?;
        Ok(())
    }

    fn commit_staged(&self, message: &str) -> Result<String, GatewayError> {
        let sig = self.signature()?;
        let mut index = self
            .repo
            .index()
            .map_err(|e| GatewayError::Commit(e.to_string()))?;
        let tree_id = index
            .write_tree()
            .map_err(|e| GatewayError::Commit(e.to_string()))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| GatewayError::Commit(e.to_string()))?;
        let head = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| GatewayError::Commit(e.to_string()))?;

        let merge_oid = self
            .repo
            .find_reference("MERGE_HEAD")
            .ok()
            .and_then(|r| r.target())
            .ok_or_else(|| {
                GatewayError::Commit("no merge in progress (MERGE_HEAD missing)".into())
            })?;
        let merged = self
            .repo
            .find_commit(merge_oid)
            .map_err(|e| GatewayError::Commit(e.to_string()))?;

        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&head, &merged])
            .map_err(|e| GatewayError::Commit(e.to_string()))?;
        self.repo
            .cleanup_state()
            .map_err(|e| GatewayError::Commit(e.to_string()))?;

        info!(sha = %oid, "committed staged merge");
        Ok(oid.to_string())
    }

    fn abort_merge(&self) -> Result<(), GatewayError> {
        let abort_err = |e: git2::Error| GatewayError::Abort { source: e };

        let head = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(abort_err)?;
        let head_tree = head.tree().map_err(abort_err)?;

        // Files the merge staged that HEAD does not know about survive a
        // hard reset as untracked leftovers. Collect them now so only these
        // are removed; unrelated untracked files must not be touched.
        let index = self.repo.index().map_err(abort_err)?;
        let stray: Vec<String> = index
            .iter()
            .filter_map(|entry| {
                let path = String::from_utf8_lossy(&entry.path).into_owned();
                head_tree
                    .get_path(Path::new(&path))
                    .is_err()
                    .then_some(path)
            })
            .collect();

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        self.repo
            .reset(head.as_object(), ResetType::Hard, Some(&mut checkout))
            .map_err(abort_err)?;
        for path in stray {
            let _ = std::fs::remove_file(self.workdir.join(&path));
        }
        self.repo.cleanup_state().map_err(abort_err)?;
        info!("aborted in-progress merge");
        Ok(())
    }

    fn fast_forward_mainline(&self, from: &BranchHandle) -> Result<(), GatewayError> {
        let ff_err = |detail: String| GatewayError::FastForward {
            branch: self.mainline.clone(),
            detail,
        };

        let target_oid = self
            .repo
            .find_branch(&from.name, BranchType::Local)
            .and_then(|b| b.get().peel_to_commit())
            .map_err(|e| ff_err(e.to_string()))?
            .id();
        let mut mainref = self
            .repo
            .find_reference(&self.mainline_refname())
            .map_err(|e| ff_err(e.to_string()))?;
        let current = mainref
            .target()
            .ok_or_else(|| ff_err("mainline is a symbolic reference".into()))?;

        if current != target_oid
            && !self
                .repo
                .graph_descendant_of(target_oid, current)
                .map_err(|e| ff_err(e.to_string()))?
        {
            return Err(ff_err(format!(
                "{} is not a descendant of {}",
                target_oid, current
            )));
        }

        mainref
            .set_target(target_oid, "mergeline: fast-forward")
            .map_err(|e| ff_err(e.to_string()))?;
        info!(mainline = %self.mainline, tip = %target_oid, "fast-forwarded mainline");
        Ok(())
    }

    fn checkout_mainline(&self) -> Result<(), GatewayError> {
        self.set_head_checkout(&self.mainline_refname())
            .map_err(|e| GatewayError::Checkout {
                target: self.mainline.clone(),
                source: e,
            })?;
        debug!(mainline = %self.mainline, "working tree back on mainline");
        Ok(())
    }

    fn delete_branch(&self, handle: &BranchHandle) -> Result<(), GatewayError> {
        let mut branch = self
            .repo
            .find_branch(&handle.name, BranchType::Local)
            .map_err(|e| GatewayError::Cleanup {
                branch: handle.name.clone(),
                source: e,
            })?;
        branch.delete().map_err(|e| GatewayError::Cleanup {
            branch: handle.name.clone(),
            source: e,
        })?;
        debug!(branch = %handle.name, "deleted integration branch");
        Ok(())
    }

    fn status_snapshot(&self) -> Result<RepoSnapshot, GatewayError> {
        let head = self.repo.head()?;
        let current_branch = head.shorthand().unwrap_or("HEAD").to_string();
        let mainline_tip = self
            .repo
            .refname_to_id(&self.mainline_refname())
            .map(|oid| oid.to_string())
            .unwrap_or_default();

        let mut integration_branches = Vec::new();
        for entry in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                if name.starts_with(INTEGRATION_PREFIX) {
                    integration_branches.push(name.to_string());
                }
            }
        }

        Ok(RepoSnapshot {
            current_branch,
            mainline_tip,
            integration_branches,
        })
    }
}
