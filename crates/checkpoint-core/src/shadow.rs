//! The shadow repository: a hidden git repository bound 1:1 to a working directory.
//!
//! # Overview
//!
//! Storage lives at `<storage root>/checkpoints/<identifier>/.git`, outside
//! the working directory, and the working directory is recorded as the
//! repository's `core.worktree`. Every snapshot is an ordinary commit; callers
//! only ever hold commit hashes.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──open──▶ Verifying ──binding matches──▶ Ready
//!       │                     │
//!       │                     └──binding differs──▶ WorktreeMismatch (no mutation)
//!       └──no storage──▶ init + initial commit ──▶ Ready
//! ```
//!
//! Only `Ready` repositories accept operations.
//!
//! # Concurrency
//!
//! One writer per working directory is assumed. Nothing here locks across
//! processes; two tasks driving the same shadow repository at once is
//! unsupported.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{CheckpointError, CheckpointResult};
use crate::exclusions::refresh_exclusions;
use crate::git::{
    is_git_repo, parse_name_status_z, run_git, ChangedFile, DiffEntry, FileStatus, ShadowGit,
};
use crate::nested::NestedRepoGuard;
use crate::workspace::WorkspaceBinding;

/// Directory under the storage root holding one shadow repository per identifier.
pub const CHECKPOINTS_DIR: &str = "checkpoints";

const AUTHOR_NAME: &str = "Checkpoint";
const AUTHOR_EMAIL: &str = "checkpoint@noreply.local";
const INITIAL_MESSAGE: &str = "initial commit";

static HASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{4,64}$").unwrap());

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowState {
    Uninitialized,
    Verifying,
    Ready,
}

/// Outcome of a staging pass. `success: false` is a warning, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageResult {
    pub success: bool,
}

/// One entry of the snapshot history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub hash: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ShadowRepository {
    storage_root: PathBuf,
    storage_path: PathBuf,
    working_dir: PathBuf,
    identifier: String,
    git: ShadowGit,
    state: ShadowState,
    extra_exclusions: Vec<String>,
}

// ============================================================================
// OPENING
// ============================================================================

impl ShadowRepository {
    /// Storage directory for `identifier` under `storage_root`.
    pub fn storage_path_for(storage_root: &Path, identifier: &str) -> PathBuf {
        storage_root.join(CHECKPOINTS_DIR).join(identifier)
    }

    /// Open the shadow repository for `binding`, creating it on first use.
    ///
    /// An existing repository must be bound to exactly this working
    /// directory, or opening fails with `WorktreeMismatch` before anything
    /// is written. Exclusions are regenerated on every open.
    ///
    /// The storage root may live inside the working directory; it is then
    /// excluded from snapshots and never touched by staging or reset.
    pub async fn open(
        storage_root: &Path,
        binding: &WorkspaceBinding,
        extra_exclusions: &[String],
    ) -> CheckpointResult<Self> {
        let storage_root = canonical_storage_root(storage_root)?;
        let storage_path = Self::storage_path_for(&storage_root, binding.identifier());
        let working_dir = binding.absolute_path().to_path_buf();

        let mut extra_exclusions = extra_exclusions.to_vec();
        if let Some(pattern) = storage_exclusion(&storage_root, &working_dir) {
            log::debug!("Storage root lies inside the working directory, excluding {pattern}");
            extra_exclusions.push(pattern);
        }

        let mut repo = Self {
            git: ShadowGit::new(storage_path.join(".git"), &working_dir),
            storage_root,
            storage_path,
            working_dir,
            identifier: binding.identifier().to_string(),
            state: ShadowState::Uninitialized,
            extra_exclusions,
        };

        if is_git_repo(&repo.storage_path) {
            repo.state = ShadowState::Verifying;
            repo.verify_binding().await?;
            refresh_exclusions(repo.git.git_dir(), &repo.working_dir, &repo.extra_exclusions);
        } else if let Err(e) = repo.initialize().await {
            if let Err(cleanup) = std::fs::remove_dir_all(&repo.storage_path) {
                log::warn!(
                    "Failed to clean up partial shadow repository {}: {cleanup}",
                    repo.storage_path.display()
                );
            }
            return Err(e);
        }

        repo.state = ShadowState::Ready;
        log::info!(
            "Shadow repository ready for {} at {}",
            repo.working_dir.display(),
            repo.storage_path.display()
        );
        Ok(repo)
    }

    async fn verify_binding(&self) -> CheckpointResult<()> {
        let output = self
            .git
            .run(&["config", "--local", "--get", "core.worktree"])
            .await
            .map_err(|e| CheckpointError::InitFailed(e.to_string()))?;
        let recorded = output.stdout_str().trim().to_string();
        let requested = self.working_dir.to_string_lossy().to_string();

        if recorded != requested {
            log::error!(
                "Shadow repository bound to {recorded:?}, refusing to use it for {requested:?}"
            );
            return Err(CheckpointError::WorktreeMismatch {
                recorded,
                requested,
            });
        }
        Ok(())
    }

    async fn initialize(&mut self) -> CheckpointResult<()> {
        let init_failed = |e: &dyn std::fmt::Display| CheckpointError::InitFailed(e.to_string());

        std::fs::create_dir_all(&self.storage_path).map_err(|e| init_failed(&e))?;
        run_git(&["init", "--quiet"], &self.storage_path)
            .await
            .and_then(|o| o.into_result())
            .map_err(|e| init_failed(&e))?;

        let worktree = self.working_dir.to_string_lossy().to_string();
        for (key, value) in [
            ("core.worktree", worktree.as_str()),
            ("commit.gpgSign", "false"),
            ("tag.gpgSign", "false"),
            ("user.name", AUTHOR_NAME),
            ("user.email", AUTHOR_EMAIL),
        ] {
            self.git
                .run_success(&["config", "--local", key, value])
                .await
                .map_err(|e| init_failed(&e))?;
        }

        refresh_exclusions(self.git.git_dir(), &self.working_dir, &self.extra_exclusions);

        // Readiness is needed for the initial staging pass.
        self.state = ShadowState::Ready;
        if !self.stage_all().await.success {
            log::warn!("Initial staging of {} was incomplete", self.working_dir.display());
        }
        self.git
            .run_success(&[
                "commit",
                "--allow-empty",
                "--no-verify",
                "--quiet",
                "-m",
                INITIAL_MESSAGE,
            ])
            .await
            .map_err(|e| init_failed(&e))?;

        log::info!(
            "Created shadow repository {} for {}",
            self.identifier,
            self.working_dir.display()
        );
        Ok(())
    }

    pub fn state(&self) -> ShadowState {
        self.state
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    fn ensure_ready(&self) -> CheckpointResult<()> {
        if self.state == ShadowState::Ready {
            Ok(())
        } else {
            Err(CheckpointError::InitFailed(format!(
                "shadow repository is {:?}, not ready",
                self.state
            )))
        }
    }

    fn suppress_nested(&self) -> NestedRepoGuard {
        NestedRepoGuard::acquire(&self.working_dir, &[self.storage_root.clone()])
    }
}

// ============================================================================
// STAGING AND COMMITTING
// ============================================================================

impl ShadowRepository {
    /// Stage the whole working tree under the current exclusions.
    ///
    /// Unreadable files are skipped (`--ignore-errors`); any failure is
    /// reported as `success: false` rather than an error.
    pub async fn stage_all(&self) -> StageResult {
        if self.ensure_ready().is_err() {
            return StageResult { success: false };
        }
        let _guard = self.suppress_nested();
        self.add(&["add", "-A", "--ignore-errors", "--", "."]).await
    }

    /// Stage only `relative_paths`. Empty input is a no-op success.
    ///
    /// Nested repositories are not suppressed here; this is the narrow path.
    pub async fn stage_specific(&self, relative_paths: &[String]) -> StageResult {
        if relative_paths.is_empty() {
            return StageResult { success: true };
        }
        if self.ensure_ready().is_err() {
            return StageResult { success: false };
        }
        let mut args = vec!["add", "-A", "--ignore-errors", "--"];
        args.extend(relative_paths.iter().map(String::as_str));
        self.add(&args).await
    }

    async fn add(&self, args: &[&str]) -> StageResult {
        match self.git.run(args).await {
            Ok(output) if output.success => StageResult { success: true },
            Ok(output) => {
                log::warn!("Staging reported errors: {}", output.stderr_str().trim());
                StageResult { success: false }
            }
            Err(e) => {
                log::warn!("Staging failed: {e}");
                StageResult { success: false }
            }
        }
    }

    /// Commit whatever is staged.
    ///
    /// When nothing is staged the current head is returned instead, so two
    /// commits with no change in between yield the same hash.
    pub async fn commit(&self, message: &str) -> CheckpointResult<String> {
        self.ensure_ready()?;
        let commit_failed =
            |e: &dyn std::fmt::Display| CheckpointError::CommitFailed(e.to_string());

        let staged = self
            .git
            .run(&["diff", "--cached", "--quiet"])
            .await
            .map_err(|e| commit_failed(&e))?;
        match staged.code {
            Some(0) => {
                log::debug!("Nothing to commit in {}", self.identifier);
                return self.head().await.map_err(|e| commit_failed(&e));
            }
            Some(1) => {}
            _ => return Err(commit_failed(&staged.stderr_str().trim())),
        }

        self.git
            .run_success(&["commit", "--allow-empty", "--no-verify", "--quiet", "-m", message])
            .await
            .map_err(|e| commit_failed(&e))?;

        let hash = self.head().await.map_err(|e| commit_failed(&e))?;
        log::info!("Created checkpoint {hash} ({message})");
        Ok(hash)
    }

    /// Hash of the latest snapshot.
    pub async fn head(&self) -> CheckpointResult<String> {
        Ok(self.git.run_success(&["rev-parse", "HEAD"]).await?)
    }

    /// Hash of the oldest snapshot.
    pub async fn root(&self) -> CheckpointResult<String> {
        let out = self
            .git
            .run_success(&["rev-list", "--max-parents=0", "HEAD"])
            .await?;
        out.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string)
            .ok_or_else(|| {
                CheckpointError::InvalidHash("repository has no root commit".to_string())
            })
    }

    /// Snapshot history, newest first.
    pub async fn history(&self, limit: usize) -> CheckpointResult<Vec<SnapshotInfo>> {
        self.ensure_ready()?;
        let limit = limit.to_string();
        let out = self
            .git
            .run_success(&["log", "--format=%H%x1f%s%x1f%cI", "-n", &limit])
            .await?;
        Ok(parse_history(&out))
    }
}

// ============================================================================
// RESET
// ============================================================================

impl ShadowRepository {
    /// Restore the working directory to `hash`.
    ///
    /// Untracked files are cleaned and the index hard-reset while nested
    /// repositories are suppressed; a forced checkout of all paths then
    /// follows, except for the root snapshot where the clean already leaves
    /// the tree correct. Excluded files are never touched.
    pub async fn reset(&self, hash: &str) -> CheckpointResult<()> {
        self.ensure_ready()?;
        let target = self.resolve_commit(hash).await?;
        let root = self.root().await?;
        let reset_failed = |e: &dyn std::fmt::Display| CheckpointError::ResetFailed(e.to_string());

        let _guard = self.suppress_nested();

        self.git
            .run_success(&["clean", "-d", "-f", "-q"])
            .await
            .map_err(|e| reset_failed(&e))?;
        self.git
            .run_success(&["reset", "--hard", "-q", &target])
            .await
            .map_err(|e| reset_failed(&e))?;

        if target != root {
            match self
                .git
                .run_success(&["checkout", "-f", &target, "--", "."])
                .await
            {
                Ok(_) => {}
                Err(e) if e.stderr_contains("did not match any file") => {
                    log::debug!("Checkout of {target} matched no paths, tree already empty");
                }
                Err(e) => return Err(reset_failed(&e)),
            }
        }

        log::info!("Restored {} to {target}", self.working_dir.display());
        Ok(())
    }

    /// Validate `hash` and expand it to the full commit id.
    async fn resolve_commit(&self, hash: &str) -> CheckpointResult<String> {
        if !HASH_RE.is_match(hash) {
            return Err(CheckpointError::InvalidHash(hash.to_string()));
        }
        let rev = format!("{hash}^{{commit}}");
        self.git
            .run_success(&["rev-parse", "--verify", "--quiet", &rev])
            .await
            .map_err(|_| CheckpointError::InvalidHash(hash.to_string()))
    }
}

// ============================================================================
// DIFF AND CONTENT
// ============================================================================

impl ShadowRepository {
    /// Changed files between two snapshots, with content on both sides.
    ///
    /// - `to` omitted: compare against the live working directory
    /// - `from` omitted: compare from the root snapshot
    ///
    /// Unreadable blobs and files produce empty content instead of failing.
    pub async fn diff(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> CheckpointResult<Vec<DiffEntry>> {
        self.ensure_ready()?;
        let (base, to) = self.resolve_range(from, to).await?;
        let files = self.list_changes(&base, to.as_deref()).await?;

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let absolute_path = self.working_dir.join(&file.path);

            let before = match file.status {
                FileStatus::Added | FileStatus::Renamed => String::new(),
                _ => self.blob(&base, &file.path).await.unwrap_or_default(),
            };
            let after = match (file.status, to.as_deref()) {
                (FileStatus::Deleted, _) => String::new(),
                (_, Some(to)) => self.blob(to, &file.path).await.unwrap_or_default(),
                (_, None) => read_lossy(&absolute_path).await,
            };

            entries.push(DiffEntry {
                relative_path: file.path,
                absolute_path,
                status: file.status,
                before,
                after,
            });
        }
        Ok(entries)
    }

    /// Number of changed files between two snapshots.
    pub async fn diff_count(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> CheckpointResult<usize> {
        self.ensure_ready()?;
        let (base, to) = self.resolve_range(from, to).await?;
        Ok(self.list_changes(&base, to.as_deref()).await?.len())
    }

    /// Changes in the live working directory since the latest snapshot.
    pub async fn status(&self) -> CheckpointResult<Vec<ChangedFile>> {
        self.ensure_ready()?;
        let head = self.head().await?;
        self.list_changes(&head, None).await
    }

    /// Content of `relative_path` at `hash`.
    ///
    /// `Ok(None)` means the path did not exist in that snapshot;
    /// `Ok(Some(""))` means it existed and was empty.
    pub async fn get_content_at(
        &self,
        hash: &str,
        relative_path: &str,
    ) -> CheckpointResult<Option<String>> {
        self.ensure_ready()?;
        let commit = self.resolve_commit(hash).await?;
        Ok(self.blob(&commit, &normalize_relative(relative_path)).await)
    }

    async fn resolve_range(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> CheckpointResult<(String, Option<String>)> {
        let base = match from {
            Some(hash) => self.resolve_commit(hash).await?,
            None => self.root().await?,
        };
        let to = match to {
            Some(hash) => Some(self.resolve_commit(hash).await?),
            None => None,
        };
        Ok((base, to))
    }

    /// Name-status listing from `base` to `to`, or to the live tree.
    ///
    /// For the live tree the working directory is staged so it can be
    /// compared as a tree, and the previous index is put back afterwards.
    async fn list_changes(
        &self,
        base: &str,
        to: Option<&str>,
    ) -> CheckpointResult<Vec<ChangedFile>> {
        if let Some(to) = to {
            let out = self
                .git
                .run(&["diff", "--name-status", "-z", "-M", base, to])
                .await?;
            return Ok(parse_name_status_z(&out.into_stdout()?));
        }

        let saved_index = match self.git.run_success(&["write-tree"]).await {
            Ok(tree) => Some(tree),
            Err(e) => {
                log::warn!("Could not record index before diff: {e}");
                None
            }
        };

        if !self.stage_all().await.success {
            log::warn!("Working directory diff staged with errors; some files may be missing");
        }
        let listing = self
            .git
            .run(&["diff", "--cached", "--name-status", "-z", "-M", base])
            .await;

        let restored = match &saved_index {
            Some(tree) => self.git.run_success(&["read-tree", tree]).await,
            None => self.git.run_success(&["reset", "-q"]).await,
        };
        if let Err(e) = restored {
            log::warn!("Failed to restore index after diff: {e}");
        }

        Ok(parse_name_status_z(&listing?.into_stdout()?))
    }

    async fn blob(&self, commit: &str, path: &str) -> Option<String> {
        let object = format!("{commit}:{path}");
        match self.git.run(&["cat-file", "blob", &object]).await {
            Ok(out) if out.success => Some(String::from_utf8_lossy(&out.stdout).to_string()),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to read {path} at {commit}: {e}");
                None
            }
        }
    }
}

// ============================================================================
// DELETION
// ============================================================================

impl ShadowRepository {
    /// Remove all shadow storage for `identifier`. Missing storage is a no-op.
    pub async fn delete_all(storage_root: &Path, identifier: &str) -> CheckpointResult<()> {
        let path = Self::storage_path_for(storage_root, identifier);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                log::info!("Deleted shadow repository {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Create the storage root if needed and return its canonical path.
fn canonical_storage_root(storage_root: &Path) -> CheckpointResult<PathBuf> {
    let init_failed = |e: std::io::Error| {
        CheckpointError::InitFailed(format!(
            "cannot use storage root {}: {e}",
            storage_root.display()
        ))
    };
    std::fs::create_dir_all(storage_root).map_err(init_failed)?;
    std::fs::canonicalize(storage_root).map_err(init_failed)
}

/// Anchored exclusion for a storage root nested inside the working directory.
fn storage_exclusion(storage_root: &Path, working_dir: &Path) -> Option<String> {
    let relative = storage_root.strip_prefix(working_dir).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    let relative = relative.to_string_lossy().replace('\\', "/");
    Some(format!("/{relative}/"))
}

async fn read_lossy(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        Err(e) => {
            log::debug!("Could not read {}: {e}", path.display());
            String::new()
        }
    }
}

fn normalize_relative(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.trim_start_matches("./").to_string()
}

/// Parse `git log --format=%H%x1f%s%x1f%cI` output.
fn parse_history(out: &str) -> Vec<SnapshotInfo> {
    out.lines()
        .filter_map(|line| {
            let mut parts = line.split('\x1f');
            let hash = parts.next()?.trim().to_string();
            let message = parts.next()?.to_string();
            let timestamp = DateTime::parse_from_rfc3339(parts.next()?.trim())
                .ok()?
                .with_timezone(&Utc);
            Some(SnapshotInfo {
                hash,
                message,
                timestamp,
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
