//! CheckpointTracker - the public entry point of the engine.
//!
//! A tracker binds one task to the shadow repository of its working
//! directory. Typical flow:
//!
//! ```ignore
//! let config = EngineConfig::builder().working_dir(&cwd).build()?;
//! let Some(tracker) = CheckpointTracker::create("task-42", &config).await? else {
//!     // Checkpoints disabled: carry on without undo/diff.
//!     return Ok(());
//! };
//!
//! tracker.stage_workspace_changes().await;
//! let before = tracker.commit().await;
//! // ... files get generated ...
//! tracker.stage_workspace_changes().await;
//! let after = tracker.commit().await;
//!
//! let changes = tracker.get_diff_set(before.as_deref(), after.as_deref()).await?;
//! tracker.reset_head(&before.unwrap()).await?;
//! ```
//!
//! Every method reports its own failure and leaves the tracker usable.

use chrono::Utc;
use serde::Serialize;
use std::path::Path;

use crate::config::EngineConfig;
use crate::error::{CheckpointError, CheckpointResult};
use crate::git::{git_version, ChangedFile, DiffEntry};
use crate::mutation::{MutationOutcome, WorkspaceMutation};
use crate::shadow::{ShadowRepository, SnapshotInfo, StageResult};
use crate::tasks::{self, TaskRecord};
use crate::workspace::WorkspaceBinding;

/// Snapshots taken around one mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointPair {
    pub before: String,
    pub after: String,
    pub outcome: MutationOutcome,
}

#[derive(Debug)]
pub struct CheckpointTracker {
    task_id: String,
    binding: WorkspaceBinding,
    repo: ShadowRepository,
}

impl CheckpointTracker {
    /// Create a tracker for `task_id`.
    ///
    /// Returns `Ok(None)` when checkpoints are disabled; nothing is written
    /// in that case. Fails with `GitUnavailable` if git cannot be run, and
    /// surfaces binding and shadow-repository errors unchanged.
    pub async fn create(task_id: &str, config: &EngineConfig) -> CheckpointResult<Option<Self>> {
        if !config.enabled() {
            log::info!("Checkpoints disabled, no tracker for task {task_id}");
            return Ok(None);
        }
        tasks::validate_task_id(task_id)?;

        let version = git_version()
            .await
            .map_err(|e| CheckpointError::GitUnavailable(e.to_string()))?;
        log::debug!("Using {version}");

        let binding = WorkspaceBinding::resolve(config.working_dir())?;
        let repo = ShadowRepository::open(
            config.storage_root(),
            &binding,
            config.extra_exclusions(),
        )
        .await?;

        let record = TaskRecord {
            task_id: task_id.to_string(),
            working_directory: binding.absolute_path().to_path_buf(),
            identifier: binding.identifier().to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = tasks::save_task(config.storage_root(), &record) {
            log::warn!("Failed to record task {task_id}: {e}");
        }

        log::info!(
            "Checkpoint tracker ready for task {task_id} in {}",
            binding.absolute_path().display()
        );
        Ok(Some(Self {
            task_id: task_id.to_string(),
            binding,
            repo,
        }))
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn working_dir(&self) -> &Path {
        self.binding.absolute_path()
    }

    pub fn identifier(&self) -> &str {
        self.binding.identifier()
    }

    /// Location of the shadow repository's storage.
    pub fn shadow_storage_path(&self) -> &Path {
        self.repo.storage_path()
    }

    fn commit_message(&self) -> String {
        format!("checkpoint-{}-{}", self.binding.identifier(), self.task_id)
    }

    fn report<T>(&self, operation: &str, result: CheckpointResult<T>) -> CheckpointResult<T> {
        if let Err(e) = &result {
            log::error!("Checkpoint {operation} failed for task {}: {e}", self.task_id);
        }
        result
    }

    pub async fn stage_workspace_changes(&self) -> StageResult {
        self.repo.stage_all().await
    }

    pub async fn stage_specific_paths(&self, relative_paths: &[String]) -> StageResult {
        self.repo.stage_specific(relative_paths).await
    }

    /// Commit staged changes. `None` if the commit failed (already logged).
    pub async fn commit(&self) -> Option<String> {
        self.try_commit().await.ok()
    }

    async fn try_commit(&self) -> CheckpointResult<String> {
        let result = self.repo.commit(&self.commit_message()).await;
        self.report("commit", result)
    }

    pub async fn status(&self) -> CheckpointResult<Vec<ChangedFile>> {
        let result = self.repo.status().await;
        self.report("status", result)
    }

    pub async fn reset_head(&self, hash: &str) -> CheckpointResult<()> {
        let result = self.repo.reset(hash).await;
        self.report("reset", result)
    }

    pub async fn get_diff_set(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> CheckpointResult<Vec<DiffEntry>> {
        let result = self.repo.diff(from, to).await;
        self.report("diff", result)
    }

    pub async fn get_diff_count(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> CheckpointResult<usize> {
        let result = self.repo.diff_count(from, to).await;
        self.report("diff count", result)
    }

    /// Content of `relative_path` at `hash`; `None` if it didn't exist there.
    pub async fn get_file_content_at_commit(
        &self,
        hash: &str,
        relative_path: &str,
    ) -> CheckpointResult<Option<String>> {
        let result = self.repo.get_content_at(hash, relative_path).await;
        self.report("content lookup", result)
    }

    pub async fn history(&self, limit: usize) -> CheckpointResult<Vec<SnapshotInfo>> {
        let result = self.repo.history(limit).await;
        self.report("history", result)
    }

    /// Snapshot, apply `mutation`, snapshot again.
    ///
    /// A failed mutation still gets its "after" snapshot, so whatever it
    /// managed to write can be diffed and reverted.
    pub async fn run_checkpointed<M: WorkspaceMutation>(
        &self,
        mutation: &M,
    ) -> CheckpointResult<CheckpointPair> {
        if !self.stage_workspace_changes().await.success {
            log::warn!("Pre-mutation staging was incomplete");
        }
        let before = self.try_commit().await?;

        let outcome = match mutation.apply(self.working_dir()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Mutation failed for task {}: {e}", self.task_id);
                MutationOutcome::failed(e.to_string())
            }
        };

        if !self.stage_workspace_changes().await.success {
            log::warn!("Post-mutation staging was incomplete");
        }
        let after = self.try_commit().await?;

        Ok(CheckpointPair {
            before,
            after,
            outcome,
        })
    }
}

/// Discard the checkpoints recorded for `task_id`.
///
/// The shadow repository itself is removed only once no other task still
/// points at the same working directory. Unknown tasks are a no-op.
pub async fn delete_checkpoints(task_id: &str, config: &EngineConfig) -> CheckpointResult<()> {
    let root = config.storage_root();
    let Some(record) = tasks::load_task(root, task_id)? else {
        log::debug!("No checkpoints recorded for task {task_id}");
        return Ok(());
    };
    tasks::remove_task(root, task_id)?;

    let shared = tasks::list_tasks(root)?
        .iter()
        .any(|t| t.identifier == record.identifier);
    if shared {
        log::info!(
            "Keeping shadow repository {}: still used by other tasks",
            record.identifier
        );
        return Ok(());
    }

    ShadowRepository::delete_all(root, &record.identifier).await
}
