//! Task → working directory records.
//!
//! Each task that creates a tracker leaves `tasks/<task-id>.json` under the
//! storage root so its checkpoints can be found and discarded later without
//! knowing the working directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CheckpointError, CheckpointResult};

const TASKS_DIR: &str = "tasks";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: String,
    pub working_directory: PathBuf,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

/// Reject ids that would escape the tasks directory.
pub fn validate_task_id(task_id: &str) -> CheckpointResult<()> {
    let invalid = task_id.is_empty()
        || task_id == "."
        || task_id == ".."
        || task_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(CheckpointError::InvalidTaskId(task_id.to_string()));
    }
    Ok(())
}

fn record_path(storage_root: &Path, task_id: &str) -> PathBuf {
    storage_root.join(TASKS_DIR).join(format!("{task_id}.json"))
}

/// Save a task record (write-then-rename).
pub fn save_task(storage_root: &Path, record: &TaskRecord) -> CheckpointResult<()> {
    validate_task_id(&record.task_id)?;
    let dir = storage_root.join(TASKS_DIR);
    fs::create_dir_all(&dir)?;

    let file_path = record_path(storage_root, &record.task_id);
    let temp_path = dir.join(format!("{}.json.tmp", record.task_id));

    let json = serde_json::to_string_pretty(record)?;
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, &file_path)?;

    Ok(())
}

/// Load a task record, or `None` if the task never created a tracker.
pub fn load_task(storage_root: &Path, task_id: &str) -> CheckpointResult<Option<TaskRecord>> {
    validate_task_id(task_id)?;
    let file_path = record_path(storage_root, task_id);

    if !file_path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&file_path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Remove a task record. Missing records are ignored.
pub fn remove_task(storage_root: &Path, task_id: &str) -> CheckpointResult<()> {
    validate_task_id(task_id)?;
    match fs::remove_file(record_path(storage_root, task_id)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// All readable task records. Unparseable files are skipped with a warning.
pub fn list_tasks(storage_root: &Path) -> CheckpointResult<Vec<TaskRecord>> {
    let dir = storage_root.join(TASKS_DIR);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let parsed = fs::read_to_string(&path)
            .map_err(CheckpointError::from)
            .and_then(|s| serde_json::from_str::<TaskRecord>(&s).map_err(CheckpointError::from));
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping task record {}: {e}", path.display()),
        }
    }

    records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(records)
}
