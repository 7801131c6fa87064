//! End-to-end checkpoint tests against a real `git` binary.
//!
//! Every test returns early when git is not installed.

use checkpoint_core::{
    delete_checkpoints, CheckpointError, CheckpointTracker, EngineConfig, FileStatus,
};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::{tempdir, TempDir};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

struct Fixture {
    storage: TempDir,
    work: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            storage: tempdir().unwrap(),
            work: tempdir().unwrap(),
        }
    }

    fn config(&self) -> EngineConfig {
        EngineConfig::builder()
            .storage_root(self.storage.path())
            .working_dir(self.work.path())
            .build()
            .unwrap()
    }

    fn write(&self, relative: &str, contents: &str) {
        let path = self.work.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn read(&self, relative: &str) -> Option<String> {
        fs::read_to_string(self.work.path().join(relative)).ok()
    }

    async fn tracker(&self, task_id: &str) -> CheckpointTracker {
        CheckpointTracker::create(task_id, &self.config())
            .await
            .unwrap()
            .expect("checkpoints enabled")
    }
}

fn shadow_git(git_dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg(format!("--git-dir={}", git_dir.display()))
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

async fn snapshot(tracker: &CheckpointTracker) -> String {
    assert!(tracker.stage_workspace_changes().await.success);
    tracker.commit().await.expect("commit succeeds")
}

#[tokio::test]
async fn snapshot_diff_and_restore() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;

    fx.write("a.txt", "1");
    let h1 = snapshot(&tracker).await;

    fx.write("a.txt", "2");
    fx.write("b.txt", "x");
    let h2 = snapshot(&tracker).await;
    assert_ne!(h1, h2);

    let diff = tracker.get_diff_set(Some(&h1), Some(&h2)).await.unwrap();
    assert_eq!(diff.len(), 2);

    assert_eq!(diff[0].relative_path, "a.txt");
    assert_eq!(diff[0].status, FileStatus::Modified);
    assert_eq!(diff[0].before, "1");
    assert_eq!(diff[0].after, "2");
    assert!(diff[0].absolute_path.ends_with("a.txt"));

    assert_eq!(diff[1].relative_path, "b.txt");
    assert_eq!(diff[1].status, FileStatus::Added);
    assert_eq!(diff[1].before, "");
    assert_eq!(diff[1].after, "x");

    assert_eq!(tracker.get_diff_count(Some(&h1), Some(&h2)).await.unwrap(), 2);

    tracker.reset_head(&h1).await.unwrap();
    assert_eq!(fx.read("a.txt").as_deref(), Some("1"));
    assert_eq!(fx.read("b.txt"), None);
}

#[tokio::test]
async fn commit_without_changes_returns_same_hash() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    fx.write("a.txt", "1");

    let first = snapshot(&tracker).await;
    let second = snapshot(&tracker).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn excluded_files_are_not_captured_or_touched() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    let base = snapshot(&tracker).await;

    fx.write("notes.md", "keep");
    fx.write("debug.log", "noise");
    let hash = snapshot(&tracker).await;

    assert_eq!(
        tracker
            .get_file_content_at_commit(&hash, "notes.md")
            .await
            .unwrap()
            .as_deref(),
        Some("keep")
    );
    assert_eq!(
        tracker
            .get_file_content_at_commit(&hash, "debug.log")
            .await
            .unwrap(),
        None
    );

    tracker.reset_head(&base).await.unwrap();
    assert_eq!(fx.read("notes.md"), None);
    assert_eq!(fx.read("debug.log").as_deref(), Some("noise"));
}

#[tokio::test]
async fn extra_exclusions_from_settings_apply() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    checkpoint_core::config::save_settings(
        fx.storage.path(),
        &checkpoint_core::CheckpointSettings {
            enabled: true,
            extra_exclusions: vec!["scratch/".to_string()],
        },
    )
    .unwrap();
    let tracker = fx.tracker("task-1").await;

    fx.write("scratch/tmp.txt", "draft");
    fx.write("kept.txt", "ok");
    let hash = snapshot(&tracker).await;

    let content = tracker
        .get_file_content_at_commit(&hash, "scratch/tmp.txt")
        .await
        .unwrap();
    assert_eq!(content, None);
}

#[tokio::test]
async fn disabled_engine_creates_nothing() {
    let fx = Fixture::new();
    let config = EngineConfig::builder()
        .storage_root(fx.storage.path().join("store"))
        .working_dir(fx.work.path())
        .enabled(false)
        .build()
        .unwrap();

    let tracker = CheckpointTracker::create("task-1", &config).await.unwrap();
    assert!(tracker.is_none());
    assert!(!fx.storage.path().join("store").exists());
}

#[tokio::test]
async fn tampered_binding_is_rejected() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    let git_dir = tracker.shadow_storage_path().join(".git");
    drop(tracker);

    shadow_git(&git_dir, &["config", "--local", "core.worktree", "/somewhere/else"]);
    let exclude = git_dir.join("info/exclude");
    fs::write(&exclude, "sentinel\n").unwrap();
    let head = shadow_git(&git_dir, &["rev-parse", "HEAD"]);
    fx.write("late.txt", "written after tampering");

    let err = CheckpointTracker::create("task-2", &fx.config())
        .await
        .unwrap_err();
    match err {
        CheckpointError::WorktreeMismatch { recorded, .. } => {
            assert_eq!(recorded, "/somewhere/else");
        }
        other => panic!("expected WorktreeMismatch, got {other:?}"),
    }

    // Nothing was rewritten, staged or committed.
    assert_eq!(fs::read_to_string(&exclude).unwrap(), "sentinel\n");
    assert_eq!(shadow_git(&git_dir, &["rev-parse", "HEAD"]), head);
    assert_eq!(
        shadow_git(&git_dir, &["config", "--local", "--get", "core.worktree"]),
        "/somewhere/else"
    );
    assert!(!fx.storage.path().join("tasks/task-2.json").exists());
}

#[tokio::test]
async fn reopening_reuses_the_same_history() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let first = fx.tracker("task-1").await;
    fx.write("a.txt", "1");
    let hash = snapshot(&first).await;
    drop(first);

    let second = fx.tracker("task-2").await;
    assert_eq!(
        second
            .get_file_content_at_commit(&hash, "a.txt")
            .await
            .unwrap()
            .as_deref(),
        Some("1")
    );
}

#[tokio::test]
async fn nested_repository_files_are_captured() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;

    let nested = fx.work.path().join("vendored");
    fs::create_dir_all(&nested).unwrap();
    let status = Command::new("git")
        .args(["init", "--quiet"])
        .current_dir(&nested)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .status()
        .unwrap();
    assert!(status.success());
    fx.write("vendored/lib.txt", "library");

    let hash = snapshot(&tracker).await;

    assert_eq!(
        tracker
            .get_file_content_at_commit(&hash, "vendored/lib.txt")
            .await
            .unwrap()
            .as_deref(),
        Some("library")
    );
    assert!(nested.join(".git").is_dir());
    assert!(!nested.join(".git_disabled").exists());
}

#[tokio::test]
async fn working_directory_diff_leaves_index_alone() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    fx.write("a.txt", "1");
    let h1 = snapshot(&tracker).await;

    fx.write("a.txt", "changed");
    fx.write("new.txt", "fresh");

    let diff = tracker.get_diff_set(Some(&h1), None).await.unwrap();
    assert_eq!(diff.len(), 2);
    assert_eq!(diff[0].relative_path, "a.txt");
    assert_eq!(diff[0].before, "1");
    assert_eq!(diff[0].after, "changed");
    assert_eq!(diff[1].relative_path, "new.txt");
    assert_eq!(diff[1].status, FileStatus::Added);
    assert_eq!(diff[1].after, "fresh");

    let status = tracker.status().await.unwrap();
    assert_eq!(status.len(), 2);

    // Nothing was left staged by the diff, so committing is a no-op.
    assert_eq!(tracker.commit().await.as_deref(), Some(h1.as_str()));
}

#[tokio::test]
async fn deleted_files_show_before_content() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    fx.write("gone.txt", "bye");
    let h1 = snapshot(&tracker).await;

    fs::remove_file(fx.work.path().join("gone.txt")).unwrap();
    let h2 = snapshot(&tracker).await;

    let diff = tracker.get_diff_set(Some(&h1), Some(&h2)).await.unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].status, FileStatus::Deleted);
    assert_eq!(diff[0].before, "bye");
    assert_eq!(diff[0].after, "");
}

#[tokio::test]
async fn content_lookup_distinguishes_absent_and_empty() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    fx.write("empty.txt", "");
    let hash = snapshot(&tracker).await;

    let empty = tracker
        .get_file_content_at_commit(&hash, "empty.txt")
        .await
        .unwrap();
    assert_eq!(empty.as_deref(), Some(""));

    let missing = tracker
        .get_file_content_at_commit(&hash, "missing.txt")
        .await
        .unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn invalid_hashes_are_rejected() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    fx.write("a.txt", "1");
    snapshot(&tracker).await;

    for bad in ["zz", "HEAD~1", "deadbeefdeadbeef"] {
        let err = tracker.reset_head(bad).await.unwrap_err();
        assert!(
            matches!(err, CheckpointError::InvalidHash(_)),
            "{bad}: {err:?}"
        );
    }
    assert_eq!(fx.read("a.txt").as_deref(), Some("1"));
}

#[tokio::test]
async fn reset_to_root_empties_tracked_files() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    let root = tracker.history(100).await.unwrap().last().unwrap().hash.clone();

    fx.write("src/main.rs", "fn main() {}");
    snapshot(&tracker).await;

    tracker.reset_head(&root).await.unwrap();
    assert_eq!(fx.read("src/main.rs"), None);
}

#[tokio::test]
async fn history_lists_newest_first() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-9").await;
    fx.write("a.txt", "1");
    let hash = snapshot(&tracker).await;

    let history = tracker.history(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].hash, hash);
    assert!(history[0].message.starts_with("checkpoint-"));
    assert!(history[0].message.ends_with("-task-9"));
    assert_eq!(history[1].message, "initial commit");
}

#[tokio::test]
async fn stage_specific_paths_only_stages_those() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    fx.write("one.txt", "1");
    fx.write("two.txt", "2");

    assert!(tracker.stage_specific_paths(&[]).await.success);
    assert!(
        tracker
            .stage_specific_paths(&["one.txt".to_string()])
            .await
            .success
    );
    let hash = tracker.commit().await.unwrap();

    let one = tracker.get_file_content_at_commit(&hash, "one.txt").await.unwrap();
    let two = tracker.get_file_content_at_commit(&hash, "two.txt").await.unwrap();
    assert_eq!(one.as_deref(), Some("1"));
    assert_eq!(two, None);
}

#[tokio::test]
async fn delete_removes_storage_and_record() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    let storage = tracker.shadow_storage_path().to_path_buf();
    drop(tracker);
    assert!(storage.exists());

    delete_checkpoints("task-1", &fx.config()).await.unwrap();
    assert!(!storage.exists());
    assert!(!fx.storage.path().join("tasks/task-1.json").exists());
    assert!(fx.work.path().is_dir());
}

#[cfg(unix)]
#[tokio::test]
async fn run_checkpointed_wraps_a_shell_command() {
    use checkpoint_core::ShellMutation;

    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    fx.write("a.txt", "1");

    let mutation = ShellMutation::new(
        "sh",
        vec!["-c".to_string(), "printf generated > gen.txt; exit 1".to_string()],
    )
    .with_shell_prefix("/bin/sh -c");

    let pair = tracker.run_checkpointed(&mutation).await.unwrap();
    assert!(!pair.outcome.success);
    assert_ne!(pair.before, pair.after);

    let diff = tracker
        .get_diff_set(Some(&pair.before), Some(&pair.after))
        .await
        .unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].relative_path, "gen.txt");
    assert_eq!(diff[0].after, "generated");

    tracker.reset_head(&pair.before).await.unwrap();
    assert_eq!(fx.read("gen.txt"), None);
    assert_eq!(fx.read("a.txt").as_deref(), Some("1"));
}

#[tokio::test]
async fn diff_without_base_starts_at_first_snapshot() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    fx.write("a.txt", "0");
    let tracker = fx.tracker("task-1").await;

    fx.write("a.txt", "1");
    let h1 = snapshot(&tracker).await;

    let diff = tracker.get_diff_set(None, Some(&h1)).await.unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].relative_path, "a.txt");
    assert_eq!(diff[0].status, FileStatus::Modified);
    assert_eq!(diff[0].before, "0");
    assert_eq!(diff[0].after, "1");
}

#[tokio::test]
async fn renamed_files_have_empty_before() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let tracker = fx.tracker("task-1").await;
    let contents = "line one\nline two\nline three\n";
    fx.write("a.txt", contents);
    let h1 = snapshot(&tracker).await;

    fs::rename(fx.work.path().join("a.txt"), fx.work.path().join("b.txt")).unwrap();

    let status = tracker.status().await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].status, FileStatus::Renamed);
    assert_eq!(status[0].path, "b.txt");
    assert_eq!(status[0].previous_path.as_deref(), Some("a.txt"));

    let h2 = snapshot(&tracker).await;
    let diff = tracker.get_diff_set(Some(&h1), Some(&h2)).await.unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].relative_path, "b.txt");
    assert_eq!(diff[0].status, FileStatus::Renamed);
    assert_eq!(diff[0].before, "");
    assert_eq!(diff[0].after, contents);
}

#[tokio::test]
async fn storage_inside_workspace_is_left_out_of_snapshots() {
    if !git_available() {
        return;
    }
    let work = tempdir().unwrap();
    fs::create_dir_all(work.path().join("sub")).unwrap();
    fs::write(work.path().join("a.txt"), "1").unwrap();
    let config = EngineConfig::builder()
        .storage_root(work.path().join("sub/../.ckpt"))
        .working_dir(work.path())
        .build()
        .unwrap();

    let tracker = CheckpointTracker::create("task-1", &config)
        .await
        .unwrap()
        .expect("checkpoints enabled");
    let root = snapshot(&tracker).await;
    assert_eq!(
        tracker
            .get_file_content_at_commit(&root, "a.txt")
            .await
            .unwrap()
            .as_deref(),
        Some("1")
    );

    fs::write(work.path().join("a.txt"), "2").unwrap();
    let h2 = snapshot(&tracker).await;
    assert_ne!(root, h2);

    let diff = tracker.get_diff_set(Some(&root), Some(&h2)).await.unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].relative_path, "a.txt");
    let record = tracker
        .get_file_content_at_commit(&h2, ".ckpt/tasks/task-1.json")
        .await
        .unwrap();
    assert_eq!(record, None);

    tracker.reset_head(&root).await.unwrap();
    assert_eq!(fs::read_to_string(work.path().join("a.txt")).unwrap(), "1");
    assert!(tracker.shadow_storage_path().join(".git").is_dir());
    assert!(work.path().join(".ckpt/tasks/task-1.json").exists());
}
