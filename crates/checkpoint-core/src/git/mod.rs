//! Git plumbing for the shadow repository.
//!
//! # Overview
//!
//! The shadow repository is driven through the `git` command-line tool
//! rather than a library binding. Every command is pinned to an explicit
//! `--git-dir` (the engine-owned storage) and `--work-tree` (the user's
//! working directory), so the user's own repository is never consulted,
//! even when the working directory is itself a git checkout.
//!
//! # Modules
//!
//! - [`diff`] - Name-status parsing and diff entry types
//!
//! # Error Handling
//!
//! All operations return `Result<T, GitError>`. The `GitError` type
//! captures both command execution failures and git-specific errors.
//!
//! # Example
//!
//! ```ignore
//! use checkpoint_core::git::ShadowGit;
//!
//! let git = ShadowGit::new("/storage/abc/.git", "/path/to/project");
//! let head = git.run_success(&["rev-parse", "HEAD"]).await?;
//! ```

pub mod diff;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

pub use diff::{parse_name_status_z, ChangedFile, DiffEntry, FileStatus};

/// Environment variables that would redirect git away from the shadow repository.
const GIT_REDIRECT_VARS: &[&str] = &["GIT_DIR", "GIT_WORK_TREE", "GIT_INDEX_FILE"];

// ============================================================================
// ERROR TYPE
// ============================================================================

/// Error type for git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Command failed to execute (e.g., git not found)
    #[error("Failed to run git: {0}")]
    CommandFailed(#[from] std::io::Error),

    /// Git command returned non-zero exit code
    #[error("Git error: {stderr}")]
    GitFailed {
        /// The stderr output from git
        stderr: String,
        /// The stdout output (sometimes contains useful info)
        stdout: String,
    },
}

impl GitError {
    /// Whether stderr mentions the given fragment.
    pub fn stderr_contains(&self, needle: &str) -> bool {
        match self {
            GitError::GitFailed { stderr, .. } => stderr.contains(needle),
            GitError::CommandFailed(_) => false,
        }
    }
}

// ============================================================================
// OUTPUT TYPE
// ============================================================================

/// Output from a git command.
#[derive(Debug)]
pub struct GitOutput {
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// Exit code, if the process was not killed by a signal
    pub code: Option<i32>,
    /// The stdout output
    pub stdout: Vec<u8>,
    /// The stderr output
    pub stderr: Vec<u8>,
}

impl GitOutput {
    /// Get stdout as a string (lossy UTF-8 conversion)
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string (lossy UTF-8 conversion)
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Convert a failed output into a `GitError`, or return the raw stdout.
    pub fn into_stdout(self) -> Result<Vec<u8>, GitError> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(GitError::GitFailed {
                stderr: self.stderr_str().trim().to_string(),
                stdout: self.stdout_str().trim().to_string(),
            })
        }
    }

    /// Like [`GitOutput::into_stdout`], but as a trimmed string.
    pub fn into_result(self) -> Result<String, GitError> {
        self.into_stdout()
            .map(|out| String::from_utf8_lossy(&out).trim().to_string())
    }
}

// ============================================================================
// SHADOW GIT HANDLE
// ============================================================================

/// A git invocation context bound to one shadow repository and one work tree.
#[derive(Debug, Clone)]
pub struct ShadowGit {
    git_dir: PathBuf,
    work_tree: PathBuf,
}

impl ShadowGit {
    pub fn new(git_dir: impl Into<PathBuf>, work_tree: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
            work_tree: work_tree.into(),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// Run a git command against the shadow repository and return the raw output.
    ///
    /// A non-zero exit is not an error here; callers inspect `success`.
    pub async fn run(&self, args: &[&str]) -> Result<GitOutput, GitError> {
        log::debug!("git {} (git-dir {})", args.join(" "), self.git_dir.display());

        let mut cmd = Command::new("git");
        cmd.arg(format!("--git-dir={}", self.git_dir.display()))
            .arg(format!("--work-tree={}", self.work_tree.display()))
            .args(["-c", "core.quotepath=false"])
            .args(args)
            .current_dir(&self.work_tree)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for var in GIT_REDIRECT_VARS {
            cmd.env_remove(var);
        }

        let output = cmd.output().await?;

        Ok(GitOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Run a git command and return trimmed stdout, or `GitError` on non-zero exit.
    pub async fn run_success(&self, args: &[&str]) -> Result<String, GitError> {
        self.run(args).await?.into_result()
    }
}

// ============================================================================
// COMMON UTILITIES
// ============================================================================

/// Run a plain git command in `cwd`, outside of any shadow binding.
pub async fn run_git(args: &[&str], cwd: &Path) -> Result<GitOutput, GitError> {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for var in GIT_REDIRECT_VARS {
        cmd.env_remove(var);
    }

    let output = cmd.output().await?;

    Ok(GitOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Report the installed git version, failing if git cannot be run at all.
pub async fn git_version() -> Result<String, GitError> {
    run_git(&["--version"], &std::env::temp_dir())
        .await?
        .into_result()
}

/// Check if a directory holds git metadata.
///
/// Checks for the presence of `.git` (either a directory for regular repos,
/// or a file for worktrees that points to the actual git directory).
pub fn is_git_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

// ============================================================================
// TESTS
// ============================================================================
