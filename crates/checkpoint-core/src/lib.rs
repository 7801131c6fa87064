//! # checkpoint-core
//!
//! Shadow-repository checkpoints for a working directory: snapshot the
//! tree, list what changed between snapshots, and restore any snapshot.
//!
//! History is kept in a hidden git repository outside the working
//! directory, so the user's own version control is never touched.
//!
//! ## Key Concepts
//!
//! - **Workspace binding**: the canonical working directory plus the stable
//!   identifier derived from it
//! - **Shadow repository**: engine-owned git storage bound 1:1 to a workspace
//! - **Checkpoint**: a commit in the shadow repository, referred to by hash
//! - **Tracker**: the per-task facade over a shadow repository

pub mod config;
pub mod error;
pub mod exclusions;
pub mod git;
pub mod mutation;
pub mod nested;
pub mod paths;
pub mod shadow;
pub mod shell;
pub mod tasks;
pub mod tracker;
pub mod workspace;

// Re-export commonly used types
pub use config::{CheckpointSettings, EngineConfig, EngineConfigBuilder};
pub use error::{CheckpointError, CheckpointResult};
pub use git::{ChangedFile, DiffEntry, FileStatus};
pub use mutation::{MutationOutcome, ShellMutation, WorkspaceMutation};
pub use shadow::{ShadowRepository, SnapshotInfo, StageResult};
pub use tracker::{delete_checkpoints, CheckpointPair, CheckpointTracker};
pub use workspace::WorkspaceBinding;
