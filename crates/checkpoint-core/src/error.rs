//! Error taxonomy for the checkpoint engine.
//!
//! Binding-time errors (`NoWorkspace`, `AccessDenied`, `ProtectedPath`) and
//! setup-time errors (`GitUnavailable`, `InitFailed`, `WorktreeMismatch`) are
//! fatal to tracker creation. Operation-time errors (`CommitFailed`,
//! `ResetFailed`, `InvalidHash`) fail only the operation that raised them.

use std::path::PathBuf;
use thiserror::Error;

use crate::git::GitError;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("No working directory selected")]
    NoWorkspace,

    #[error("Cannot access working directory {path}: {source}")]
    AccessDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to checkpoint protected directory {0}")]
    ProtectedPath(PathBuf),

    #[error("Git is not available: {0}")]
    GitUnavailable(String),

    #[error("Failed to initialize shadow repository: {0}")]
    InitFailed(String),

    #[error("Shadow repository is bound to {recorded}, not {requested}")]
    WorktreeMismatch { recorded: String, requested: String },

    #[error("Failed to create checkpoint: {0}")]
    CommitFailed(String),

    #[error("Failed to restore checkpoint: {0}")]
    ResetFailed(String),

    #[error("Invalid checkpoint hash: {0}")]
    InvalidHash(String),

    #[error("Invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("Failed to read settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;
