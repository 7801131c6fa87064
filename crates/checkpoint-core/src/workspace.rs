//! Working directory resolution and identifier derivation.
//!
//! A [`WorkspaceBinding`] pairs the canonical absolute path of the directory
//! being checkpointed with a stable identifier used to namespace its shadow
//! storage. The identifier is a SHA-256 of the lower-cased,
//! forward-slash-normalized path, so re-deriving it from the same directory
//! always lands on the same storage.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{CheckpointError, CheckpointResult};
use crate::paths;

/// A validated working directory and the identifier of its shadow storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceBinding {
    absolute_path: PathBuf,
    identifier: String,
}

impl WorkspaceBinding {
    /// Resolve and validate `candidate`, then derive its identifier.
    pub fn resolve(candidate: Option<&Path>) -> CheckpointResult<Self> {
        let absolute_path = resolve_working_directory(candidate)?;
        let identifier = derive_identifier(&absolute_path);
        Ok(Self {
            absolute_path,
            identifier,
        })
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Resolve the working directory to snapshot.
///
/// Fails with `NoWorkspace` when nothing is selected, `AccessDenied` when
/// the directory is missing or not readable and writable, and
/// `ProtectedPath` for the home directory, its Desktop/Documents/Downloads,
/// or a filesystem root.
pub fn resolve_working_directory(candidate: Option<&Path>) -> CheckpointResult<PathBuf> {
    resolve_with_protected(candidate, &paths::protected_directories())
}

fn resolve_with_protected(
    candidate: Option<&Path>,
    protected: &[PathBuf],
) -> CheckpointResult<PathBuf> {
    let candidate = match candidate {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => return Err(CheckpointError::NoWorkspace),
    };

    let access_denied = |source: io::Error| CheckpointError::AccessDenied {
        path: candidate.to_path_buf(),
        source,
    };

    let absolute = std::fs::canonicalize(candidate).map_err(access_denied)?;
    if !absolute.is_dir() {
        return Err(access_denied(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a directory",
        )));
    }
    check_read_write(&absolute).map_err(access_denied)?;

    if absolute.parent().is_none() {
        return Err(CheckpointError::ProtectedPath(absolute));
    }
    for dir in protected {
        let dir = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.clone());
        if dir == absolute {
            return Err(CheckpointError::ProtectedPath(absolute));
        }
    }

    Ok(absolute)
}

#[cfg(unix)]
fn check_read_write(path: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn check_read_write(path: &Path) -> io::Result<()> {
    std::fs::read_dir(path)?;
    if std::fs::metadata(path)?.permissions().readonly() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "directory is read-only",
        ));
    }
    Ok(())
}

/// Derive the storage identifier for a working directory. Pure, no I/O.
pub fn derive_identifier(path: &Path) -> String {
    let normalized = normalize_for_identifier(path);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize_for_identifier(path: &Path) -> String {
    let mut s = path.to_string_lossy().replace('\\', "/").to_lowercase();
    while s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    s
}
