//! Suppression of nested repositories inside the working directory.
//!
//! `git add` records a directory that holds its own `.git` as an embedded
//! repository (a gitlink) instead of capturing its files. While a
//! [`NestedRepoGuard`] is held, every nested `.git` is renamed to
//! `.git_disabled`, which the exclusion list hides, so the files beneath it
//! are snapshotted like any other. Dropping the guard renames everything
//! carrying the suffix back.
//!
//! Individual rename failures are logged and skipped; one locked directory
//! must not block the rest of the pass.

use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::exclusions::GIT_DISABLED_SUFFIX;

const GIT_DIR_NAME: &str = ".git";

fn disabled_name() -> String {
    format!("{GIT_DIR_NAME}{GIT_DISABLED_SUFFIX}")
}

/// Scoped suppression of nested repositories. Restores them on drop.
#[derive(Debug)]
pub struct NestedRepoGuard {
    working_dir: PathBuf,
    renamed: usize,
    released: bool,
}

impl NestedRepoGuard {
    /// Rename every nested `.git` under `working_dir`, except the top-level
    /// one and anything inside a `keep` directory (shadow storage).
    ///
    /// Paths are compared in canonical form, so `keep` may be given relative
    /// or through symlinks.
    pub fn acquire(working_dir: &Path, keep: &[PathBuf]) -> Self {
        let root = canonical_or_self(working_dir);
        let keep: Vec<PathBuf> = keep.iter().map(|k| canonical_or_self(k)).collect();
        let top_level = root.join(GIT_DIR_NAME);
        let disabled = disabled_name();
        let mut renamed = 0;

        for path in find_entries_named(&root, OsStr::new(GIT_DIR_NAME)) {
            if path == top_level || keep.iter().any(|k| path.starts_with(k)) {
                continue;
            }
            let target = path.with_file_name(&disabled);
            match std::fs::rename(&path, &target) {
                Ok(()) => renamed += 1,
                Err(e) => log::warn!("Failed to disable nested repository {}: {e}", path.display()),
            }
        }

        if renamed > 0 {
            log::debug!(
                "Disabled {renamed} nested repositories under {}",
                working_dir.display()
            );
        }

        Self {
            working_dir: working_dir.to_path_buf(),
            renamed,
            released: false,
        }
    }

    /// Number of nested repositories disabled on acquire.
    pub fn renamed(&self) -> usize {
        self.renamed
    }

    /// Rename every `.git_disabled` back to `.git`. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        restore_nested_repositories(&self.working_dir);
    }
}

impl Drop for NestedRepoGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Restore any nested repositories left disabled under `working_dir`.
///
/// Also heals directories left renamed by an interrupted earlier session.
pub fn restore_nested_repositories(working_dir: &Path) -> usize {
    let disabled = disabled_name();
    let mut restored = 0;

    for path in find_entries_named(working_dir, OsStr::new(&disabled)) {
        let target = path.with_file_name(GIT_DIR_NAME);
        if target.exists() {
            log::warn!(
                "Not restoring {}: {} already exists",
                path.display(),
                target.display()
            );
            continue;
        }
        match std::fs::rename(&path, &target) {
            Ok(()) => restored += 1,
            Err(e) => log::warn!("Failed to restore nested repository {}: {e}", path.display()),
        }
    }

    restored
}

fn canonical_or_self(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Find files or directories named `name` anywhere under `root`, without
/// descending into them.
fn find_entries_named(root: &Path, name: &OsStr) -> Vec<PathBuf> {
    let skip_children_of = [OsStr::new(GIT_DIR_NAME).to_os_string(), disabled_name().into()];

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .map(|parent| !skip_children_of.iter().any(|s| s == parent))
                .unwrap_or(true)
        })
        .build();

    let mut found = Vec::new();
    for entry in walker {
        match entry {
            Ok(e) => {
                if e.depth() > 0 && e.file_name() == name {
                    found.push(e.into_path());
                }
            }
            Err(err) => log::debug!("Skipping unreadable entry: {err}"),
        }
    }
    found.sort();
    found
}
