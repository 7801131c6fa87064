//! Diff listing types and parsing.
//!
//! # Overview
//!
//! The shadow repository lists changes with
//! `git diff --name-status -z -M`, which emits NUL-separated records:
//!
//! ```text
//! M\0path/to/modified.rs\0
//! A\0path/to/added.rs\0
//! R100\0old/path.rs\0new/path.rs\0
//! ```
//!
//! # File Status Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | `A`  | Added   |
//! | `M`  | Modified|
//! | `D`  | Deleted |
//! | `R`  | Renamed |
//!
//! Copies (`C`) are reported as additions of the destination path; type
//! changes and unmerged entries fold into `Modified`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// TYPES
// ============================================================================

/// How a path changed between two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl FileStatus {
    /// Map a git status letter (first character of the status field).
    pub fn from_code(code: char) -> Self {
        match code {
            'A' | 'C' => FileStatus::Added,
            'D' => FileStatus::Deleted,
            'R' => FileStatus::Renamed,
            _ => FileStatus::Modified,
        }
    }
}

/// A path that differs between two trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    pub status: FileStatus,

    /// Path relative to the working directory (destination path for renames)
    pub path: String,

    /// Source path of a rename or copy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
}

/// A changed file together with its content on both sides of the diff.
///
/// `before` is empty for additions and renames; `after` is empty for deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub status: FileStatus,
    pub before: String,
    pub after: String,
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Parse the output of `git diff --name-status -z`.
///
/// Malformed trailing records (a status without its path) are dropped.
pub fn parse_name_status_z(stdout: &[u8]) -> Vec<ChangedFile> {
    let mut fields = stdout
        .split(|b| *b == 0)
        .filter(|f| !f.is_empty())
        .map(|f| String::from_utf8_lossy(f).to_string());

    let mut files = Vec::new();
    while let Some(code) = fields.next() {
        let letter = code.chars().next().unwrap_or('M');
        let status = FileStatus::from_code(letter);

        if letter == 'R' || letter == 'C' {
            let (Some(from), Some(to)) = (fields.next(), fields.next()) else {
                break;
            };
            files.push(ChangedFile {
                status,
                path: to,
                previous_path: Some(from),
            });
        } else {
            let Some(path) = fields.next() else {
                break;
            };
            files.push(ChangedFile {
                status,
                path,
                previous_path: None,
            });
        }
    }

    files
}

// ============================================================================
// TESTS
// ============================================================================
