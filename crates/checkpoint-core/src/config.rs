//! Engine configuration.
//!
//! Settings persist in `<storage root>/settings.json`:
//!
//! ```json
//! { "enabled": true, "extraExclusions": ["assets/raw/"] }
//! ```
//!
//! A missing file means defaults. Values set explicitly on the
//! [`EngineConfigBuilder`] win over the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CheckpointError, CheckpointResult};
use crate::paths;

const SETTINGS_FILE: &str = "settings.json";

/// Persistent, user-editable settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSettings {
    /// Whether checkpoints are taken at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Patterns excluded on top of the built-in list
    #[serde(default)]
    pub extra_exclusions: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            extra_exclusions: Vec::new(),
        }
    }
}

/// Save settings to `<dir>/settings.json` (write-then-rename).
pub fn save_settings(dir: &Path, settings: &CheckpointSettings) -> CheckpointResult<()> {
    fs::create_dir_all(dir)?;

    let file_path = dir.join(SETTINGS_FILE);
    let temp_path = dir.join(format!("{SETTINGS_FILE}.tmp"));

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, &file_path)?;

    Ok(())
}

/// Load settings from `<dir>/settings.json`, or defaults if it doesn't exist.
pub fn load_settings(dir: &Path) -> CheckpointResult<CheckpointSettings> {
    let file_path = dir.join(SETTINGS_FILE);

    if !file_path.exists() {
        return Ok(CheckpointSettings::default());
    }

    let contents = fs::read_to_string(&file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Resolved configuration for one engine session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    storage_root: PathBuf,
    working_dir: Option<PathBuf>,
    enabled: bool,
    extra_exclusions: Vec<String>,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn extra_exclusions(&self) -> &[String] {
        &self.extra_exclusions
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    storage_root: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    enabled: Option<bool>,
    extra_exclusions: Vec<String>,
}

impl EngineConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine-owned storage root. Defaults to `~/.checkpoints`.
    pub fn storage_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(dir.into());
        self
    }

    /// Working directory to checkpoint.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Override the persisted `enabled` setting.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Add an exclusion pattern for this session only.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.extra_exclusions.push(pattern.into());
        self
    }

    /// Resolve the storage root and merge persisted settings.
    ///
    /// A relative storage root is anchored to the current directory here,
    /// so every later git call sees the same location.
    pub fn build(self) -> CheckpointResult<EngineConfig> {
        let storage_root = match self.storage_root {
            Some(root) => root,
            None => paths::default_storage_root().ok_or_else(|| {
                CheckpointError::InitFailed("no storage root and no home directory".to_string())
            })?,
        };
        let storage_root = std::path::absolute(&storage_root)?;

        let settings = load_settings(&storage_root)?;
        let mut extra_exclusions = settings.extra_exclusions;
        extra_exclusions.extend(self.extra_exclusions);

        Ok(EngineConfig {
            enabled: self.enabled.unwrap_or(settings.enabled),
            storage_root,
            working_dir: self.working_dir,
            extra_exclusions,
        })
    }
}
