use std::env;
use std::path::PathBuf;

/// Directory under the home directory that holds engine storage by default.
pub const DEFAULT_STORAGE_DIR: &str = ".checkpoints";

/// Return the user's home directory path.
///
/// Uses HOME on Unix-like systems and USERPROFILE on Windows.
pub fn home_dir() -> Option<PathBuf> {
    for var in ["HOME", "USERPROFILE"] {
        if let Ok(value) = env::var(var) {
            if !value.is_empty() {
                return Some(PathBuf::from(value));
            }
        }
    }
    None
}

/// Default engine-owned storage root (`~/.checkpoints`).
pub fn default_storage_root() -> Option<PathBuf> {
    home_dir().map(|home| home.join(DEFAULT_STORAGE_DIR))
}

/// Well-known user directories that must never be snapshotted wholesale.
pub fn protected_directories() -> Vec<PathBuf> {
    let Some(home) = home_dir() else {
        return Vec::new();
    };
    vec![
        home.join("Desktop"),
        home.join("Documents"),
        home.join("Downloads"),
        home,
    ]
}
