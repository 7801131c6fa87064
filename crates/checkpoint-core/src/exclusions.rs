//! Paths that are never captured by a checkpoint.
//!
//! The list is written to the shadow repository's `info/exclude`, which git
//! honors like a `.gitignore` but never commits. It is regenerated in full
//! every time the shadow repository is opened.

use regex::Regex;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

/// Suffix appended to nested `.git` directories while they are suppressed.
pub const GIT_DISABLED_SUFFIX: &str = "_disabled";

/// Version-control metadata, including the suppressed form of nested repositories.
///
/// The suppressed form has no trailing slash: worktree checkouts carry a
/// `.git` file rather than a directory.
fn vcs_patterns() -> Vec<String> {
    vec![".git/".to_string(), format!(".git{GIT_DISABLED_SUFFIX}")]
}

const BUILD_PATTERNS: &[&str] = &[
    ".gradle/",
    ".idea/",
    ".parcel-cache/",
    ".pytest_cache/",
    ".next/",
    ".nuxt/",
    ".sass-cache/",
    ".vs/",
    ".vscode/",
    "Pods/",
    "__pycache__/",
    "bin/",
    "build/",
    "bundle/",
    "coverage/",
    "deps/",
    "dist/",
    "env/",
    "node_modules/",
    "obj/",
    "out/",
    "pkg/",
    "pycache/",
    "target/",
    "temp/",
    "vendor/",
    "venv/",
];

const MEDIA_PATTERNS: &[&str] = &[
    "*.jpg", "*.jpeg", "*.png", "*.gif", "*.bmp", "*.ico", "*.webp", "*.tiff", "*.tif", "*.raw",
    "*.heic", "*.avif", "*.eps", "*.psd", "*.3gp", "*.aac", "*.aiff", "*.asf", "*.avi", "*.divx",
    "*.flac", "*.m4a", "*.m4v", "*.mkv", "*.mov", "*.mp3", "*.mp4", "*.mpeg", "*.mpg", "*.ogg",
    "*.opus", "*.rm", "*.rmvb", "*.vob", "*.wav", "*.webm", "*.wma", "*.wmv",
];

const CACHE_PATTERNS: &[&str] = &[
    "*.DS_Store",
    "*.bak",
    "*.cache",
    "*.crdownload",
    "*.dmp",
    "*.dump",
    "*.eslintcache",
    "*.lock",
    "*.pid",
    "*.swp",
    "*.temp",
    "*.tmp",
    "Thumbs.db",
];

const SECRET_PATTERNS: &[&str] = &["*.env*", "*.local", "*.development", "*.production"];

const ARCHIVE_PATTERNS: &[&str] = &[
    "*.7z", "*.bin", "*.bz2", "*.dat", "*.deb", "*.dll", "*.dylib", "*.exe", "*.gz", "*.iso",
    "*.jar", "*.msi", "*.o", "*.obj", "*.rar", "*.rpm", "*.so", "*.tar", "*.tgz", "*.war",
    "*.xz", "*.zip", "*.class", "*.pyc", "*.pyo", "*.wasm",
];

const DATABASE_PATTERNS: &[&str] = &[
    "*.arrow", "*.accdb", "*.aof", "*.avro", "*.bson", "*.db", "*.db3", "*.dbf", "*.dbs",
    "*.frm", "*.ib", "*.ibd", "*.mdb", "*.myd", "*.myi", "*.orc", "*.parquet", "*.pdb",
    "*.rdb", "*.sdf", "*.sql", "*.sqlite", "*.sqlite3", "*.wal",
];

const GEOSPATIAL_PATTERNS: &[&str] = &[
    "*.shp", "*.shx", "*.prj", "*.cpg", "*.gdb", "*.gpkg", "*.kmz", "*.mbtiles", "*.osm",
    "*.qgs", "*.qgz", "*.tfw", "*.vrt",
];

const LOG_PATTERNS: &[&str] = &["*.error", "*.log", "*.logs", "*.npm", "*.out", "*.stdout"];

/// Build the full exclusion list: the fixed base categories followed by `extra_patterns`.
pub fn build_exclusion_list(extra_patterns: &[String]) -> Vec<String> {
    let mut patterns = vcs_patterns();
    for group in [
        BUILD_PATTERNS,
        MEDIA_PATTERNS,
        CACHE_PATTERNS,
        SECRET_PATTERNS,
        ARCHIVE_PATTERNS,
        DATABASE_PATTERNS,
        GEOSPATIAL_PATTERNS,
        LOG_PATTERNS,
    ] {
        patterns.extend(group.iter().map(|p| p.to_string()));
    }
    patterns.extend(extra_patterns.iter().cloned());
    patterns
}

static LFS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+)\s+.*\bfilter=lfs\b").unwrap());

/// Parse large-file patterns out of `.gitattributes` content.
pub fn parse_lfs_patterns(attributes: &str) -> Vec<String> {
    attributes
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| LFS_LINE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Large-file patterns declared by the working directory's own `.gitattributes`.
pub fn lfs_patterns(working_dir: &Path) -> Vec<String> {
    match std::fs::read_to_string(working_dir.join(".gitattributes")) {
        Ok(contents) => parse_lfs_patterns(&contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            log::warn!("Failed to read .gitattributes: {e}");
            Vec::new()
        }
    }
}

/// Overwrite `<git_dir>/info/exclude` with `patterns`.
pub fn write_exclude_file(git_dir: &Path, patterns: &[String]) -> io::Result<()> {
    let info = git_dir.join("info");
    std::fs::create_dir_all(&info)?;
    let mut contents = patterns.join("\n");
    contents.push('\n');
    std::fs::write(info.join("exclude"), contents)
}

/// Regenerate the exclude file for a shadow repository.
///
/// Write failures are logged and swallowed; snapshots still work, just larger.
pub fn refresh_exclusions(git_dir: &Path, working_dir: &Path, extra: &[String]) -> Vec<String> {
    let mut extra = extra.to_vec();
    extra.extend(lfs_patterns(working_dir));
    let patterns = build_exclusion_list(&extra);

    if let Err(e) = write_exclude_file(git_dir, &patterns) {
        log::warn!(
            "Failed to write exclusions for {}: {e}",
            working_dir.display()
        );
    }
    patterns
}
