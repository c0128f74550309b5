use crate::error::{Result, WalkError};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Workspace ignore file, same grammar as `.gitignore`.
pub const WORKSPACE_IGNORE_FILENAME: &str = ".quarryignore";

/// Built-in patterns excluded from every walk, regardless of VCS ignore
/// state: build artifacts, media, archives, lockfiles, secrets.
const GLOBAL_IGNORE_PATTERNS: &[&str] = &[
    "**/.git",
    "**/.hg",
    "**/.svn",
    "**/node_modules",
    "**/target",
    "**/__pycache__",
    "**/.pytest_cache",
    "**/.idea",
    "**/.vscode",
    "**/.DS_Store",
    "*.lock",
    "**/package-lock.json",
    "*.log",
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.svg",
    "*.ico",
    "*.pdf",
    "*.zip",
    "*.gz",
    "*.tar",
    "*.tgz",
    "*.rar",
    "*.7z",
    "*.exe",
    "*.dll",
    "*.so",
    "*.dylib",
    "*.a",
    "*.o",
    "*.class",
    "*.jar",
    "*.pyc",
    "*.whl",
    "*.woff",
    "*.woff2",
    "*.ttf",
    "*.eot",
    "*.mp3",
    "*.mp4",
    "*.mov",
    "*.avi",
    "*.mkv",
    "*.webm",
    "*.onnx",
    "*.parquet",
    "*.db",
    "*.sqlite",
    "*.sqlite3",
    "*.pem",
    "*.key",
    "*.crt",
    "**/.env",
];

/// Number of leading bytes inspected for the binary sniff.
const SNIFF_LEN: usize = 8 * 1024;

/// Map of absolute file path to last-modified time in milliseconds since the
/// Unix epoch.
pub type WalkedFiles = HashMap<PathBuf, u64>;

#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Files larger than this are skipped.
    pub max_file_size: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
        }
    }
}

/// Enumerates indexable files under one workspace root.
pub struct ContentWalker {
    config: WalkerConfig,
}

impl ContentWalker {
    pub fn new(config: WalkerConfig) -> Self {
        Self { config }
    }

    /// Walk `root` and return the surviving files. Individual unreadable
    /// files are skipped with a warning; only a missing or unreadable root
    /// aborts the walk.
    pub fn walk(&self, root: &Path) -> Result<WalkedFiles> {
        let meta = fs::metadata(root).map_err(|source| WalkError::RootUnreadable {
            root: root.to_path_buf(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(WalkError::RootUnreadable {
                root: root.to_path_buf(),
                source: std::io::Error::other("workspace root is not a directory"),
            });
        }

        let overrides = build_global_overrides(root)
            .map_err(|e| WalkError::Walk {
                root: root.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .follow_links(false)
            .overrides(overrides)
            .add_custom_ignore_filename(WORKSPACE_IGNORE_FILENAME);

        let mut files = WalkedFiles::new();

        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable entry under {}: {err}", root.display());
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    warn!("skipping {}: metadata unreadable ({err})", path.display());
                    continue;
                }
            };
            if meta.len() > self.config.max_file_size {
                debug!(
                    "skipping {}: {} bytes exceeds limit of {}",
                    path.display(),
                    meta.len(),
                    self.config.max_file_size
                );
                continue;
            }
            if looks_binary(path) {
                debug!("skipping {}: binary content", path.display());
                continue;
            }

            let modified_millis = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);

            files.insert(path.to_path_buf(), modified_millis);
        }

        debug!("walked {}: {} files", root.display(), files.len());
        Ok(files)
    }
}

fn build_global_overrides(root: &Path) -> std::result::Result<ignore::overrides::Override, ignore::Error> {
    let mut builder = OverrideBuilder::new(root);
    for pattern in GLOBAL_IGNORE_PATTERNS {
        // Leading '!' marks the pattern as an ignore in override position.
        builder.add(&format!("!{pattern}"))?;
    }
    builder.build()
}

/// A file is treated as binary when its first bytes contain a NUL.
fn looks_binary(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return true;
    };
    let mut buf = [0u8; SNIFF_LEN];
    let mut read = 0;
    while read < SNIFF_LEN {
        match file.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(_) => return true,
        }
    }
    buf[..read].contains(&0)
}
