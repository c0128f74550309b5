use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// The artifact families a tag can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    Chunks,
    Embeddings,
    Lexical,
    GlobalCache,
}

impl ArtifactKind {
    /// Stable identifier used in database rows and directory names.
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Chunks => "chunks",
            ArtifactKind::Embeddings => "embeddings",
            ArtifactKind::Lexical => "lexical",
            ArtifactKind::GlobalCache => "globalCache",
        }
    }

    /// The sub-indexes a refresh updates, in their fixed update order.
    pub fn sub_indexes() -> [ArtifactKind; 3] {
        [
            ArtifactKind::Chunks,
            ArtifactKind::Embeddings,
            ArtifactKind::Lexical,
        ]
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one index partition: a workspace directory, a branch, and the
/// artifact family stored under it. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub dir: PathBuf,
    pub branch: String,
    pub artifact: ArtifactKind,
}

impl Tag {
    pub fn new(dir: impl Into<PathBuf>, branch: impl Into<String>, artifact: ArtifactKind) -> Self {
        Self {
            dir: dir.into(),
            branch: branch.into(),
            artifact,
        }
    }

    /// The same partition under a different artifact kind.
    pub fn with_artifact(&self, artifact: ArtifactKind) -> Self {
        Self {
            dir: self.dir.clone(),
            branch: self.branch.clone(),
            artifact,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}",
            self.dir.display(),
            self.branch,
            self.artifact
        )
    }
}

/// Hex-encoded sha256 of a file's contents. The identity of every derived
/// artifact in the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash file contents into a cache key.
    pub fn from_contents(contents: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(contents);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an already hex-encoded digest, e.g. one read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A workspace file and the hash of its current contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathAndCacheKey {
    pub path: PathBuf,
    pub cache_key: CacheKey,
}

impl PathAndCacheKey {
    pub fn new(path: impl Into<PathBuf>, cache_key: CacheKey) -> Self {
        Self {
            path: path.into(),
            cache_key,
        }
    }
}

/// Strip directory separators so a workspace path can be used as a single
/// path component under the index root.
pub(crate) fn escape_dir(dir: &Path) -> String {
    let mut out = String::new();
    for component in dir.components() {
        let part = component.as_os_str().to_string_lossy();
        let part = part.trim_matches(['/', '\\']);
        if !part.is_empty() {
            out.push_str(part);
        }
    }
    out
}
