use crate::error::{MerkleError, Result};
use log::warn;
use quarry_common::CacheKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One indexed file: its workspace path and the hash of its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Leaf {
    pub path: PathBuf,
    pub cache_key: CacheKey,
}

/// A balanced Merkle tree over the workspace, leaves sorted by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTree {
    leaves: Vec<Leaf>,
    root: [u8; 32],
}

/// Leaves present only in the new tree (`added`) or only in the old one
/// (`removed`), each sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub added: Vec<Leaf>,
    pub removed: Vec<Leaf>,
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::empty()
    }
}

impl MerkleTree {
    pub fn empty() -> Self {
        Self {
            leaves: Vec::new(),
            root: compute_root(&[]),
        }
    }

    /// Hash every file and assemble the tree. Files that disappear or become
    /// unreadable between the walk and this read are skipped with a warning.
    pub fn build<'a, I, F>(paths: I, mut read_file: F) -> Self
    where
        I: IntoIterator<Item = &'a Path>,
        F: FnMut(&Path) -> std::io::Result<Vec<u8>>,
    {
        let mut leaves = Vec::new();
        for path in paths {
            match read_file(path) {
                Ok(contents) => leaves.push(Leaf {
                    path: path.to_path_buf(),
                    cache_key: CacheKey::from_contents(&contents),
                }),
                Err(err) => {
                    warn!("merkle: skipping unreadable file {}: {err}", path.display());
                }
            }
        }
        Self::from_leaves(leaves)
    }

    pub fn from_leaves(mut leaves: Vec<Leaf>) -> Self {
        leaves.sort_by(|a, b| a.path.cmp(&b.path));
        let root = compute_root(&leaves);
        Self { leaves, root }
    }

    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Load a persisted tree. A missing file yields `None`; a corrupt file is
    /// removed and also yields `None`, so the caller treats the previous
    /// state as empty instead of failing the refresh.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(path).map_err(|source| MerkleError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        match bincode::deserialize::<MerkleTree>(&data) {
            Ok(tree) => Ok(Some(tree)),
            Err(err) => {
                warn!(
                    "merkle tree at {} is unreadable ({err}); treating as empty",
                    path.display()
                );
                if let Err(remove_err) = fs::remove_file(path) {
                    warn!(
                        "failed to remove corrupt merkle tree {}: {remove_err}",
                        path.display()
                    );
                }
                Ok(None)
            }
        }
    }

    /// Persist atomically: write a temp sibling, fsync, rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| MerkleError::Persist {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let data = bincode::serialize(self)?;
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path).map_err(|source| MerkleError::Persist {
                path: tmp_path.clone(),
                source,
            })?;
            file.write_all(&data).map_err(|source| MerkleError::Persist {
                path: tmp_path.clone(),
                source,
            })?;
            file.sync_all().map_err(|source| MerkleError::Persist {
                path: tmp_path.clone(),
                source,
            })?;
        }
        fs::rename(&tmp_path, path).map_err(|source| MerkleError::Persist {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Compare two trees. Equal roots short-circuit to an empty diff; otherwise
/// leaves are matched as `(path, cacheKey)` pairs, so a content change shows
/// up as one removal plus one addition under the same path.
pub fn diff(previous: &MerkleTree, current: &MerkleTree) -> TreeDiff {
    if previous.root == current.root {
        return TreeDiff::default();
    }

    let old: HashSet<&Leaf> = previous.leaves.iter().collect();
    let new: HashSet<&Leaf> = current.leaves.iter().collect();

    let mut added: Vec<Leaf> = current
        .leaves
        .iter()
        .filter(|leaf| !old.contains(*leaf))
        .cloned()
        .collect();
    let mut removed: Vec<Leaf> = previous
        .leaves
        .iter()
        .filter(|leaf| !new.contains(*leaf))
        .cloned()
        .collect();

    added.sort_by(|a, b| a.path.cmp(&b.path));
    removed.sort_by(|a, b| a.path.cmp(&b.path));

    TreeDiff { added, removed }
}

fn leaf_hash(leaf: &Leaf) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(leaf.path.to_string_lossy().as_bytes());
    hasher.update(leaf.cache_key.as_str().as_bytes());
    hasher.finalize().into()
}

fn compute_root(leaves: &[Leaf]) -> [u8; 32] {
    let mut level: Vec<[u8; 32]> = leaves.iter().map(leaf_hash).collect();
    if level.is_empty() {
        return Sha256::digest([]).into();
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                if pair.len() == 2 {
                    let mut hasher = Sha256::new();
                    hasher.update(pair[0]);
                    hasher.update(pair[1]);
                    hasher.finalize().into()
                } else {
                    pair[0]
                }
            })
            .collect();
    }
    level[0]
}
