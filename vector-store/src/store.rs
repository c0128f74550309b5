use crate::error::{Result, VectorStoreError};
use log::{debug, warn};
use quarry_common::CacheKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

const SNAPSHOT_FILENAME: &str = "vectors.bin";

/// What makes two vector stores incompatible: the provider, its model, and
/// the embedding dimension all participate in the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreIdentity {
    pub provider_id: String,
    pub model: String,
    pub dim: usize,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredVector {
    pub cache_key: CacheKey,
    pub chunk_index: u32,
    pub score: f32,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    identity: StoreIdentity,
    entries: HashMap<CacheKey, Vec<Vec<f32>>>,
}

/// In-memory vector store with a binary snapshot on disk. Exhaustive cosine
/// search; vectors are normalized once on insert.
pub struct VectorStore {
    dir: PathBuf,
    identity: StoreIdentity,
    /// Per cache key, vectors ordered by chunk index.
    entries: HashMap<CacheKey, Vec<Vec<f32>>>,
}

impl VectorStore {
    /// Open the store rooted at `dir`, loading the snapshot when present.
    /// A corrupt or identity-mismatched snapshot is discarded with a
    /// warning; compute runs will repopulate it.
    pub fn open(dir: impl Into<PathBuf>, identity: StoreIdentity) -> Result<Self> {
        let dir = dir.into();
        let snapshot_path = dir.join(SNAPSHOT_FILENAME);
        let entries = match fs::read(&snapshot_path) {
            Ok(data) => match bincode::deserialize::<Snapshot>(&data) {
                Ok(snapshot) if snapshot.identity == identity => snapshot.entries,
                Ok(snapshot) => {
                    warn!(
                        "vector snapshot at {} belongs to {:?}, not {:?}; starting empty",
                        snapshot_path.display(),
                        snapshot.identity,
                        identity
                    );
                    HashMap::new()
                }
                Err(err) => {
                    warn!(
                        "vector snapshot at {} is unreadable ({err}); starting empty",
                        snapshot_path.display()
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        debug!(
            "opened vector store {}/{} dim={} with {} files",
            identity.provider_id,
            identity.model,
            identity.dim,
            entries.len()
        );
        Ok(Self {
            dir,
            identity,
            entries,
        })
    }

    pub fn identity(&self) -> &StoreIdentity {
        &self.identity
    }

    /// Store the chunk vectors for one file, replacing any previous set.
    /// Vector `i` belongs to chunk index `i`.
    pub fn insert(&mut self, cache_key: CacheKey, vectors: Vec<Vec<f32>>) -> Result<()> {
        for vector in &vectors {
            if vector.len() != self.identity.dim {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: self.identity.dim,
                    actual: vector.len(),
                });
            }
        }
        let normalized = vectors.into_iter().map(normalize).collect();
        self.entries.insert(cache_key, normalized);
        Ok(())
    }

    pub fn remove(&mut self, cache_key: &CacheKey) {
        self.entries.remove(cache_key);
    }

    pub fn contains(&self, cache_key: &CacheKey) -> bool {
        self.entries.contains_key(cache_key)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-k by cosine similarity. `tag_filter` decides whether a cache key
    /// is visible to this query; the caller derives it from the catalog so
    /// untagged leftovers on disk never surface.
    pub fn top_k(
        &self,
        query: &[f32],
        k: usize,
        tag_filter: &dyn Fn(&CacheKey) -> bool,
    ) -> Vec<ScoredVector> {
        let query = normalize(query.to_vec());
        let mut scored: Vec<ScoredVector> = Vec::new();
        for (cache_key, vectors) in &self.entries {
            if !tag_filter(cache_key) {
                continue;
            }
            for (chunk_index, vector) in vectors.iter().enumerate() {
                let score = dot(&query, vector);
                scored.push(ScoredVector {
                    cache_key: cache_key.clone(),
                    chunk_index: chunk_index as u32,
                    score,
                });
            }
        }
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }

    /// Write the snapshot atomically: temp sibling, fsync, rename.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| VectorStoreError::Persist {
            path: self.dir.clone(),
            source,
        })?;
        let snapshot = Snapshot {
            identity: self.identity.clone(),
            entries: self.entries.clone(),
        };
        let data = bincode::serialize(&snapshot)?;
        let path = self.dir.join(SNAPSHOT_FILENAME);
        let tmp_path = self.dir.join(format!("{SNAPSHOT_FILENAME}.tmp"));
        {
            let mut file = fs::File::create(&tmp_path).map_err(|source| {
                VectorStoreError::Persist {
                    path: tmp_path.clone(),
                    source,
                }
            })?;
            file.write_all(&data).map_err(|source| VectorStoreError::Persist {
                path: tmp_path.clone(),
                source,
            })?;
            file.sync_all().map_err(|source| VectorStoreError::Persist {
                path: tmp_path.clone(),
                source,
            })?;
        }
        fs::rename(&tmp_path, &path).map_err(|source| VectorStoreError::Persist {
            path,
            source,
        })
    }
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let magnitude = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > f32::EPSILON {
        for x in &mut vector {
            *x /= magnitude;
        }
    }
    vector
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn identity() -> StoreIdentity {
        StoreIdentity {
            provider_id: "test".into(),
            model: "test-model".into(),
            dim: 3,
        }
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from_contents(name.as_bytes())
    }

    #[test]
    fn insert_and_search() {
        let dir = TempDir::new().unwrap();
        let mut store = VectorStore::open(dir.path(), identity()).unwrap();

        store
            .insert(key("a"), vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]])
            .unwrap();
        store.insert(key("b"), vec![vec![0.0, 0.0, 1.0]]).unwrap();

        let hits = store.top_k(&[1.0, 0.1, 0.0], 2, &|_| true);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].cache_key, key("a"));
        assert_eq!(hits[0].chunk_index, 0);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn tag_filter_excludes_untagged_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = VectorStore::open(dir.path(), identity()).unwrap();
        store.insert(key("a"), vec![vec![1.0, 0.0, 0.0]]).unwrap();
        store.insert(key("b"), vec![vec![1.0, 0.0, 0.0]]).unwrap();

        let visible = key("b");
        let hits = store.top_k(&[1.0, 0.0, 0.0], 10, &|k| *k == visible);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].cache_key, key("b"));
    }

    #[test]
    fn scores_are_cosine_on_normalized_vectors() {
        let dir = TempDir::new().unwrap();
        let mut store = VectorStore::open(dir.path(), identity()).unwrap();
        // Same direction, different magnitude: cosine 1.0 either way.
        store.insert(key("a"), vec![vec![10.0, 0.0, 0.0]]).unwrap();

        let hits = store.top_k(&[0.5, 0.0, 0.0], 1, &|_| true);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = VectorStore::open(dir.path(), identity()).unwrap();
        let err = store.insert(key("a"), vec![vec![1.0, 0.0]]).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn snapshot_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut store = VectorStore::open(dir.path(), identity()).unwrap();
        store.insert(key("a"), vec![vec![0.0, 1.0, 0.0]]).unwrap();
        store.save().unwrap();

        let reopened = VectorStore::open(dir.path(), identity()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.contains(&key("a")));
    }

    #[test]
    fn identity_mismatch_starts_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = VectorStore::open(dir.path(), identity()).unwrap();
        store.insert(key("a"), vec![vec![0.0, 1.0, 0.0]]).unwrap();
        store.save().unwrap();

        let other = StoreIdentity {
            dim: 5,
            ..identity()
        };
        let reopened = VectorStore::open(dir.path(), other).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn remove_deletes_all_chunk_vectors() {
        let dir = TempDir::new().unwrap();
        let mut store = VectorStore::open(dir.path(), identity()).unwrap();
        store
            .insert(key("a"), vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]])
            .unwrap();
        store.remove(&key("a"));
        assert!(!store.contains(&key("a")));
        assert_eq!(store.len(), 0);
    }
}
