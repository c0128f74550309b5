use crate::error::{LexicalError, Result};
use crate::tokenize::tokenize;
use log::{debug, warn};
use quarry_common::CacheKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

const SNAPSHOT_FILENAME: &str = "lexical.bin";

// BM25 parameters: term-frequency saturation and length normalization.
const K1: f32 = 1.2;
const B: f32 = 0.75;

/// One indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocId {
    pub cache_key: CacheKey,
    pub chunk_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Posting {
    doc: DocId,
    tf: u32,
}

/// A BM25-ranked search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDoc {
    pub cache_key: CacheKey,
    pub chunk_index: u32,
    pub score: f32,
}

/// In-memory inverted index with a binary snapshot per `(dir, branch)`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LexicalIndex {
    inverted: HashMap<String, Vec<Posting>>,
    doc_lengths: HashMap<DocId, u32>,
    total_length: u64,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one chunk's content. Re-adding an existing doc replaces it.
    pub fn add_document(&mut self, cache_key: CacheKey, chunk_index: u32, content: &str) {
        let doc = DocId {
            cache_key,
            chunk_index,
        };
        if self.doc_lengths.contains_key(&doc) {
            self.remove_doc(&doc);
        }

        let terms = tokenize(content);
        let length = terms.len() as u32;
        let mut frequencies: HashMap<String, u32> = HashMap::new();
        for term in terms {
            *frequencies.entry(term).or_insert(0) += 1;
        }
        for (term, tf) in frequencies {
            self.inverted.entry(term).or_default().push(Posting {
                doc: doc.clone(),
                tf,
            });
        }
        self.doc_lengths.insert(doc, length);
        self.total_length += u64::from(length);
    }

    /// Drop every chunk indexed under `cache_key`.
    pub fn remove_document(&mut self, cache_key: &CacheKey) {
        let docs: Vec<DocId> = self
            .doc_lengths
            .keys()
            .filter(|doc| doc.cache_key == *cache_key)
            .cloned()
            .collect();
        for doc in docs {
            self.remove_doc(&doc);
        }
    }

    fn remove_doc(&mut self, doc: &DocId) {
        if let Some(length) = self.doc_lengths.remove(doc) {
            self.total_length -= u64::from(length);
        }
        self.inverted.retain(|_, postings| {
            postings.retain(|p| p.doc != *doc);
            !postings.is_empty()
        });
    }

    pub fn contains(&self, cache_key: &CacheKey) -> bool {
        self.doc_lengths
            .keys()
            .any(|doc| doc.cache_key == *cache_key)
    }

    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    /// BM25 search over `terms`. `tag_filter` is the catalog join: documents
    /// whose cache key has no current tag in the requested set are skipped.
    pub fn search(
        &self,
        terms: &[String],
        k: usize,
        tag_filter: &dyn Fn(&CacheKey) -> bool,
    ) -> Vec<ScoredDoc> {
        let total_docs = self.doc_lengths.len();
        if total_docs == 0 || terms.is_empty() {
            return Vec::new();
        }
        let avg_length = self.total_length as f32 / total_docs as f32;

        let mut scores: HashMap<&DocId, f32> = HashMap::new();
        for term in terms {
            let Some(postings) = self.inverted.get(term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = (((total_docs as f32 - df + 0.5) / (df + 0.5)) + 1.0).ln();
            for posting in postings {
                if !tag_filter(&posting.doc.cache_key) {
                    continue;
                }
                let length = *self.doc_lengths.get(&posting.doc).unwrap_or(&0) as f32;
                let tf = posting.tf as f32;
                let norm = tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * length / avg_length));
                *scores.entry(&posting.doc).or_insert(0.0) += idf * norm;
            }
        }

        let mut hits: Vec<ScoredDoc> = scores
            .into_iter()
            .map(|(doc, score)| ScoredDoc {
                cache_key: doc.cache_key.clone(),
                chunk_index: doc.chunk_index,
                score,
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }

    /// Load the snapshot under `dir`, treating missing or corrupt data as an
    /// empty index.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(SNAPSHOT_FILENAME);
        match fs::read(&path) {
            Ok(data) => match bincode::deserialize(&data) {
                Ok(index) => index,
                Err(err) => {
                    warn!(
                        "lexical snapshot at {} is unreadable ({err}); starting empty",
                        path.display()
                    );
                    Self::new()
                }
            },
            Err(_) => Self::new(),
        }
    }

    /// Persist atomically under `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|source| LexicalError::Persist {
            path: dir.to_path_buf(),
            source,
        })?;
        let data = bincode::serialize(self)?;
        let path = dir.join(SNAPSHOT_FILENAME);
        let tmp_path = dir.join(format!("{SNAPSHOT_FILENAME}.tmp"));
        {
            let mut file = fs::File::create(&tmp_path).map_err(|source| LexicalError::Persist {
                path: tmp_path.clone(),
                source,
            })?;
            file.write_all(&data).map_err(|source| LexicalError::Persist {
                path: tmp_path.clone(),
                source,
            })?;
            file.sync_all().map_err(|source| LexicalError::Persist {
                path: tmp_path.clone(),
                source,
            })?;
        }
        fs::rename(&tmp_path, &path).map_err(|source| LexicalError::Persist { path, source })?;
        debug!("saved lexical index ({} docs)", self.doc_lengths.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn key(name: &str) -> CacheKey {
        CacheKey::from_contents(name.as_bytes())
    }

    #[test]
    fn indexes_and_finds_terms() {
        let mut index = LexicalIndex::new();
        index.add_document(key("a"), 0, "hello\nworld\n");

        let hits = index.search(&tokenize("hello"), 10, &|_| true);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].cache_key, key("a"));
        assert!(hits[0].score > 0.0);

        let hits = index.search(&tokenize("world"), 10, &|_| true);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn ranks_matching_docs_higher() {
        let mut index = LexicalIndex::new();
        index.add_document(key("a"), 0, "fn authenticate_user(token: &str) {}");
        index.add_document(key("b"), 0, "fn render_widget(frame: &mut Frame) {}");
        index.add_document(key("c"), 0, "let user = authenticate(token);");

        let hits = index.search(&tokenize("authenticate user token"), 10, &|_| true);
        assert!(!hits.is_empty());
        assert_ne!(hits[0].cache_key, key("b"));
    }

    #[test]
    fn identifier_subtokens_are_searchable() {
        let mut index = LexicalIndex::new();
        index.add_document(key("a"), 0, "pub fn readFile(path: &Path) {}");

        let hits = index.search(&tokenize("read"), 10, &|_| true);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn removal_drops_all_chunks_of_a_key() {
        let mut index = LexicalIndex::new();
        index.add_document(key("a"), 0, "alpha beta");
        index.add_document(key("a"), 1, "gamma delta");
        index.add_document(key("b"), 0, "alpha omega");

        index.remove_document(&key("a"));

        assert!(!index.contains(&key("a")));
        assert_eq!(index.doc_count(), 1);
        let hits = index.search(&tokenize("alpha"), 10, &|_| true);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].cache_key, key("b"));
    }

    #[test]
    fn re_adding_a_doc_replaces_it() {
        let mut index = LexicalIndex::new();
        index.add_document(key("a"), 0, "old words here");
        index.add_document(key("a"), 0, "new content");

        assert_eq!(index.doc_count(), 1);
        assert!(index.search(&tokenize("old"), 10, &|_| true).is_empty());
        assert_eq!(index.search(&tokenize("new"), 10, &|_| true).len(), 1);
    }

    #[test]
    fn tag_filter_excludes_docs() {
        let mut index = LexicalIndex::new();
        index.add_document(key("a"), 0, "shared term");
        index.add_document(key("b"), 0, "shared term");

        let visible = key("a");
        let hits = index.search(&tokenize("shared"), 10, &|k| *k == visible);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].cache_key, key("a"));
    }

    #[test]
    fn snapshot_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut index = LexicalIndex::new();
        index.add_document(key("a"), 0, "persist me");
        index.save(dir.path()).unwrap();

        let reloaded = LexicalIndex::load(dir.path());
        assert_eq!(reloaded.doc_count(), 1);
        assert_eq!(reloaded.search(&tokenize("persist"), 10, &|_| true).len(), 1);
    }

    #[test]
    fn corrupt_snapshot_loads_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILENAME), b"garbage").unwrap();
        let index = LexicalIndex::load(dir.path());
        assert_eq!(index.doc_count(), 0);
    }
}
