use crate::error::{Result, RetrievalError};
use crate::fusion::{dedupe_by_file, fuse, Candidate};
use crate::reranker::RerankerProvider;
use crate::result::{ContextItem, RetrievalStats};
use globset::GlobSet;
use log::{debug, warn};
use lru::LruCache;
use quarry_catalog::CatalogStore;
use quarry_common::{ArtifactKind, CacheKey, Chunk, IndexOptions, RetrievalOptions, Tag};
use quarry_embeddings::EmbeddingProvider;
use quarry_lexical::{tokenize, LexicalIndex};
use quarry_vector_store::VectorStore;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::{Mutex, RwLock};

const QUERY_CACHE_SIZE: usize = 64;

/// One retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    /// Index partitions to search; the artifact kind on each tag is
    /// rewritten per sub-index, so any kind may be passed in.
    pub tags: Vec<Tag>,
    /// Files the caller already has open; they get the full recency boost.
    pub seed_paths: Vec<PathBuf>,
    /// Per-request override of the pipeline's options.
    pub options: Option<RetrievalOptions>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, tags: Vec<Tag>) -> Self {
        Self {
            query: query.into(),
            tags,
            seed_paths: Vec::new(),
            options: None,
        }
    }
}

/// Fuses vector, lexical, and recency signals into a small ranked context
/// set. Runs concurrently with refreshes; it reads whichever rows are
/// committed and never takes the refresh lease.
pub struct RetrievalPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn RerankerProvider>>,
    vector_store: Arc<RwLock<VectorStore>>,
    lexical: Arc<RwLock<LexicalIndex>>,
    catalog: Arc<Mutex<CatalogStore>>,
    options: RetrievalOptions,
    disabled_files: GlobSet,
    cache: Mutex<LruCache<String, Vec<ContextItem>>>,
}

impl RetrievalPipeline {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<RwLock<VectorStore>>,
        lexical: Arc<RwLock<LexicalIndex>>,
        catalog: Arc<Mutex<CatalogStore>>,
        options: RetrievalOptions,
        index_options: &IndexOptions,
    ) -> Result<Self> {
        options.validate()?;
        let disabled_files = index_options.disabled_files()?;
        let cache_size = NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            provider,
            reranker: None,
            vector_store,
            lexical,
            catalog,
            options,
            disabled_files,
            cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn RerankerProvider>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Drop cached query results; called after an index update.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ContextItem>> {
        let (items, _stats) = self.retrieve_with_stats(request).await?;
        Ok(items)
    }

    pub async fn retrieve_with_stats(
        &self,
        request: &RetrievalRequest,
    ) -> Result<(Vec<ContextItem>, RetrievalStats)> {
        let started = Instant::now();
        let options = request.options.clone().unwrap_or_else(|| self.options.clone());
        options.validate()?;
        let mut stats = RetrievalStats::default();

        let cache_key = self.cache_key(request, &options);
        if let Some(cached) = self.cache.lock().await.get(&cache_key) {
            debug!("query cache hit for '{}'", request.query);
            stats.total_time_ms = started.elapsed().as_millis() as u64;
            return Ok((cached.clone(), stats));
        }

        // Tag filters join through the catalog: artifacts whose tags were
        // removed stay invisible even while their vectors sit on disk.
        let (embed_keys, lexical_keys) = {
            let catalog = self.catalog.lock().await;
            let embed_tags: Vec<Tag> = request
                .tags
                .iter()
                .map(|t| t.with_artifact(ArtifactKind::Embeddings))
                .collect();
            let lexical_tags: Vec<Tag> = request
                .tags
                .iter()
                .map(|t| t.with_artifact(ArtifactKind::Lexical))
                .collect();
            (
                catalog.cache_keys_for_tags(&embed_tags)?,
                catalog.cache_keys_for_tags(&lexical_tags)?,
            )
        };

        // Stage 1: the query vector. Failure degrades to lexical-only.
        let embed_started = Instant::now();
        let query_vector = match self.provider.embed(vec![request.query.clone()]).await {
            Ok(mut vectors) => vectors.pop(),
            Err(err) => {
                warn!("query embedding failed; degrading to lexical-only: {err}");
                None
            }
        };
        stats.embed_time_ms = embed_started.elapsed().as_millis() as u64;

        // Stage 2: both candidate sources, side by side.
        let search_started = Instant::now();
        let n_retrieve = options.n_retrieve;
        let (vector_hits, lexical_hits) = tokio::join!(
            async {
                match &query_vector {
                    Some(vector) => {
                        let store = self.vector_store.read().await;
                        Some(store.top_k(vector, n_retrieve, &|key| embed_keys.contains(key)))
                    }
                    None => None,
                }
            },
            async {
                let terms = tokenize(&request.query);
                let index = self.lexical.read().await;
                if index.doc_count() == 0 {
                    None
                } else {
                    Some(index.search(&terms, n_retrieve, &|key| lexical_keys.contains(key)))
                }
            }
        );
        stats.search_time_ms = search_started.elapsed().as_millis() as u64;

        if vector_hits.is_none() && lexical_hits.is_none() {
            return Err(RetrievalError::RetrievalUnavailable(
                "vector path failed and no lexical index is available".into(),
            ));
        }
        let vector_hits = vector_hits.unwrap_or_default();
        let lexical_hits = lexical_hits.unwrap_or_default();
        stats.vector_candidates = vector_hits.len();
        stats.lexical_candidates = lexical_hits.len();

        // Stage 3: union by (cacheKey, chunkIndex) and fuse.
        let mut merged: HashMap<(CacheKey, u32), (Option<f32>, Option<f32>)> = HashMap::new();
        for hit in &vector_hits {
            merged
                .entry((hit.cache_key.clone(), hit.chunk_index))
                .or_insert((None, None))
                .0 = Some(hit.score);
        }
        for hit in &lexical_hits {
            merged
                .entry((hit.cache_key.clone(), hit.chunk_index))
                .or_insert((None, None))
                .1 = Some(hit.score);
        }

        let chunks = self.load_chunks(merged.keys().map(|(k, _)| k)).await?;
        let seed_paths: HashSet<&PathBuf> = request.seed_paths.iter().collect();
        let mut candidates = Vec::with_capacity(merged.len());
        for ((cache_key, chunk_index), (cosine, bm25)) in merged {
            let Some(chunk) = chunks.get(&(cache_key, chunk_index)) else {
                continue;
            };
            if self.disabled_files.is_match(&chunk.filepath) {
                continue;
            }
            let recency = recency_boost(&chunk.filepath, &seed_paths);
            candidates.push(Candidate {
                chunk: chunk.clone(),
                cosine,
                bm25,
                recency,
            });
        }

        let fused = dedupe_by_file(fuse(candidates));
        stats.fused_candidates = fused.len();
        let mut ranked: Vec<(Chunk, f32)> = fused
            .into_iter()
            .take(n_retrieve)
            .map(|c| (c.chunk, c.score))
            .collect();

        // Stage 5: optional rerank; failure falls back to fused order.
        if options.use_reranking {
            if let Some(reranker) = &self.reranker {
                let rerank_started = Instant::now();
                let contents: Vec<String> =
                    ranked.iter().map(|(chunk, _)| chunk.content.clone()).collect();
                match reranker.rerank(&request.query, contents).await {
                    Ok(scores) => {
                        for ((_, score), reranked) in ranked.iter_mut().zip(&scores) {
                            *score = *reranked;
                        }
                        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                        stats.reranked = true;
                    }
                    Err(err) => {
                        warn!(
                            "reranker {} failed; keeping fused ordering: {err}",
                            reranker.name()
                        );
                    }
                }
                stats.rerank_time_ms = rerank_started.elapsed().as_millis() as u64;
            }
        }

        let items: Vec<ContextItem> = ranked
            .into_iter()
            .take(options.n_final)
            .map(|(chunk, score)| ContextItem {
                filepath: chunk.filepath,
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                content: chunk.content,
                score,
            })
            .collect();

        self.cache.lock().await.put(cache_key, items.clone());
        stats.total_time_ms = started.elapsed().as_millis() as u64;
        debug!(
            "retrieval for '{}': {} vector + {} lexical -> {} items in {}ms",
            request.query,
            stats.vector_candidates,
            stats.lexical_candidates,
            items.len(),
            stats.total_time_ms
        );
        Ok((items, stats))
    }

    async fn load_chunks<'a>(
        &self,
        keys: impl Iterator<Item = &'a CacheKey>,
    ) -> Result<HashMap<(CacheKey, u32), Chunk>> {
        let distinct: HashSet<&CacheKey> = keys.collect();
        let catalog = self.catalog.lock().await;
        let mut out = HashMap::new();
        for key in distinct {
            for chunk in catalog.chunks_for(key)? {
                out.insert((chunk.digest.clone(), chunk.index), chunk);
            }
        }
        Ok(out)
    }

    fn cache_key(&self, request: &RetrievalRequest, options: &RetrievalOptions) -> String {
        let mut key = request.query.clone();
        for tag in &request.tags {
            key.push_str("::");
            key.push_str(&tag.to_string());
        }
        key.push_str(&format!(
            "::{}::{}::{}",
            options.n_retrieve, options.n_final, options.use_reranking
        ));
        key
    }
}

/// Recency in `[0, 1]` from the file's last-modified time; seed files (the
/// caller's open files) always get the full boost.
fn recency_boost(filepath: &str, seed_paths: &HashSet<&PathBuf>) -> f32 {
    let path = PathBuf::from(filepath);
    if seed_paths.contains(&path) {
        return 1.0;
    }
    let Ok(meta) = std::fs::metadata(&path) else {
        return 0.0;
    };
    let Ok(modified) = meta.modified() else {
        return 0.0;
    };
    let age_days = SystemTime::now()
        .duration_since(modified)
        .map(|d| d.as_secs_f32() / 86_400.0)
        .unwrap_or(0.0);
    1.0 / (1.0 + age_days)
}
