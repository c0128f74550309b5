use crate::error::{IndexerError, Result};
use crate::last_sync::write_last_sync;
use crate::lease::RefreshLease;
use crate::log_dedup::ErrorDedup;
use crate::progress::{ProgressEmitter, ProgressUpdate, RefreshStatus};
use crate::remote_cache::RemoteArtifactCache;
use log::{debug, info, warn};
use quarry_catalog::{CatalogStore, MarkKind, RefreshPlan};
use quarry_chunker::{chunk_document, ApproxTokenizer, Tokenizer};
use quarry_common::{ArtifactKind, CacheKey, Chunk, IndexLayout, PathAndCacheKey, Tag};
use quarry_embeddings::{Batcher, BatcherConfig, EmbeddingProvider};
use quarry_lexical::LexicalIndex;
use quarry_merkle::{diff, MerkleTree};
use quarry_vector_store::{StoreIdentity, VectorStore};
use quarry_walker::{ContentWalker, WalkedFiles, WalkerConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Knobs for one orchestrator instance.
#[derive(Clone)]
pub struct RefreshConfig {
    pub layout: IndexLayout,
    pub walker: WalkerConfig,
    /// Token budget per chunk, from the embedding provider options.
    pub max_chunk_size: usize,
    pub batcher: BatcherConfig,
    /// Items acknowledged per `mark_complete` transaction.
    pub batch_size: usize,
}

impl RefreshConfig {
    pub fn new(layout: IndexLayout) -> Self {
        Self {
            layout,
            walker: WalkerConfig::default(),
            max_chunk_size: 512,
            batcher: BatcherConfig::default(),
            batch_size: 64,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshStats {
    pub files_walked: usize,
    pub computed: usize,
    pub added_tags: usize,
    pub removed_tags: usize,
    pub deleted: usize,
}

/// Drives a refresh: walk, merkle, plan, then the three sub-indexes in
/// fixed order, acknowledging durable work through the catalog after each
/// batch.
pub struct RefreshOrchestrator {
    config: RefreshConfig,
    catalog: Arc<Mutex<CatalogStore>>,
    provider: Arc<dyn EmbeddingProvider>,
    remote_cache: Option<RemoteArtifactCache>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl RefreshOrchestrator {
    pub fn new(
        config: RefreshConfig,
        catalog: Arc<Mutex<CatalogStore>>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            catalog,
            provider,
            remote_cache: None,
            tokenizer: Arc::new(ApproxTokenizer),
        }
    }

    /// Enable read-only artifact fetches from a remote cache.
    pub fn with_remote_cache(mut self, cache: RemoteArtifactCache) -> Self {
        self.remote_cache = Some(cache);
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Run one refresh for `(dir, branch)`, streaming progress into
    /// `progress_tx`. Ends with exactly one terminal update: `Done`,
    /// `Failed`, or `Paused` when another refresh holds the lease.
    pub async fn refresh(
        &self,
        dir: &Path,
        branch: &str,
        progress_tx: mpsc::Sender<ProgressUpdate>,
        cancel: CancellationToken,
    ) -> Result<RefreshStats> {
        let mut progress = ProgressEmitter::new(progress_tx);

        let Some(_lease) = RefreshLease::try_acquire(dir) else {
            progress
                .emit(0.0, "another refresh is in progress", RefreshStatus::Paused)
                .await;
            return Ok(RefreshStats::default());
        };

        let result = self.run(dir, branch, &mut progress, &cancel).await;
        match &result {
            Ok(stats) => {
                info!(
                    "refresh of {} ({branch}) done: {} computed, {} tagged, {} untagged, {} deleted",
                    dir.display(),
                    stats.computed,
                    stats.added_tags,
                    stats.removed_tags,
                    stats.deleted
                );
                progress
                    .emit(1.0, "indexing complete", RefreshStatus::Done)
                    .await;
            }
            Err(IndexerError::Cancelled) => {
                progress
                    .emit(0.0, "refresh cancelled", RefreshStatus::Failed)
                    .await;
            }
            Err(err) => {
                progress
                    .emit(0.0, format!("refresh failed: {err}"), RefreshStatus::Failed)
                    .await;
            }
        }
        result
    }

    async fn run(
        &self,
        dir: &Path,
        branch: &str,
        progress: &mut ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<RefreshStats> {
        let mut stats = RefreshStats::default();
        let mut dedup = ErrorDedup::new();

        progress
            .emit(
                0.0,
                format!("walking {}", dir.display()),
                RefreshStatus::Indexing,
            )
            .await;
        let walker_config = self.config.walker.clone();
        let walk_root = dir.to_path_buf();
        let files: WalkedFiles = tokio::task::spawn_blocking(move || {
            ContentWalker::new(walker_config).walk(&walk_root)
        })
        .await
        .map_err(|e| IndexerError::Task(e.to_string()))??;
        stats.files_walked = files.len();

        progress
            .emit(0.05, "hashing workspace contents", RefreshStatus::Indexing)
            .await;
        let chunks_tag = Tag::new(dir, branch, ArtifactKind::Chunks);
        let previous_tree = match MerkleTree::load(&self.config.layout.merkle_tree(&chunks_tag)) {
            Ok(tree) => tree.unwrap_or_default(),
            Err(err) => {
                warn!("previous merkle tree unreadable ({err}); treating as empty");
                MerkleTree::empty()
            }
        };
        let mut tree_paths: Vec<PathBuf> = files.keys().cloned().collect();
        tree_paths.sort();
        let current_tree = tokio::task::spawn_blocking(move || {
            MerkleTree::build(tree_paths.iter().map(PathBuf::as_path), |p: &std::path::Path| std::fs::read(p))
        })
        .await
        .map_err(|e| IndexerError::Task(e.to_string()))?;
        let tree_diff = diff(&previous_tree, &current_tree);
        debug!(
            "merkle diff for {}: {} added, {} removed",
            dir.display(),
            tree_diff.added.len(),
            tree_diff.removed.len()
        );

        progress
            .emit(0.1, "planning mutations", RefreshStatus::Indexing)
            .await;
        let mut plans: Vec<(Tag, RefreshPlan)> = Vec::new();
        let mut total_work = 0usize;
        {
            let catalog = self.catalog.lock().await;
            let max_file_size = self.config.walker.max_file_size;
            for artifact in ArtifactKind::sub_indexes() {
                let tag = Tag::new(dir, branch, artifact);
                let mut read = |path: &Path| read_guarded(path, max_file_size);
                let plan = catalog.plan(&tag, &files, &mut read)?;
                debug!(
                    "plan for {tag}: {} compute, {} addTag, {} removeTag, {} del",
                    plan.compute.len(),
                    plan.add_tag.len(),
                    plan.remove_tag.len(),
                    plan.del.len()
                );
                total_work += plan.work_units();
                plans.push((tag, plan));
            }
        }

        let mut tracker = WorkTracker {
            done: 0,
            total: total_work.max(1),
            base: 0.1,
        };

        for (tag, plan) in &plans {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            match tag.artifact {
                ArtifactKind::Chunks => {
                    self.apply_chunks(tag, plan, progress, &mut tracker, cancel, &mut dedup, &mut stats)
                        .await?;
                }
                ArtifactKind::Embeddings => {
                    self.apply_embeddings(
                        tag,
                        plan,
                        progress,
                        &mut tracker,
                        cancel,
                        &mut dedup,
                        &mut stats,
                    )
                    .await?;
                }
                ArtifactKind::Lexical => {
                    self.apply_lexical(
                        dir,
                        branch,
                        tag,
                        plan,
                        progress,
                        &mut tracker,
                        cancel,
                        &mut dedup,
                        &mut stats,
                    )
                    .await?;
                }
                ArtifactKind::GlobalCache => {}
            }
        }

        if dedup.suppressed() > 0 {
            warn!(
                "{} repeated indexing errors were suppressed",
                dedup.suppressed()
            );
        }

        for (tag, _) in &plans {
            current_tree.save(&self.config.layout.merkle_tree(tag))?;
            if let Err(err) = write_last_sync(&self.config.layout, tag) {
                warn!("failed to write last_sync for {tag}: {err}");
            }
        }

        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_chunks(
        &self,
        tag: &Tag,
        plan: &RefreshPlan,
        progress: &mut ProgressEmitter,
        tracker: &mut WorkTracker,
        cancel: &CancellationToken,
        dedup: &mut ErrorDedup,
        stats: &mut RefreshStats,
    ) -> Result<()> {
        // Per-key outcome so a duplicate path is only acknowledged when the
        // first occurrence actually produced artifacts.
        let mut outcomes: HashMap<CacheKey, bool> = HashMap::new();
        for batch in plan.compute.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            let mut completed = Vec::with_capacity(batch.len());
            for item in batch {
                match outcomes.get(&item.cache_key) {
                    Some(true) => {
                        completed.push(item.clone());
                        continue;
                    }
                    Some(false) => continue,
                    None => {}
                }
                match self.chunk_file(item).await {
                    Ok(chunks) => {
                        let mut catalog = self.catalog.lock().await;
                        catalog.put_chunks(&chunks)?;
                        outcomes.insert(item.cache_key.clone(), true);
                        completed.push(item.clone());
                    }
                    Err(err) => {
                        outcomes.insert(item.cache_key.clone(), false);
                        dedup.warn(&format!(
                            "chunking failed for {} under {tag} ({}): {err}",
                            item.path.display(),
                            item.cache_key
                        ));
                    }
                }
            }
            stats.computed += completed.len();
            self.mark(&completed, tag, MarkKind::Compute).await?;
            tracker.done += batch.len() * 4;
            progress
                .emit(tracker.fraction(), "indexing chunks", RefreshStatus::Indexing)
                .await;
        }

        stats.added_tags += self
            .mark_batches(&plan.add_tag, tag, MarkKind::AddTag, "tagging chunks", progress, tracker, cancel)
            .await?;
        stats.removed_tags += self
            .mark_batches(
                &plan.remove_tag,
                tag,
                MarkKind::RemoveTag,
                "untagging chunks",
                progress,
                tracker,
                cancel,
            )
            .await?;

        for batch in plan.del.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            {
                let mut catalog = self.catalog.lock().await;
                for item in batch {
                    catalog.delete_chunks(&item.cache_key)?;
                }
            }
            stats.deleted += batch.len();
            self.mark(batch, tag, MarkKind::Del).await?;
            tracker.done += batch.len();
            progress
                .emit(tracker.fraction(), "deleting chunks", RefreshStatus::Indexing)
                .await;
        }

        self.mark(&plan.update_last_updated, tag, MarkKind::UpdateLastUpdated)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_embeddings(
        &self,
        tag: &Tag,
        plan: &RefreshPlan,
        progress: &mut ProgressEmitter,
        tracker: &mut WorkTracker,
        cancel: &CancellationToken,
        dedup: &mut ErrorDedup,
        stats: &mut RefreshStats,
    ) -> Result<()> {
        let identity = StoreIdentity {
            provider_id: self.provider.id().to_string(),
            model: self.provider.model().to_string(),
            dim: self.provider.dimension(),
        };
        let store_dir = self.config.layout.embeddings_dir(
            self.provider.id(),
            self.provider.model(),
            Some(self.config.max_chunk_size),
        );
        let mut store = VectorStore::open(store_dir, identity)?;

        let mut compute = plan.compute.clone();
        let mut add_tag = plan.add_tag.clone();

        // Remote artifact cache: hits skip the provider entirely and the
        // items downgrade from compute to addTag.
        if let Some(cache) = &self.remote_cache {
            let wanted: Vec<CacheKey> = compute
                .iter()
                .map(|item| item.cache_key.clone())
                .filter(|key| !store.contains(key))
                .collect();
            if !wanted.is_empty() {
                let hits = cache
                    .fetch_embeddings(self.provider.id(), self.provider.model(), &wanted)
                    .await;
                if !hits.is_empty() {
                    for (key, vectors) in &hits {
                        store.insert(key.clone(), vectors.clone())?;
                    }
                    store.save()?;
                    let (cached, rest): (Vec<_>, Vec<_>) = compute
                        .into_iter()
                        .partition(|item| hits.contains_key(&item.cache_key));
                    info!("remote cache satisfied {} of {} computes", cached.len(), cached.len() + rest.len());
                    add_tag.extend(cached);
                    compute = rest;
                }
            }
        }

        let batcher = Batcher::new(self.config.batcher.clone());
        let mut outcomes: HashMap<CacheKey, bool> = HashMap::new();
        for batch in compute.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            let mut completed = Vec::with_capacity(batch.len());
            for item in batch {
                match outcomes.get(&item.cache_key) {
                    Some(true) => {
                        completed.push(item.clone());
                        continue;
                    }
                    Some(false) => continue,
                    None => {}
                }
                if store.contains(&item.cache_key) {
                    outcomes.insert(item.cache_key.clone(), true);
                    completed.push(item.clone());
                    continue;
                }
                let chunks = match self.chunks_for_item(item).await {
                    Ok(chunks) => chunks,
                    Err(err) => {
                        outcomes.insert(item.cache_key.clone(), false);
                        dedup.warn(&format!(
                            "no chunks for {} under {tag} ({}): {err}",
                            item.path.display(),
                            item.cache_key
                        ));
                        continue;
                    }
                };
                if chunks.is_empty() {
                    outcomes.insert(item.cache_key.clone(), true);
                    completed.push(item.clone());
                    continue;
                }
                let texts: Vec<String> = chunks.into_iter().map(|c| c.content).collect();
                match batcher.embed_all(self.provider.clone(), texts).await {
                    Ok(vectors) => {
                        store.insert(item.cache_key.clone(), vectors)?;
                        outcomes.insert(item.cache_key.clone(), true);
                        completed.push(item.clone());
                    }
                    Err(err) => {
                        // Failed keys stay unmarked and retry next refresh.
                        outcomes.insert(item.cache_key.clone(), false);
                        dedup.warn(&format!(
                            "embedding failed for {} under {tag}: {err}",
                            item.path.display()
                        ));
                    }
                }
            }
            store.save()?;
            stats.computed += completed.len();
            self.mark(&completed, tag, MarkKind::Compute).await?;
            tracker.done += batch.len() * 4;
            progress
                .emit(tracker.fraction(), "embedding chunks", RefreshStatus::Indexing)
                .await;
        }

        stats.added_tags += self
            .mark_batches(&add_tag, tag, MarkKind::AddTag, "tagging embeddings", progress, tracker, cancel)
            .await?;
        stats.removed_tags += self
            .mark_batches(
                &plan.remove_tag,
                tag,
                MarkKind::RemoveTag,
                "untagging embeddings",
                progress,
                tracker,
                cancel,
            )
            .await?;

        for batch in plan.del.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            for item in batch {
                store.remove(&item.cache_key);
            }
            store.save()?;
            stats.deleted += batch.len();
            self.mark(batch, tag, MarkKind::Del).await?;
            tracker.done += batch.len();
            progress
                .emit(
                    tracker.fraction(),
                    "deleting embeddings",
                    RefreshStatus::Indexing,
                )
                .await;
        }

        self.mark(&plan.update_last_updated, tag, MarkKind::UpdateLastUpdated)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_lexical(
        &self,
        dir: &Path,
        branch: &str,
        tag: &Tag,
        plan: &RefreshPlan,
        progress: &mut ProgressEmitter,
        tracker: &mut WorkTracker,
        cancel: &CancellationToken,
        dedup: &mut ErrorDedup,
        stats: &mut RefreshStats,
    ) -> Result<()> {
        let lexical_dir = self.config.layout.lexical_dir(dir, branch);
        let mut index = LexicalIndex::load(&lexical_dir);

        let mut outcomes: HashMap<CacheKey, bool> = HashMap::new();
        for batch in plan.compute.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            let mut completed = Vec::with_capacity(batch.len());
            for item in batch {
                match outcomes.get(&item.cache_key) {
                    Some(true) => {
                        completed.push(item.clone());
                        continue;
                    }
                    Some(false) => continue,
                    None => {}
                }
                if index.contains(&item.cache_key) {
                    outcomes.insert(item.cache_key.clone(), true);
                    completed.push(item.clone());
                    continue;
                }
                match self.chunks_for_item(item).await {
                    Ok(chunks) => {
                        for chunk in &chunks {
                            index.add_document(item.cache_key.clone(), chunk.index, &chunk.content);
                        }
                        outcomes.insert(item.cache_key.clone(), true);
                        completed.push(item.clone());
                    }
                    Err(err) => {
                        outcomes.insert(item.cache_key.clone(), false);
                        dedup.warn(&format!(
                            "lexical indexing failed for {} under {tag}: {err}",
                            item.path.display()
                        ));
                    }
                }
            }
            index.save(&lexical_dir)?;
            stats.computed += completed.len();
            self.mark(&completed, tag, MarkKind::Compute).await?;
            tracker.done += batch.len() * 4;
            progress
                .emit(
                    tracker.fraction(),
                    "updating lexical index",
                    RefreshStatus::Indexing,
                )
                .await;
        }

        stats.added_tags += self
            .mark_batches(&plan.add_tag, tag, MarkKind::AddTag, "tagging lexical", progress, tracker, cancel)
            .await?;
        stats.removed_tags += self
            .mark_batches(
                &plan.remove_tag,
                tag,
                MarkKind::RemoveTag,
                "untagging lexical",
                progress,
                tracker,
                cancel,
            )
            .await?;

        for batch in plan.del.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            for item in batch {
                index.remove_document(&item.cache_key);
            }
            index.save(&lexical_dir)?;
            stats.deleted += batch.len();
            self.mark(batch, tag, MarkKind::Del).await?;
            tracker.done += batch.len();
            progress
                .emit(
                    tracker.fraction(),
                    "pruning lexical index",
                    RefreshStatus::Indexing,
                )
                .await;
        }

        self.mark(&plan.update_last_updated, tag, MarkKind::UpdateLastUpdated)
            .await
    }

    /// Chunks for an item: from the chunk sub-index when present, otherwise
    /// cut fresh from the file.
    async fn chunks_for_item(&self, item: &PathAndCacheKey) -> Result<Vec<Chunk>> {
        {
            let catalog = self.catalog.lock().await;
            let stored = catalog.chunks_for(&item.cache_key)?;
            if !stored.is_empty() {
                return Ok(stored);
            }
        }
        self.chunk_file(item).await
    }

    /// Read and chunk one file, verifying the contents still match the
    /// planned cache key.
    async fn chunk_file(&self, item: &PathAndCacheKey) -> Result<Vec<Chunk>> {
        let contents = tokio::fs::read(&item.path)
            .await
            .map_err(|e| IndexerError::Task(format!("read {}: {e}", item.path.display())))?;
        if contents.len() as u64 > self.config.walker.max_file_size {
            return Err(IndexerError::Task(format!(
                "{} grew past the size limit mid-refresh",
                item.path.display()
            )));
        }
        let fresh = CacheKey::from_contents(&contents);
        if fresh != item.cache_key {
            return Err(IndexerError::Task(format!(
                "{} changed since planning",
                item.path.display()
            )));
        }

        let path = item.path.to_string_lossy().into_owned();
        let digest = item.cache_key.clone();
        let max = self.config.max_chunk_size;
        let tokenizer = self.tokenizer.clone();
        let text = String::from_utf8_lossy(&contents).into_owned();
        let chunks = tokio::task::spawn_blocking(move || {
            chunk_document(&path, &text, max, &digest, tokenizer.as_ref())
        })
        .await
        .map_err(|e| IndexerError::Task(e.to_string()))??;
        Ok(chunks)
    }

    async fn mark(&self, items: &[PathAndCacheKey], tag: &Tag, kind: MarkKind) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut catalog = self.catalog.lock().await;
        catalog.mark_complete(items, tag, kind)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn mark_batches(
        &self,
        items: &[PathAndCacheKey],
        tag: &Tag,
        kind: MarkKind,
        label: &str,
        progress: &mut ProgressEmitter,
        tracker: &mut WorkTracker,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut marked = 0;
        for batch in items.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            self.mark(batch, tag, kind).await?;
            marked += batch.len();
            tracker.done += batch.len();
            progress
                .emit(tracker.fraction(), label, RefreshStatus::Indexing)
                .await;
        }
        Ok(marked)
    }
}

/// Maps completed work units into the `[base, 1.0)` progress band.
struct WorkTracker {
    done: usize,
    total: usize,
    base: f32,
}

impl WorkTracker {
    fn fraction(&self) -> f32 {
        let share = self.done.min(self.total) as f32 / self.total as f32;
        self.base + (1.0 - self.base) * share * 0.99
    }
}

fn read_guarded(path: &Path, max_file_size: u64) -> std::io::Result<Vec<u8>> {
    let meta = std::fs::metadata(path)?;
    if meta.len() > max_file_size {
        return Err(std::io::Error::other(format!(
            "{} exceeds the configured size limit",
            path.display()
        )));
    }
    std::fs::read(path)
}
