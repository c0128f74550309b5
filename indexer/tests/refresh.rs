use async_trait::async_trait;
use pretty_assertions::assert_eq;
use quarry_catalog::CatalogStore;
use quarry_common::{ArtifactKind, CacheKey, IndexLayout, Tag};
use quarry_embeddings::{EmbeddingProvider, ProviderError};
use quarry_indexer::{
    read_last_sync, ProgressUpdate, RefreshConfig, RefreshOrchestrator, RefreshStats, RefreshStatus,
};
use quarry_lexical::{tokenize, LexicalIndex};
use quarry_vector_store::{StoreIdentity, VectorStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

const DIM: usize = 8;

/// Deterministic offline provider: embeds text as a bag-of-bytes histogram.
struct HashProvider;

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn id(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "hash-8"
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn max_batch_size(&self) -> usize {
        16
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIM];
                for b in text.bytes() {
                    v[(b as usize) % DIM] += 1.0;
                }
                v
            })
            .collect())
    }
}

struct Fixture {
    _index_root: TempDir,
    workspace: TempDir,
    layout: IndexLayout,
    catalog: Arc<Mutex<CatalogStore>>,
    orchestrator: RefreshOrchestrator,
}

fn fixture() -> Fixture {
    let index_root = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let layout = IndexLayout::new(index_root.path());
    let catalog = Arc::new(Mutex::new(
        CatalogStore::open(&layout.catalog_db()).unwrap(),
    ));
    let orchestrator = RefreshOrchestrator::new(
        RefreshConfig::new(layout.clone()),
        catalog.clone(),
        Arc::new(HashProvider),
    );
    Fixture {
        _index_root: index_root,
        workspace,
        layout,
        catalog,
        orchestrator,
    }
}

async fn run_refresh(fixture: &Fixture, branch: &str) -> (RefreshStats, Vec<ProgressUpdate>) {
    let (tx, mut rx) = mpsc::channel(256);
    let stats = fixture
        .orchestrator
        .refresh(
            fixture.workspace.path(),
            branch,
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    (stats, updates)
}

fn write(workspace: &Path, rel: &str, contents: &str) {
    fs::write(workspace.join(rel), contents).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_workspace_completes_with_no_mutations() {
    let fixture = fixture();
    let (stats, updates) = run_refresh(&fixture, "main").await;

    assert_eq!(stats.computed, 0);
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.added_tags, 0);
    assert_eq!(stats.removed_tags, 0);

    let last = updates.last().expect("terminal update");
    assert_eq!(last.status, RefreshStatus::Done);
    assert_eq!(last.progress, 1.0);

    // Progress never decreases along the stream.
    for pair in updates.windows(2) {
        assert!(pair[1].progress >= pair[0].progress);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn single_file_add_populates_every_sub_index() {
    let fixture = fixture();
    write(fixture.workspace.path(), "a.txt", "hello\nworld\n");

    let (stats, updates) = run_refresh(&fixture, "main").await;

    assert_eq!(stats.files_walked, 1);
    // One compute per sub-index: chunks, embeddings, lexical.
    assert_eq!(stats.computed, 3);
    assert_eq!(updates.last().unwrap().status, RefreshStatus::Done);

    let digest = CacheKey::from_contents(b"hello\nworld\n");

    // Chunk sub-index.
    let catalog = fixture.catalog.lock().await;
    let chunks = catalog.chunks_for(&digest).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "hello\nworld");
    drop(catalog);

    // Embedding sub-index.
    let store = VectorStore::open(
        fixture.layout.embeddings_dir("fake", "hash-8", Some(512)),
        StoreIdentity {
            provider_id: "fake".into(),
            model: "hash-8".into(),
            dim: DIM,
        },
    )
    .unwrap();
    assert!(store.contains(&digest));

    // Lexical sub-index: one posting for each of hello and world.
    let lexical = LexicalIndex::load(
        &fixture
            .layout
            .lexical_dir(fixture.workspace.path(), "main"),
    );
    for term in ["hello", "world"] {
        let hits = lexical.search(&tokenize(term), 10, &|_| true);
        assert_eq!(hits.len(), 1, "expected one posting for {term}");
        assert_eq!(hits[0].cache_key, digest);
    }

    // last_sync was stamped for each sub-index tag.
    for artifact in ArtifactKind::sub_indexes() {
        let tag = Tag::new(fixture.workspace.path(), "main", artifact);
        assert!(read_last_sync(&fixture.layout, &tag).is_some());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn second_refresh_without_changes_is_a_noop() {
    let fixture = fixture();
    write(fixture.workspace.path(), "a.txt", "hello\nworld\n");

    run_refresh(&fixture, "main").await;
    let (stats, updates) = run_refresh(&fixture, "main").await;

    assert_eq!(stats.computed, 0);
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.added_tags, 0);
    assert_eq!(stats.removed_tags, 0);
    assert_eq!(updates.last().unwrap().status, RefreshStatus::Done);
}

#[tokio::test(flavor = "multi_thread")]
async fn rename_becomes_remove_tag_plus_add_tag() {
    let fixture = fixture();
    write(fixture.workspace.path(), "a.txt", "stable contents\n");
    run_refresh(&fixture, "main").await;

    fs::rename(
        fixture.workspace.path().join("a.txt"),
        fixture.workspace.path().join("b.txt"),
    )
    .unwrap();
    let (stats, _) = run_refresh(&fixture, "main").await;

    // One addTag and one removeTag per sub-index; nothing recomputed or
    // destroyed.
    assert_eq!(stats.computed, 0);
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.added_tags, 3);
    assert_eq!(stats.removed_tags, 3);

    // Artifacts survived the rename.
    let digest = CacheKey::from_contents(b"stable contents\n");
    let catalog = fixture.catalog.lock().await;
    assert!(catalog.has_chunks(&digest).unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn branch_switch_reuses_shared_content() {
    let fixture = fixture();
    write(fixture.workspace.path(), "a.txt", "x");
    run_refresh(&fixture, "b1").await;

    write(fixture.workspace.path(), "c.txt", "y");
    let (stats, _) = run_refresh(&fixture, "b2").await;

    // a.txt is shared content: tagged, not recomputed. c.txt is new.
    assert_eq!(stats.added_tags, 3);
    assert_eq!(stats.computed, 3);

    let shared = CacheKey::from_contents(b"x");
    let catalog = fixture.catalog.lock().await;
    for branch in ["b1", "b2"] {
        let tag = Tag::new(fixture.workspace.path(), branch, ArtifactKind::Chunks);
        let keys = catalog.cache_keys_for_tags(&[tag]).unwrap();
        assert!(keys.contains(&shared), "branch {branch} should tag the shared key");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn modified_file_is_recomputed_and_old_artifacts_deleted() {
    let fixture = fixture();
    write(fixture.workspace.path(), "a.txt", "version one\n");
    run_refresh(&fixture, "main").await;

    // Ensure a strictly newer mtime.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    write(fixture.workspace.path(), "a.txt", "version two\n");
    let (stats, _) = run_refresh(&fixture, "main").await;

    assert_eq!(stats.computed, 3);
    assert_eq!(stats.deleted, 3);

    let catalog = fixture.catalog.lock().await;
    assert!(catalog
        .has_chunks(&CacheKey::from_contents(b"version two\n"))
        .unwrap());
    assert!(!catalog
        .has_chunks(&CacheKey::from_contents(b"version one\n"))
        .unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_refresh_reports_failed() {
    let fixture = fixture();
    write(fixture.workspace.path(), "a.txt", "contents\n");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (tx, mut rx) = mpsc::channel(64);
    let result = fixture
        .orchestrator
        .refresh(fixture.workspace.path(), "main", tx, cancel)
        .await;

    assert!(result.is_err());
    let mut last = None;
    while let Ok(update) = rx.try_recv() {
        last = Some(update);
    }
    assert_eq!(last.unwrap().status, RefreshStatus::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_file_artifacts_are_destroyed() {
    let fixture = fixture();
    write(fixture.workspace.path(), "a.txt", "doomed\n");
    run_refresh(&fixture, "main").await;

    fs::remove_file(fixture.workspace.path().join("a.txt")).unwrap();
    let (stats, _) = run_refresh(&fixture, "main").await;

    assert_eq!(stats.deleted, 3);
    let digest = CacheKey::from_contents(b"doomed\n");
    let catalog = fixture.catalog.lock().await;
    assert!(!catalog.has_chunks(&digest).unwrap());
    drop(catalog);

    let lexical = LexicalIndex::load(
        &fixture
            .layout
            .lexical_dir(fixture.workspace.path(), "main"),
    );
    assert!(!lexical.contains(&digest));
}
