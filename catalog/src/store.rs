use crate::error::{CatalogError, Result};
use crate::plan::{MarkKind, RefreshPlan};
use log::warn;
use quarry_common::{ArtifactKind, CacheKey, Chunk, PathAndCacheKey, Tag};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Durable, transactional store of the tag catalog, the global cache, and
/// the chunk sub-index. One instance per process; all components receive it
/// by handle.
pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    /// Open (or create) the catalog database at `path` in WAL mode.
    /// Duplicate rows left behind by earlier corrupt states are purged
    /// before the unique indexes are (re)created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(CatalogError::CreateDir)?;
        }
        let conn = Connection::open(path).map_err(CatalogError::Open)?;
        Self::initialize(conn)
    }

    /// An in-memory catalog, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(CatalogError::Open)?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(CatalogError::Open)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(CatalogError::Open)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tag_catalog (
                 dir          TEXT NOT NULL,
                 branch       TEXT NOT NULL,
                 artifact_id  TEXT NOT NULL,
                 path         TEXT NOT NULL,
                 cache_key    TEXT NOT NULL,
                 last_updated INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS global_cache (
                 cache_key    TEXT NOT NULL,
                 dir          TEXT NOT NULL,
                 branch       TEXT NOT NULL,
                 artifact_id  TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS chunks (
                 cache_key  TEXT NOT NULL,
                 idx        INTEGER NOT NULL,
                 path       TEXT NOT NULL,
                 start_line INTEGER NOT NULL,
                 end_line   INTEGER NOT NULL,
                 content    TEXT NOT NULL,
                 metadata   TEXT
             );
             DELETE FROM tag_catalog WHERE rowid NOT IN (
                 SELECT MIN(rowid) FROM tag_catalog
                 GROUP BY dir, branch, artifact_id, path, cache_key
             );
             DELETE FROM global_cache WHERE rowid NOT IN (
                 SELECT MIN(rowid) FROM global_cache
                 GROUP BY cache_key, dir, branch, artifact_id
             );
             DELETE FROM chunks WHERE rowid NOT IN (
                 SELECT MIN(rowid) FROM chunks GROUP BY cache_key, idx
             );
             CREATE UNIQUE INDEX IF NOT EXISTS idx_tag_catalog_unique
                 ON tag_catalog (dir, branch, artifact_id, path, cache_key);
             CREATE UNIQUE INDEX IF NOT EXISTS idx_global_cache_unique
                 ON global_cache (cache_key, dir, branch, artifact_id);
             CREATE INDEX IF NOT EXISTS idx_global_cache_key
                 ON global_cache (cache_key, artifact_id);
             CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_unique
                 ON chunks (cache_key, idx);",
        )
        .map_err(CatalogError::Open)?;

        Ok(Self { conn })
    }

    /// Build the mutation plan for one tag against the current walk result.
    /// Never mutates state; repeated invocation without an intervening
    /// `mark_complete` yields identical output.
    pub fn plan(
        &self,
        tag: &Tag,
        current_files: &HashMap<PathBuf, u64>,
        read_file: &mut dyn FnMut(&Path) -> std::io::Result<Vec<u8>>,
    ) -> Result<RefreshPlan> {
        let saved = self.entries_for_tag(tag)?;

        let mut removed: Vec<PathAndCacheKey> = Vec::new();
        let mut update_new: Vec<PathAndCacheKey> = Vec::new();
        let mut update_old: Vec<PathAndCacheKey> = Vec::new();
        let mut update_last_updated: Vec<PathAndCacheKey> = Vec::new();

        let mut saved_paths: HashSet<&PathBuf> = HashSet::new();
        for (path, saved_key, last_updated) in &saved {
            saved_paths.insert(path);
            let Some(&mtime) = current_files.get(path) else {
                removed.push(PathAndCacheKey::new(path.clone(), saved_key.clone()));
                continue;
            };
            // Equal timestamps count as unchanged; only a strictly newer
            // mtime triggers a re-hash.
            if (*last_updated as u64) >= mtime {
                continue;
            }
            match read_file(path) {
                Ok(contents) => {
                    let fresh = CacheKey::from_contents(&contents);
                    if fresh != *saved_key {
                        update_new.push(PathAndCacheKey::new(path.clone(), fresh));
                        update_old.push(PathAndCacheKey::new(path.clone(), saved_key.clone()));
                    } else {
                        update_last_updated
                            .push(PathAndCacheKey::new(path.clone(), saved_key.clone()));
                    }
                }
                Err(err) => {
                    warn!(
                        "plan: {} vanished while re-hashing ({err}); treating as removed",
                        path.display()
                    );
                    removed.push(PathAndCacheKey::new(path.clone(), saved_key.clone()));
                }
            }
        }

        let mut added: Vec<PathAndCacheKey> = Vec::new();
        let mut new_paths: Vec<&PathBuf> = current_files
            .keys()
            .filter(|p| !saved_paths.contains(*p))
            .collect();
        new_paths.sort();
        for path in new_paths {
            match read_file(path) {
                Ok(contents) => {
                    added.push(PathAndCacheKey::new(
                        path.clone(),
                        CacheKey::from_contents(&contents),
                    ));
                }
                Err(err) => {
                    warn!("plan: skipping unreadable file {}: {err}", path.display());
                }
            }
        }

        let mut plan = RefreshPlan {
            update_last_updated,
            ..Default::default()
        };

        let mut planned_keys: HashSet<CacheKey> = HashSet::new();
        for item in added.into_iter().chain(update_new) {
            // A key staged for compute earlier in this same plan already
            // covers the artifact work; later occurrences only need the tag.
            if planned_keys.contains(&item.cache_key)
                || self.global_cache_contains(&item.cache_key, tag.artifact)?
            {
                planned_keys.insert(item.cache_key.clone());
                plan.add_tag.push(item);
            } else {
                planned_keys.insert(item.cache_key.clone());
                plan.compute.push(item);
            }
        }

        for item in removed.into_iter().chain(update_old) {
            // Artifacts survive while any reference remains: another catalog
            // row (any tag, any path) or an addition staged in this plan.
            // A rename therefore becomes removeTag + addTag, never a delete.
            if planned_keys.contains(&item.cache_key)
                || self.referenced_elsewhere(&item.cache_key, tag, &item.path)?
            {
                plan.remove_tag.push(item);
            } else {
                plan.del.push(item);
            }
        }

        Ok(plan)
    }

    /// Record that a sub-indexer durably applied `kind` for `items`. Updates
    /// the tag catalog and the global cache in one transaction; repeating a
    /// call with the same arguments is a no-op.
    pub fn mark_complete(
        &mut self,
        items: &[PathAndCacheKey],
        tag: &Tag,
        kind: MarkKind,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let now = now_millis();
        let tx = self.conn.transaction().map_err(CatalogError::Write)?;
        {
            match kind {
                MarkKind::Compute | MarkKind::AddTag => {
                    let mut insert_catalog = tx
                        .prepare_cached(
                            "INSERT OR IGNORE INTO tag_catalog
                             (dir, branch, artifact_id, path, cache_key, last_updated)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        )
                        .map_err(CatalogError::Write)?;
                    let mut insert_global = tx
                        .prepare_cached(
                            "INSERT OR IGNORE INTO global_cache
                             (cache_key, dir, branch, artifact_id)
                             VALUES (?1, ?2, ?3, ?4)",
                        )
                        .map_err(CatalogError::Write)?;
                    for item in items {
                        insert_catalog
                            .execute(params![
                                tag.dir.to_string_lossy(),
                                tag.branch,
                                tag.artifact.as_str(),
                                item.path.to_string_lossy(),
                                item.cache_key.as_str(),
                                now,
                            ])
                            .map_err(CatalogError::Write)?;
                        insert_global
                            .execute(params![
                                item.cache_key.as_str(),
                                tag.dir.to_string_lossy(),
                                tag.branch,
                                tag.artifact.as_str(),
                            ])
                            .map_err(CatalogError::Write)?;
                    }
                }
                MarkKind::RemoveTag | MarkKind::Del => {
                    let mut delete_catalog = tx
                        .prepare_cached(
                            "DELETE FROM tag_catalog
                             WHERE dir = ?1 AND branch = ?2 AND artifact_id = ?3
                               AND path = ?4 AND cache_key = ?5",
                        )
                        .map_err(CatalogError::Write)?;
                    // The global-cache row survives while any path under the
                    // same tag still holds the key.
                    let mut delete_global = tx
                        .prepare_cached(
                            "DELETE FROM global_cache
                             WHERE cache_key = ?1 AND dir = ?2 AND branch = ?3
                               AND artifact_id = ?4
                               AND NOT EXISTS (
                                   SELECT 1 FROM tag_catalog
                                   WHERE cache_key = ?1 AND dir = ?2
                                     AND branch = ?3 AND artifact_id = ?4
                               )",
                        )
                        .map_err(CatalogError::Write)?;
                    for item in items {
                        delete_catalog
                            .execute(params![
                                tag.dir.to_string_lossy(),
                                tag.branch,
                                tag.artifact.as_str(),
                                item.path.to_string_lossy(),
                                item.cache_key.as_str(),
                            ])
                            .map_err(CatalogError::Write)?;
                        delete_global
                            .execute(params![
                                item.cache_key.as_str(),
                                tag.dir.to_string_lossy(),
                                tag.branch,
                                tag.artifact.as_str(),
                            ])
                            .map_err(CatalogError::Write)?;
                    }
                }
                MarkKind::UpdateLastUpdated => {
                    let mut update = tx
                        .prepare_cached(
                            "UPDATE tag_catalog SET last_updated = ?1
                             WHERE dir = ?2 AND branch = ?3 AND artifact_id = ?4
                               AND path = ?5 AND cache_key = ?6",
                        )
                        .map_err(CatalogError::Write)?;
                    for item in items {
                        update
                            .execute(params![
                                now,
                                tag.dir.to_string_lossy(),
                                tag.branch,
                                tag.artifact.as_str(),
                                item.path.to_string_lossy(),
                                item.cache_key.as_str(),
                            ])
                            .map_err(CatalogError::Write)?;
                    }
                }
            }
        }
        tx.commit().map_err(CatalogError::Write)
    }

    /// All `(path, cacheKey, lastUpdated)` rows currently saved under `tag`.
    pub fn entries_for_tag(&self, tag: &Tag) -> Result<Vec<(PathBuf, CacheKey, i64)>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT path, cache_key, last_updated FROM tag_catalog
                 WHERE dir = ?1 AND branch = ?2 AND artifact_id = ?3
                 ORDER BY path",
            )
            .map_err(CatalogError::Read)?;
        let rows = stmt
            .query_map(
                params![tag.dir.to_string_lossy(), tag.branch, tag.artifact.as_str()],
                |row| {
                    Ok((
                        PathBuf::from(row.get::<_, String>(0)?),
                        CacheKey::from_hex(row.get::<_, String>(1)?),
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .map_err(CatalogError::Read)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CatalogError::Read)?;
        Ok(rows)
    }

    /// The cache keys currently tagged by any of `tags`; used by the search
    /// paths to exclude artifacts whose tags were removed but whose vectors
    /// are still on disk.
    pub fn cache_keys_for_tags(&self, tags: &[Tag]) -> Result<HashSet<CacheKey>> {
        let mut keys = HashSet::new();
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT cache_key FROM global_cache
                 WHERE dir = ?1 AND branch = ?2 AND artifact_id = ?3",
            )
            .map_err(CatalogError::Read)?;
        for tag in tags {
            let rows = stmt
                .query_map(
                    params![tag.dir.to_string_lossy(), tag.branch, tag.artifact.as_str()],
                    |row| row.get::<_, String>(0),
                )
                .map_err(CatalogError::Read)?;
            for key in rows {
                keys.insert(CacheKey::from_hex(key.map_err(CatalogError::Read)?));
            }
        }
        Ok(keys)
    }

    fn global_cache_contains(&self, key: &CacheKey, artifact: ArtifactKind) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM global_cache WHERE cache_key = ?1 AND artifact_id = ?2 LIMIT 1",
                params![key.as_str(), artifact.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
            .map_err(CatalogError::Read)
    }

    /// True when any tag-catalog row other than `(tag, path)` still holds
    /// this cache key under the same artifact kind.
    fn referenced_elsewhere(&self, key: &CacheKey, tag: &Tag, path: &Path) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM tag_catalog
                 WHERE cache_key = ?1 AND artifact_id = ?2
                   AND NOT (dir = ?3 AND branch = ?4 AND path = ?5)
                 LIMIT 1",
                params![
                    key.as_str(),
                    tag.artifact.as_str(),
                    tag.dir.to_string_lossy(),
                    tag.branch,
                    path.to_string_lossy(),
                ],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
            .map_err(CatalogError::Read)
    }

    // ---- chunk sub-index -------------------------------------------------

    /// Store the chunks for one digest. Existing rows under the same digest
    /// are replaced so a retried compute stays contiguous from index 0.
    pub fn put_chunks(&mut self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction().map_err(CatalogError::Write)?;
        {
            let mut delete = tx
                .prepare_cached("DELETE FROM chunks WHERE cache_key = ?1")
                .map_err(CatalogError::Write)?;
            let mut seen: HashSet<&CacheKey> = HashSet::new();
            for chunk in chunks {
                if seen.insert(&chunk.digest) {
                    delete
                        .execute(params![chunk.digest.as_str()])
                        .map_err(CatalogError::Write)?;
                }
            }
            let mut insert = tx
                .prepare_cached(
                    "INSERT INTO chunks
                     (cache_key, idx, path, start_line, end_line, content, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(CatalogError::Write)?;
            for chunk in chunks {
                insert
                    .execute(params![
                        chunk.digest.as_str(),
                        chunk.index,
                        chunk.filepath,
                        chunk.start_line,
                        chunk.end_line,
                        chunk.content,
                        chunk.metadata,
                    ])
                    .map_err(CatalogError::Write)?;
            }
        }
        tx.commit().map_err(CatalogError::Write)
    }

    pub fn delete_chunks(&mut self, key: &CacheKey) -> Result<()> {
        self.conn
            .execute("DELETE FROM chunks WHERE cache_key = ?1", params![key.as_str()])
            .map(|_| ())
            .map_err(CatalogError::Write)
    }

    /// Chunks for one digest, ordered by index.
    pub fn chunks_for(&self, key: &CacheKey) -> Result<Vec<Chunk>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT cache_key, idx, path, start_line, end_line, content, metadata
                 FROM chunks WHERE cache_key = ?1 ORDER BY idx",
            )
            .map_err(CatalogError::Read)?;
        let rows = stmt
            .query_map(params![key.as_str()], |row| {
                Ok(Chunk {
                    digest: CacheKey::from_hex(row.get::<_, String>(0)?),
                    index: row.get(1)?,
                    filepath: row.get(2)?,
                    start_line: row.get(3)?,
                    end_line: row.get(4)?,
                    content: row.get(5)?,
                    metadata: row.get(6)?,
                })
            })
            .map_err(CatalogError::Read)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CatalogError::Read)?;
        Ok(rows)
    }

    /// True when any chunk rows exist for this digest.
    pub fn has_chunks(&self, key: &CacheKey) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM chunks WHERE cache_key = ?1 LIMIT 1",
                params![key.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
            .map_err(CatalogError::Read)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
