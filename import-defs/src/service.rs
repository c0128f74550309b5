use crate::error::Result;
use crate::imports::parse_imports;
use log::{debug, warn};
use lru::LruCache;
use quarry_chunker::Language;
use quarry_common::{Ide, Location, Position, Range};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const DEFAULT_CAPACITY: usize = 10;

/// One import of the active file, resolved as far as the IDE allowed.
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub symbol: String,
    /// Where the symbol appears in the importing file.
    pub location: Location,
    /// Where the IDE says it is defined, if resolution succeeded.
    pub definition: Option<Location>,
    /// The definition's source text, if it could be read.
    pub snippet: Option<String>,
}

/// Everything resolved for one file.
#[derive(Debug, Clone, Default)]
pub struct FileImports {
    pub imports: Vec<ResolvedImport>,
}

/// Resolves and caches import definitions for recently active files.
/// Eviction is strict LRU over file paths; capacity defaults to 10.
pub struct ImportDefinitionsService {
    ide: Arc<dyn Ide>,
    cache: Mutex<LruCache<PathBuf, Arc<FileImports>>>,
}

impl ImportDefinitionsService {
    pub fn new(ide: Arc<dyn Ide>) -> Self {
        Self::with_capacity(ide, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ide: Arc<dyn Ide>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ide,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached result only; does not compute.
    pub async fn get(&self, path: &Path) -> Option<Arc<FileImports>> {
        self.cache.lock().await.get(path).cloned()
    }

    /// Cached result, or resolve now and cache.
    pub async fn get_or_compute(&self, path: &Path) -> Result<Arc<FileImports>> {
        if let Some(hit) = self.get(path).await {
            return Ok(hit);
        }
        let computed = Arc::new(self.compute(path).await?);
        self.cache
            .lock()
            .await
            .put(path.to_path_buf(), computed.clone());
        Ok(computed)
    }

    /// Pre-warm the cache for a newly focused file. Errors are logged, not
    /// surfaced; the editor callback has nobody to hand them to.
    pub fn on_active_file_changed(self: &Arc<Self>, path: PathBuf) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(err) = service.get_or_compute(&path).await {
                warn!(
                    "import pre-warm failed for {}: {err}",
                    path.display()
                );
            }
        })
    }

    async fn compute(&self, path: &Path) -> Result<FileImports> {
        let Some(language) = Language::from_path(path) else {
            return Ok(FileImports::default());
        };
        let bytes = self.ide.read_file(path).await?;
        let source = String::from_utf8_lossy(&bytes).into_owned();

        let symbols = parse_imports(language, &source);
        debug!(
            "resolving {} imported symbols in {}",
            symbols.len(),
            path.display()
        );

        let mut imports = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let location = Location {
                path: path.to_path_buf(),
                range: Range {
                    start: Position {
                        line: symbol.line,
                        character: symbol.character,
                    },
                    end: Position {
                        line: symbol.line,
                        character: symbol.character + symbol.name.len() as u32,
                    },
                },
            };
            let definition = self.ide.goto_definition(&location).await.into_iter().next();
            let snippet = match &definition {
                Some(def) => self
                    .ide
                    .read_range_in_file(&def.path, def.range)
                    .await
                    .ok(),
                None => None,
            };
            imports.push(ResolvedImport {
                symbol: symbol.name,
                location,
                definition,
                snippet,
            });
        }
        Ok(FileImports { imports })
    }
}
