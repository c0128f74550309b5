use crate::tag::{ArtifactKind, Tag};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A position inside a document, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Self {
        Self {
            start: Position {
                line: start_line,
                character: start_char,
            },
            end: Position {
                line: end_line,
                character: end_char,
            },
        }
    }
}

/// A range inside one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub range: Range,
}

/// What the host editor/filesystem provides to the index. Implementations
/// live outside the core; tests use in-process fakes.
#[async_trait]
pub trait Ide: Send + Sync {
    async fn read_file(&self, path: &std::path::Path) -> std::io::Result<Vec<u8>>;

    async fn read_range_in_file(
        &self,
        path: &std::path::Path,
        range: Range,
    ) -> std::io::Result<String>;

    async fn workspace_dirs(&self) -> Vec<PathBuf>;

    /// The index partitions the host currently cares about for one
    /// artifact kind, typically one per open workspace directory.
    async fn tags(&self, artifact: ArtifactKind) -> Vec<Tag>;

    /// Resolve the definition(s) of the symbol at `location`.
    async fn goto_definition(&self, location: &Location) -> Vec<Location>;

    /// The file currently focused in the editor, if any.
    async fn current_file(&self) -> Option<PathBuf>;

    /// Register for active-editor changes; the host calls `callback` with
    /// the newly focused file.
    fn on_active_text_editor_changed(&self, callback: Box<dyn Fn(PathBuf) + Send + Sync>);
}
