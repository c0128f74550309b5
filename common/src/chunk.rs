use crate::tag::CacheKey;
use serde::{Deserialize, Serialize};

/// A bounded excerpt of one file, addressed by the digest of the file that
/// produced it. Chunk indices are 0-based and contiguous within a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Cache key of the file contents this chunk was cut from.
    pub digest: CacheKey,

    /// 0-based position of the chunk within its file.
    pub index: u32,

    /// Workspace-relative path of the source file.
    pub filepath: String,

    /// First line covered by the chunk (0-based).
    pub start_line: u32,

    /// Last line covered by the chunk (0-based, inclusive).
    pub end_line: u32,

    /// The excerpt itself.
    pub content: String,

    /// Chunker-specific extra, e.g. the enclosing markdown header.
    pub metadata: Option<String>,
}

impl Chunk {
    pub fn new(
        digest: CacheKey,
        index: u32,
        filepath: impl Into<String>,
        start_line: u32,
        end_line: u32,
        content: impl Into<String>,
    ) -> Self {
        Self {
            digest,
            index,
            filepath: filepath.into(),
            start_line,
            end_line,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}
