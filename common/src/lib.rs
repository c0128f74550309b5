//! Shared data model for the quarry index.
//!
//! Everything here is consumed by at least two other crates: the tag/cache-key
//! vocabulary of the catalog, the chunk record produced by the chunker and
//! stored by the sub-indexes, the IDE collaborator contract, and the on-disk
//! layout of the per-user index root.

mod chunk;
mod ide;
mod layout;
mod options;
mod tag;

pub use chunk::Chunk;
pub use ide::{Ide, Location, Position, Range};
pub use layout::IndexLayout;
pub use options::{
    EmbeddingProviderOptions, IndexOptions, OptionsError, RerankerOptions, RetrievalOptions,
};
pub use tag::{ArtifactKind, CacheKey, PathAndCacheKey, Tag};
