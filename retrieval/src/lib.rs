//! The retrieval pipeline.
//!
//! A query fans out to the vector and lexical indexes in parallel, the
//! candidate sets are fused with a weighted score (cosine, BM25, recency),
//! deduplicated to one chunk per file, optionally reordered by a reranker
//! provider, and cut to the final count. Stage failures are isolated: the
//! pipeline degrades to whichever source still works and only fails when
//! both candidate sources are gone.

mod error;
mod fusion;
mod pipeline;
mod reranker;
mod result;

pub use error::{Result, RetrievalError};
pub use pipeline::{RetrievalPipeline, RetrievalRequest};
pub use reranker::{HttpReranker, RerankerProvider};
pub use result::{ContextItem, RetrievalStats};
