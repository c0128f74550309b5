//! Embedding provider contracts and batching.
//!
//! Providers are external HTTP services described only by their interface:
//! stable dimension per provider+model pair, a declared max batch size, and
//! a transient/permanent error split. The [`Batcher`] owns everything above
//! a single `embed` call (batch splitting, bounded concurrency, retry with
//! exponential backoff on transient failures) so providers stay pure.

mod batcher;
mod error;
mod provider;

pub use batcher::{Batcher, BatcherConfig};
pub use error::{ProviderError, Result};
pub use provider::{EmbeddingProvider, HttpEmbeddingProvider};
