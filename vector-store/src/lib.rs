//! Per-provider vector storage and similarity search.
//!
//! One store per `(providerId, model, dim)` identity; vectors from different
//! providers or dimensions never share files. Vectors are L2-normalized on
//! insert, so cosine similarity is a plain dot product at query time. Search
//! is exhaustive over the store and filtered through a caller-supplied
//! predicate that joins against the catalog's current tag set, so vectors
//! left on disk for removed tags are excluded at that seam.

mod error;
mod store;

pub use error::{Result, VectorStoreError};
pub use store::{ScoredVector, StoreIdentity, VectorStore};
