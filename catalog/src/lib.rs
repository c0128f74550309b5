//! The catalog: the single durable authority over what is indexed.
//!
//! One SQLite database (WAL mode) holds the per-tag catalog of
//! `(path, cacheKey, lastUpdated)` rows, the global `(cacheKey, tag)` cache
//! that makes artifact reuse across branches possible, and the chunk
//! sub-index. The planner turns a fresh walk into the minimal mutation set
//! (compute / addTag / removeTag / del) without writing anything; writes
//! happen only through [`CatalogStore::mark_complete`], one transaction per
//! call.

mod error;
mod plan;
mod store;

pub use error::{CatalogError, Result};
pub use plan::{MarkKind, RefreshPlan};
pub use store::CatalogStore;
