//! The refresh orchestrator.
//!
//! Drives walk → merkle → plan → sub-index dispatch → `mark_complete` as a
//! streaming sequence of progress updates, under a per-workspace lease.
//! Sub-indexes update in the fixed order chunks, embeddings, lexical;
//! within each, compute precedes addTag precedes removeTag precedes del.
//! Partial progress is durable: a cancelled or failed refresh resumes from
//! the catalog state on the next run.

mod error;
mod last_sync;
mod lease;
mod log_dedup;
mod orchestrator;
mod progress;
mod remote_cache;

pub use error::{IndexerError, Result};
pub use last_sync::{read_last_sync, write_last_sync};
pub use orchestrator::{RefreshConfig, RefreshOrchestrator, RefreshStats};
pub use progress::{ProgressUpdate, RefreshStatus};
pub use remote_cache::RemoteArtifactCache;
