use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store at {path} could not be persisted: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("vector store encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    #[error("dimension mismatch: store is {expected}, vector is {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;
