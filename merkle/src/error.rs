use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("failed to load merkle tree at {path}: {source}")]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to persist merkle tree at {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode merkle tree: {0}")]
    Encode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, MerkleError>;
