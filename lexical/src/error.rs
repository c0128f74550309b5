use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexicalError {
    #[error("lexical index at {path} could not be persisted: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("lexical index encoding failed: {0}")]
    Encode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, LexicalError>;
