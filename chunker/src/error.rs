use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkerError {
    #[error("grammar failed to load: {0}")]
    Grammar(String),
}

pub type Result<T> = std::result::Result<T, ChunkerError>;
