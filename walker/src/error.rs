use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("workspace root {root} is missing or unreadable: {source}")]
    RootUnreadable {
        root: PathBuf,
        source: std::io::Error,
    },

    #[error("walk failed under {root}: {message}")]
    Walk { root: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, WalkError>;
