use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog open failed: {0}")]
    Open(rusqlite::Error),

    #[error("catalog read failed: {0}")]
    Read(rusqlite::Error),

    #[error("catalog write failed: {0}")]
    Write(rusqlite::Error),

    #[error("catalog directory could not be created: {0}")]
    CreateDir(std::io::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
