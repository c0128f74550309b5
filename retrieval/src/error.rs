use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Both the vector and lexical paths failed; nothing to rank.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error(transparent)]
    Catalog(#[from] quarry_catalog::CatalogError),

    #[error("invalid retrieval options: {0}")]
    Options(#[from] quarry_common::OptionsError),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
