use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    /// Fatal to the refresh: the workspace root could not be enumerated.
    #[error(transparent)]
    Walk(#[from] quarry_walker::WalkError),

    #[error(transparent)]
    Merkle(#[from] quarry_merkle::MerkleError),

    #[error(transparent)]
    Catalog(#[from] quarry_catalog::CatalogError),

    #[error(transparent)]
    Chunker(#[from] quarry_chunker::ChunkerError),

    #[error(transparent)]
    Provider(#[from] quarry_embeddings::ProviderError),

    #[error(transparent)]
    VectorStore(#[from] quarry_vector_store::VectorStoreError),

    #[error(transparent)]
    Lexical(#[from] quarry_lexical::LexicalError),

    #[error("refresh cancelled")]
    Cancelled,

    #[error("task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, IndexerError>;
