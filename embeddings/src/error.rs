use thiserror::Error;

/// Provider failures split by retryability: transient errors are retried
/// with backoff, permanent ones fail the batch.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Worth retrying: timeouts, connection resets, 5xx responses.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Not worth retrying: bad request, auth failure, contract violation.
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
