use crate::error::{ProviderError, Result};
use crate::provider::EmbeddingProvider;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Batching policy, independent of any one provider.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// In-flight batches per provider.
    pub max_parallel: usize,

    /// Retries for a transient failure before the batch is failed.
    pub max_retries: u32,

    /// First backoff delay; doubles per attempt.
    pub base_backoff: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            max_retries: 3,
            base_backoff: Duration::from_millis(250),
        }
    }
}

/// Splits work to the provider's declared batch size, runs batches under a
/// concurrency cap, and retries transient failures. Composition keeps the
/// provider itself a pure `embed` call.
pub struct Batcher {
    config: BatcherConfig,
}

impl Batcher {
    pub fn new(config: BatcherConfig) -> Self {
        Self { config }
    }

    /// Embed all texts, preserving input order. Fails on the first batch
    /// that exhausts its retries or hits a permanent error.
    pub async fn embed_all(
        &self,
        provider: Arc<dyn EmbeddingProvider>,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batch_size = provider.max_batch_size().max(1);
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));

        let batches: Vec<Vec<String>> = texts
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        debug!(
            "embedding {} texts as {} batches via {}/{}",
            texts.len(),
            batches.len(),
            provider.id(),
            provider.model()
        );

        let mut tasks = Vec::with_capacity(batches.len());
        for batch in batches {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ProviderError::Permanent(format!("semaphore closed: {e}")))?;
            let provider = provider.clone();
            let retries = self.config.max_retries;
            let base = self.config.base_backoff;
            tasks.push(tokio::spawn(async move {
                let result = embed_with_retry(provider, batch, retries, base).await;
                drop(permit);
                result
            }));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for task in tasks {
            let batch_vectors = task
                .await
                .map_err(|e| ProviderError::Permanent(format!("embed task panicked: {e}")))??;
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }
}

async fn embed_with_retry(
    provider: Arc<dyn EmbeddingProvider>,
    batch: Vec<String>,
    max_retries: u32,
    base_backoff: Duration,
) -> Result<Vec<Vec<f32>>> {
    let mut attempt = 0u32;
    loop {
        match provider.embed(batch.clone()).await {
            Ok(vectors) => return Ok(vectors),
            Err(err) if err.is_transient() && attempt < max_retries => {
                let delay = base_backoff * 2u32.saturating_pow(attempt);
                warn!(
                    "transient embedding failure (attempt {}): {err}; retrying in {delay:?}",
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds each text as a single-element vector of its length; fails the
    /// first `failures` calls transiently.
    struct FlakyProvider {
        calls: AtomicUsize,
        failures: usize,
        batch_size: usize,
        permanent: bool,
    }

    impl FlakyProvider {
        fn new(failures: usize, batch_size: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                batch_size,
                permanent: false,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn id(&self) -> &str {
            "fake"
        }

        fn model(&self) -> &str {
            "fake-model"
        }

        fn dimension(&self) -> usize {
            1
        }

        fn max_batch_size(&self) -> usize {
            self.batch_size
        }

        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.permanent {
                    return Err(ProviderError::Permanent("broken".into()));
                }
                return Err(ProviderError::Transient("hiccup".into()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    fn config() -> BatcherConfig {
        BatcherConfig {
            max_parallel: 2,
            max_retries: 3,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn preserves_input_order_across_batches() {
        let provider = Arc::new(FlakyProvider::new(0, 2));
        let texts: Vec<String> = (0..7).map(|i| "x".repeat(i + 1)).collect();

        let vectors = Batcher::new(config())
            .embed_all(provider, texts.clone())
            .await
            .unwrap();

        assert_eq!(vectors.len(), 7);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], (i + 1) as f32);
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let provider = Arc::new(FlakyProvider::new(2, 16));
        let vectors = Batcher::new(config())
            .embed_all(provider.clone(), vec!["abc".into()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![3.0]]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            failures: 1,
            batch_size: 16,
            permanent: true,
        });

        let err = Batcher::new(config())
            .embed_all(provider.clone(), vec!["abc".into()])
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_exhaust_retries() {
        let provider = Arc::new(FlakyProvider::new(usize::MAX, 16));
        let err = Batcher::new(config())
            .embed_all(provider.clone(), vec!["abc".into()])
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn empty_input_is_empty_output() {
        let provider = Arc::new(FlakyProvider::new(0, 16));
        let vectors = Batcher::new(config())
            .embed_all(provider, Vec::new())
            .await
            .unwrap();
        assert!(vectors.is_empty());
    }
}
