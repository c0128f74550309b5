use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use quarry_common::EmbeddingProviderOptions;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_BATCH: usize = 64;

/// One embedding backend. `embed` must be safe to call concurrently up to
/// `max_batch_size` in-flight requests and return one vector per input, all
/// with the same dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn id(&self) -> &str;

    fn model(&self) -> &str;

    /// The fixed dimension of every vector this provider+model emits.
    fn dimension(&self) -> usize;

    fn max_batch_size(&self) -> usize;

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

/// An OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    options: EmbeddingProviderOptions,
    api_base: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsDatum>,
}

#[derive(Deserialize)]
struct EmbeddingsDatum {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    pub fn new(options: EmbeddingProviderOptions) -> Result<Self> {
        let api_base = options
            .api_base
            .clone()
            .ok_or_else(|| ProviderError::Permanent("embedding provider needs an apiBase".into()))?;
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Permanent(e.to_string()))?;
        Ok(Self {
            client,
            options,
            api_base,
        })
    }

    pub fn with_timeout(options: EmbeddingProviderOptions, timeout: Duration) -> Result<Self> {
        let mut provider = Self::new(options)?;
        provider.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Permanent(e.to_string()))?;
        Ok(provider)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn id(&self) -> &str {
        &self.options.provider
    }

    fn model(&self) -> &str {
        &self.options.model
    }

    fn dimension(&self) -> usize {
        match self.options.model.as_str() {
            "text-embedding-3-large" => 3072,
            "nomic-embed-text" => 768,
            "all-minilm" => 384,
            _ => 1536,
        }
    }

    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();

        let url = format!("{}/embeddings", self.api_base.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&serde_json::json!({
            "model": self.options.model,
            "input": texts,
        }));
        if let Some(key) = &self.options.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::Transient(format!(
                "{url} answered {status}"
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::Permanent(format!(
                "{url} answered {status}"
            )));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Permanent(format!("malformed embeddings response: {e}")))?;
        if body.data.len() != expected {
            return Err(ProviderError::Permanent(format!(
                "provider returned {} embeddings for {} inputs",
                body.data.len(),
                expected
            )));
        }

        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() {
        ProviderError::Transient(err.to_string())
    } else {
        ProviderError::Permanent(err.to_string())
    }
}
