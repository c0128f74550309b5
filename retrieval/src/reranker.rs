use async_trait::async_trait;
use quarry_common::RerankerOptions;
use quarry_embeddings::ProviderError;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Scores `(query, candidate)` relevance in `[0, 1]`, one score per
/// candidate, order preserved.
#[async_trait]
pub trait RerankerProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<String>,
    ) -> Result<Vec<f32>, ProviderError>;
}

/// A hosted rerank endpoint (Cohere/Voyage-style JSON contract).
pub struct HttpReranker {
    client: reqwest::Client,
    options: RerankerOptions,
    base_url: String,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl HttpReranker {
    pub fn new(base_url: impl Into<String>, options: RerankerOptions) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Permanent(e.to_string()))?;
        Ok(Self {
            client,
            options,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RerankerProvider for HttpReranker {
    fn name(&self) -> &str {
        &self.options.name
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<String>,
    ) -> Result<Vec<f32>, ProviderError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let expected = candidates.len();
        let url = format!("{}/rerank", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&serde_json::json!({
            "model": self.options.model,
            "query": query,
            "documents": candidates,
        }));
        if let Some(key) = &self.options.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ProviderError::Transient(e.to_string())
            } else {
                ProviderError::Permanent(e.to_string())
            }
        })?;
        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::Transient(format!("{url} answered {status}")));
        }
        if !status.is_success() {
            return Err(ProviderError::Permanent(format!("{url} answered {status}")));
        }

        let body: RerankResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Permanent(format!("malformed rerank response: {e}")))?;
        if body.results.len() != expected {
            return Err(ProviderError::Permanent(format!(
                "reranker returned {} scores for {} candidates",
                body.results.len(),
                expected
            )));
        }

        // Results may arrive sorted by relevance; restore input order.
        let mut scores = vec![0.0f32; expected];
        for result in body.results {
            if result.index >= expected {
                return Err(ProviderError::Permanent(
                    "reranker returned an out-of-range index".into(),
                ));
            }
            scores[result.index] = result.relevance_score.clamp(0.0, 1.0);
        }
        Ok(scores)
    }
}
