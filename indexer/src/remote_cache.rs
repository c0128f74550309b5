use log::{debug, warn};
use quarry_common::CacheKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Read-only client for a remote artifact cache keyed by
/// `(providerId, model, cacheKey)`. Strictly best-effort: any failure is a
/// miss, never an error; the refresh falls back to computing embeddings.
pub struct RemoteArtifactCache {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CacheResponse {
    hits: Vec<CacheHit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheHit {
    cache_key: String,
    vectors: Vec<Vec<f32>>,
}

impl RemoteArtifactCache {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Look up embedding artifacts for a batch of cache keys. Returns the
    /// hits; missing keys simply do not appear.
    pub async fn fetch_embeddings(
        &self,
        provider_id: &str,
        model: &str,
        keys: &[CacheKey],
    ) -> HashMap<CacheKey, Vec<Vec<f32>>> {
        if keys.is_empty() {
            return HashMap::new();
        }
        let url = format!(
            "{}/embeddings/lookup",
            self.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "providerId": provider_id,
            "model": model,
            "cacheKeys": keys.iter().map(CacheKey::as_str).collect::<Vec<_>>(),
        });

        let response = match self.client.post(&url).json(&body).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("remote artifact cache unreachable: {err}");
                return HashMap::new();
            }
        };
        if !response.status().is_success() {
            warn!("remote artifact cache answered {}", response.status());
            return HashMap::new();
        }
        let parsed: CacheResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("remote artifact cache sent malformed body: {err}");
                return HashMap::new();
            }
        };

        debug!(
            "remote artifact cache: {} hits for {} keys",
            parsed.hits.len(),
            keys.len()
        );
        parsed
            .hits
            .into_iter()
            .map(|hit| (CacheKey::from_hex(hit.cache_key), hit.vectors))
            .collect()
    }
}
