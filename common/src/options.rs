use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        source: globset::Error,
    },

    #[error("invalid option: {0}")]
    Invalid(String),
}

/// Knobs for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOptions {
    /// Candidate count fetched from each source before fusion.
    #[serde(default = "default_n_retrieve")]
    pub n_retrieve: usize,

    /// Final ranked context item count.
    #[serde(default = "default_n_final")]
    pub n_final: usize,

    #[serde(default = "default_true")]
    pub use_reranking: bool,
}

fn default_n_retrieve() -> usize {
    25
}

fn default_n_final() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            n_retrieve: default_n_retrieve(),
            n_final: default_n_final(),
            use_reranking: true,
        }
    }
}

impl RetrievalOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.n_retrieve == 0 {
            return Err(OptionsError::Invalid("n_retrieve must be > 0".into()));
        }
        if self.n_final == 0 {
            return Err(OptionsError::Invalid("n_final must be > 0".into()));
        }
        Ok(())
    }
}

/// Identity and connection settings for an embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderOptions {
    pub provider: String,
    pub model: String,
    pub api_base: Option<String>,
    pub api_key: Option<String>,

    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

fn default_max_chunk_size() -> usize {
    512
}

/// Reranker selection. `name` picks the registered provider variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerOptions {
    pub name: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// Top-level indexing options shared by refresh and retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Glob patterns for files excluded from indexing and retrieval.
    #[serde(default)]
    pub disable_in_files: Vec<String>,
}

impl IndexOptions {
    /// Compile `disable_in_files` into a matcher. An empty pattern list
    /// matches nothing.
    pub fn disabled_files(&self) -> Result<GlobSet, OptionsError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.disable_in_files {
            let glob = Glob::new(pattern).map_err(|source| OptionsError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| OptionsError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn retrieval_defaults() {
        let opts = RetrievalOptions::default();
        assert_eq!(opts.n_retrieve, 25);
        assert_eq!(opts.n_final, 5);
        assert!(opts.use_reranking);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn zero_counts_rejected() {
        let opts = RetrievalOptions {
            n_retrieve: 0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn disable_in_files_globs() {
        let opts = IndexOptions {
            disable_in_files: vec!["**/*.min.js".into(), "vendor/**".into()],
        };
        let set = opts.disabled_files().unwrap();
        assert!(set.is_match("dist/app.min.js"));
        assert!(set.is_match("vendor/lib/mod.rs"));
        assert!(!set.is_match("src/main.rs"));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: RetrievalOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.n_final, 5);

        let provider: EmbeddingProviderOptions = serde_json::from_str(
            r#"{"provider": "openai", "model": "text-embedding-3-small"}"#,
        )
        .unwrap();
        assert_eq!(provider.max_chunk_size, 512);
    }
}
