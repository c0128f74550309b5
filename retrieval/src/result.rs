use serde::{Deserialize, Serialize};

/// One ranked snippet handed to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub filepath: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub score: f32,
}

/// Per-stage accounting for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalStats {
    pub vector_candidates: usize,
    pub lexical_candidates: usize,
    pub fused_candidates: usize,
    pub reranked: bool,
    pub embed_time_ms: u64,
    pub search_time_ms: u64,
    pub rerank_time_ms: u64,
    pub total_time_ms: u64,
}
