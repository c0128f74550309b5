use quarry_common::Chunk;
use std::collections::{HashMap, HashSet};

// Weighted-fusion coefficients: cosine, BM25, recency.
const ALPHA: f32 = 0.6;
const BETA: f32 = 0.3;
const GAMMA: f32 = 0.1;

/// Lines added on each side of a winning chunk's range.
const EXPAND_MARGIN: u32 = 2;

/// A chunk that surfaced from at least one candidate source.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub chunk: Chunk,
    pub cosine: Option<f32>,
    pub bm25: Option<f32>,
    /// In `[0, 1]`, already computed from file mtime and seed paths.
    pub recency: f32,
}

#[derive(Debug, Clone)]
pub(crate) struct FusedCandidate {
    pub chunk: Chunk,
    pub score: f32,
    pub cosine: f32,
}

/// Merge candidates into one ranked list:
/// `score = α·norm(cosine) + β·norm(bm25) + γ·recency`, cosine as the
/// tie-breaker. Scores are min-max normalized over the candidate set so the
/// weights compare like with like.
pub(crate) fn fuse(candidates: Vec<Candidate>) -> Vec<FusedCandidate> {
    let (cos_lo, cos_hi) = bounds(candidates.iter().filter_map(|c| c.cosine));
    let (bm_lo, bm_hi) = bounds(candidates.iter().filter_map(|c| c.bm25));

    let mut fused: Vec<FusedCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let cosine = candidate
                .cosine
                .map(|v| normalize(v, cos_lo, cos_hi))
                .unwrap_or(0.0);
            let bm25 = candidate
                .bm25
                .map(|v| normalize(v, bm_lo, bm_hi))
                .unwrap_or(0.0);
            let score = ALPHA * cosine + BETA * bm25 + GAMMA * candidate.recency;
            FusedCandidate {
                chunk: candidate.chunk,
                score,
                cosine,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.cosine.total_cmp(&a.cosine))
    });
    fused
}

/// At most one chunk per file: the highest-scored survives with its line
/// range expanded by a small margin, clamped to the file extent known from
/// its sibling chunks.
pub(crate) fn dedupe_by_file(fused: Vec<FusedCandidate>) -> Vec<FusedCandidate> {
    let mut max_end_by_file: HashMap<String, u32> = HashMap::new();
    for candidate in &fused {
        let entry = max_end_by_file
            .entry(candidate.chunk.filepath.clone())
            .or_insert(0);
        *entry = (*entry).max(candidate.chunk.end_line);
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for mut candidate in fused {
        if !seen.insert(candidate.chunk.filepath.clone()) {
            continue;
        }
        let file_end = max_end_by_file
            .get(&candidate.chunk.filepath)
            .copied()
            .unwrap_or(candidate.chunk.end_line);
        candidate.chunk.start_line = candidate.chunk.start_line.saturating_sub(EXPAND_MARGIN);
        candidate.chunk.end_line = (candidate.chunk.end_line + EXPAND_MARGIN).min(file_end.max(candidate.chunk.end_line));
        out.push(candidate);
    }
    out
}

fn bounds(values: impl Iterator<Item = f32>) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    (lo, hi)
}

fn normalize(value: f32, lo: f32, hi: f32) -> f32 {
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0;
    }
    if (hi - lo).abs() < f32::EPSILON {
        // A single-valued set normalizes to full weight, not zero.
        return 1.0;
    }
    (value - lo) / (hi - lo)
}
