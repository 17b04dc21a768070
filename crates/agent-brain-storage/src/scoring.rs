//! Score normalization and rank fusion
//!
//! Both backends normalize scores to [0, 1] so a fused score has the same
//! meaning regardless of backend: vector scores by a metric-specific
//! formula, keyword scores by per-query max normalization. Fusion across
//! ranked lists uses Reciprocal Rank Fusion with `k = 60`.

use agent_brain_config::DistanceMetric;
use std::collections::HashMap;

/// RRF constant
pub const RRF_K: f32 = 60.0;

/// Normalize a raw vector similarity/distance into [0, 1]
///
/// The raw value is metric-specific: cosine takes the cosine *distance*
/// `1 - similarity` in [0, 2]; L2 takes the euclidean distance; inner
/// product takes the raw dot product.
pub fn normalize_vector_score(metric: DistanceMetric, raw: f32) -> f32 {
    let score = match metric {
        DistanceMetric::Cosine => 1.0 - raw / 2.0,
        DistanceMetric::L2 => 1.0 / (1.0 + raw.max(0.0)),
        DistanceMetric::InnerProduct => sigmoid(raw),
    };
    score.clamp(0.0, 1.0)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Normalize keyword scores by the per-query maximum
///
/// An empty or all-zero list stays untouched.
pub fn normalize_keyword_scores(scores: &mut [(String, f32)]) {
    let max = scores.iter().map(|(_, s)| *s).fold(0.0_f32, f32::max);
    if max > 0.0 {
        for (_, score) in scores.iter_mut() {
            *score /= max;
        }
    }
}

/// Fuse ranked lists with Reciprocal Rank Fusion
///
/// Each list is ordered best-first; the fused score of an item is
/// `sum over lists of 1/(k + rank)` with 1-based ranks. Returns items
/// ordered by fused score descending, ties broken by id ascending, so
/// fusion is deterministic given identical inputs.
pub fn rrf_fuse(lists: &[Vec<String>]) -> Vec<(String, f32)> {
    let mut fused: HashMap<String, f32> = HashMap::new();
    for list in lists {
        for (rank, id) in list.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let contribution = 1.0 / (RRF_K + rank as f32 + 1.0);
            *fused.entry(id.clone()).or_insert(0.0) += contribution;
        }
    }
    let mut out: Vec<(String, f32)> = fused.into_iter().collect();
    sort_hits(&mut out);
    out
}

/// Canonical result ordering: score descending, id ascending on ties
pub fn sort_hits(hits: &mut [(String, f32)]) {
    hits.sort_by(|(id_a, score_a), (id_b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| id_a.cmp(id_b))
    });
}
