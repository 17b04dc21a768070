//! Two-stage rerank
//!
//! The engine over-fetches stage-1 candidates, then passes
//! `(query, chunk_text)` pairs to the rerank provider. Final ordering
//! uses rerank scores; stage-1 scores stay in the response for
//! observability. Any provider error or timeout degrades gracefully:
//! stage-1 results are returned unchanged, a flag marks the degradation,
//! and the warning is rate-limited to once per minute.

use agent_brain_ingest::Chunk;
use agent_brain_providers::RerankProviderRef;
use agent_brain_storage::SearchHit;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEGRADATION_WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Ranked rows out of the stage: `(chunk, stage1 score, rerank score)`
pub type RerankedRows = Vec<(Chunk, f32, Option<f32>)>;

/// The rerank stage with its degradation bookkeeping
pub struct RerankStage {
    provider: RerankProviderRef,
    timeout: Duration,
    last_warn: Mutex<Option<Instant>>,
}

impl RerankStage {
    /// Wrap a provider with the stage's timeout policy
    pub fn new(provider: RerankProviderRef, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            last_warn: Mutex::new(None),
        }
    }

    /// Rerank stage-1 hits; returns `(rows, degraded)`
    ///
    /// On success rows are ordered by rerank score descending with
    /// `chunk_id` tie-break. On failure the stage-1 ordering is returned
    /// unchanged with `degraded = true`.
    pub async fn apply(&self, query_text: &str, stage1: Vec<SearchHit>) -> (RerankedRows, bool) {
        let documents: Vec<&str> = stage1.iter().map(|hit| hit.chunk.text.as_str()).collect();

        let scores = tokio::time::timeout(
            self.timeout,
            self.provider.rerank(query_text, &documents),
        )
        .await;

        match scores {
            Ok(Ok(scores)) if scores.len() == documents.len() => {
                let mut rows: RerankedRows = stage1
                    .into_iter()
                    .zip(scores)
                    .map(|(hit, rerank_score)| (hit.chunk, hit.score, Some(rerank_score)))
                    .collect();
                rows.sort_by(|(chunk_a, _, score_a), (chunk_b, _, score_b)| {
                    score_b
                        .partial_cmp(score_a)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| chunk_a.chunk_id.cmp(&chunk_b.chunk_id))
                });
                (rows, false)
            }
            Ok(Ok(scores)) => {
                self.warn_degraded(&format!(
                    "reranker returned {} scores for {} documents",
                    scores.len(),
                    documents.len()
                ));
                (passthrough(stage1), true)
            }
            Ok(Err(e)) => {
                self.warn_degraded(&e.to_string());
                (passthrough(stage1), true)
            }
            Err(_) => {
                self.warn_degraded(&format!("timed out after {:?}", self.timeout));
                (passthrough(stage1), true)
            }
        }
    }

    /// Warn at most once per minute; degradations are expected noise when
    /// the provider is down
    fn warn_degraded(&self, reason: &str) {
        let mut last = match self.last_warn.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let now = Instant::now();
        let should_warn = last.is_none_or(|at| now.duration_since(at) >= DEGRADATION_WARN_INTERVAL);
        if should_warn {
            tracing::warn!("Rerank degraded, returning stage-1 order: {reason}");
            *last = Some(now);
        }
    }
}

fn passthrough(stage1: Vec<SearchHit>) -> RerankedRows {
    stage1
        .into_iter()
        .map(|hit| (hit.chunk, hit.score, None))
        .collect()
}
