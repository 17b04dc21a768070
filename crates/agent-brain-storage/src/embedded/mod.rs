//! Embedded storage backend
//!
//! A local persistent vector store plus a serialized keyword index,
//! written alongside each other under the project state directory.
//! Simple to deploy; the default for new projects. Vector search is a
//! brute-force scan, which is the right trade at per-project corpus
//! sizes.
//!
//! On-disk layout under `{state_dir}/index/`:
//! - `chunks.json` - all chunks with embeddings
//! - `keywords.bin` - bincode snapshot of the BM25 index
//! - `meta.json` - embedding model/dimension singleton

pub mod bm25;

pub use bm25::Bm25Index;

use crate::backend::{SearchHit, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::filters::Filters;
use crate::meta::EmbeddingMetadata;
use crate::scoring;
use agent_brain_config::DistanceMetric;
use agent_brain_ingest::Chunk;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const CHUNKS_FILE: &str = "chunks.json";
const KEYWORDS_FILE: &str = "keywords.bin";
const META_FILE: &str = "meta.json";

#[derive(Default)]
struct EmbeddedState {
    chunks: HashMap<String, Chunk>,
    keywords: Bm25Index,
    meta: Option<EmbeddingMetadata>,
}

/// File-backed vector + keyword store
pub struct EmbeddedBackend {
    dir: PathBuf,
    metric: DistanceMetric,
    state: RwLock<EmbeddedState>,
}

impl EmbeddedBackend {
    /// Open (or create) the embedded index under `dir`
    ///
    /// # Errors
    /// Returns `StorageError` when existing snapshot files cannot be read
    /// or parsed.
    pub fn open(dir: &Path, metric: DistanceMetric) -> StorageResult<Self> {
        std::fs::create_dir_all(dir)?;

        let mut state = EmbeddedState::default();

        let chunks_path = dir.join(CHUNKS_FILE);
        if chunks_path.exists() {
            let data = std::fs::read_to_string(&chunks_path)?;
            let chunks: Vec<Chunk> = serde_json::from_str(&data)?;
            state.chunks = chunks
                .into_iter()
                .map(|c| (c.chunk_id.clone(), c))
                .collect();
        }

        let keywords_path = dir.join(KEYWORDS_FILE);
        if keywords_path.exists() {
            let data = std::fs::read(&keywords_path)?;
            state.keywords = bincode::deserialize(&data)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
        }

        let meta_path = dir.join(META_FILE);
        if meta_path.exists() {
            let data = std::fs::read_to_string(&meta_path)?;
            state.meta = Some(serde_json::from_str(&data)?);
        }

        tracing::debug!(
            "Opened embedded index at {} ({} chunks)",
            dir.display(),
            state.chunks.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            metric,
            state: RwLock::new(state),
        })
    }

    /// Snapshot the full state to disk via write-then-rename
    fn persist(&self, state: &EmbeddedState) -> StorageResult<()> {
        let chunks: Vec<&Chunk> = {
            let mut ordered: Vec<&Chunk> = state.chunks.values().collect();
            ordered.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
            ordered
        };
        write_atomic(
            &self.dir.join(CHUNKS_FILE),
            serde_json::to_vec(&chunks)?.as_slice(),
        )?;

        let keyword_bytes = bincode::serialize(&state.keywords)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        write_atomic(&self.dir.join(KEYWORDS_FILE), &keyword_bytes)?;

        match &state.meta {
            Some(meta) => write_atomic(
                &self.dir.join(META_FILE),
                serde_json::to_vec(meta)?.as_slice(),
            )?,
            None => {
                let path = self.dir.join(META_FILE);
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
            }
        }
        Ok(())
    }

    /// Raw metric value between a query and a stored embedding
    fn raw_distance(&self, query: &[f32], stored: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(query, stored),
            DistanceMetric::L2 => query
                .iter()
                .zip(stored)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::InnerProduct => query.iter().zip(stored).map(|(a, b)| a * b).sum(),
        }
    }

    fn vector_hits(
        &self,
        state: &EmbeddedState,
        query_embedding: &[f32],
        top_k: usize,
        filters: &Filters,
    ) -> StorageResult<Vec<SearchHit>> {
        if let Some(meta) = &state.meta {
            if query_embedding.len() != meta.dimension {
                return Err(StorageError::QueryDimension {
                    expected: meta.dimension,
                    actual: query_embedding.len(),
                });
            }
        }

        let mut scored: Vec<(String, f32)> = state
            .chunks
            .values()
            .filter(|chunk| filters.matches(chunk))
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                let raw = self.raw_distance(query_embedding, embedding);
                Some((
                    chunk.chunk_id.clone(),
                    scoring::normalize_vector_score(self.metric, raw),
                ))
            })
            .collect();
        scoring::sort_hits(&mut scored);
        scored.truncate(top_k);

        Ok(self.hydrate(state, scored))
    }

    fn keyword_hits(
        &self,
        state: &EmbeddedState,
        query_text: &str,
        top_k: usize,
        filters: &Filters,
    ) -> Vec<SearchHit> {
        // Score everything, filter, then normalize over the filtered set so
        // the best surviving match scores 1.0.
        let mut scored: Vec<(String, f32)> = state
            .keywords
            .search(query_text, usize::MAX)
            .into_iter()
            .filter(|(id, _)| {
                state
                    .chunks
                    .get(id)
                    .is_some_and(|chunk| filters.matches(chunk))
            })
            .collect();
        scoring::normalize_keyword_scores(&mut scored);
        scoring::sort_hits(&mut scored);
        scored.truncate(top_k);
        self.hydrate(state, scored)
    }

    fn hydrate(&self, state: &EmbeddedState, scored: Vec<(String, f32)>) -> Vec<SearchHit> {
        scored
            .into_iter()
            .filter_map(|(id, score)| {
                state.chunks.get(&id).map(|chunk| SearchHit {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StorageBackend for EmbeddedBackend {
    async fn initialize(&self, embedding_dim: usize, embedding_model: &str) -> StorageResult<()> {
        let mut state = self.state.write().await;
        match &state.meta {
            Some(meta) => meta.validate(embedding_model, embedding_dim)?,
            None => {
                state.meta = Some(EmbeddingMetadata::new(embedding_model, embedding_dim));
                self.persist(&state)?;
            }
        }
        Ok(())
    }

    async fn upsert(&self, chunks: &[Chunk]) -> StorageResult<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.write().await;

        if let Some(meta) = &state.meta {
            for chunk in chunks {
                if let Some(embedding) = &chunk.embedding {
                    if embedding.len() != meta.dimension {
                        return Err(StorageError::QueryDimension {
                            expected: meta.dimension,
                            actual: embedding.len(),
                        });
                    }
                }
            }
        }

        for chunk in chunks {
            state.keywords.upsert_doc(&chunk.chunk_id, &chunk.text);
            state.chunks.insert(chunk.chunk_id.clone(), chunk.clone());
        }
        self.persist(&state)?;
        Ok(chunks.len())
    }

    async fn vector_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filters: &Filters,
    ) -> StorageResult<Vec<SearchHit>> {
        filters.validate()?;
        let state = self.state.read().await;
        self.vector_hits(&state, query_embedding, top_k, filters)
    }

    async fn keyword_search(
        &self,
        query_text: &str,
        top_k: usize,
        filters: &Filters,
    ) -> StorageResult<Vec<SearchHit>> {
        filters.validate()?;
        let state = self.state.read().await;
        Ok(self.keyword_hits(&state, query_text, top_k, filters))
    }

    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        top_k: usize,
        alpha: f32,
        filters: &Filters,
    ) -> StorageResult<Vec<SearchHit>> {
        filters.validate()?;

        // Degenerate weights collapse to the single-mode searches so the
        // alpha = 1.0 / 0.0 equivalence holds exactly.
        if alpha >= 1.0 {
            return self.vector_search(query_embedding, top_k, filters).await;
        }
        if alpha <= 0.0 {
            return self.keyword_search(query_text, top_k, filters).await;
        }

        let state = self.state.read().await;
        let overfetch = top_k.saturating_mul(2).max(top_k);
        let vector = self.vector_hits(&state, query_embedding, overfetch, filters)?;
        let keyword = self.keyword_hits(&state, query_text, overfetch, filters);

        let mut combined: HashMap<String, (f32, f32)> = HashMap::new();
        for hit in &vector {
            combined.entry(hit.chunk.chunk_id.clone()).or_default().0 = hit.score;
        }
        for hit in &keyword {
            combined.entry(hit.chunk.chunk_id.clone()).or_default().1 = hit.score;
        }

        let mut fused: Vec<(String, f32)> = combined
            .into_iter()
            .map(|(id, (v, k))| (id, alpha * v + (1.0 - alpha) * k))
            .collect();
        scoring::sort_hits(&mut fused);
        fused.truncate(top_k);

        Ok(self.hydrate(&state, fused))
    }

    async fn get_by_ids(&self, chunk_ids: &[String]) -> StorageResult<Vec<Chunk>> {
        let state = self.state.read().await;
        Ok(chunk_ids
            .iter()
            .filter_map(|id| state.chunks.get(id).cloned())
            .collect())
    }

    async fn list_chunks(&self, filters: &Filters) -> StorageResult<Vec<Chunk>> {
        filters.validate()?;
        let state = self.state.read().await;
        let mut chunks: Vec<Chunk> = state
            .chunks
            .values()
            .filter(|chunk| filters.matches(chunk))
            .cloned()
            .collect();
        chunks.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(chunks)
    }

    async fn delete_by_source(&self, source_path: &str) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        let doomed: Vec<String> = state
            .chunks
            .values()
            .filter(|chunk| chunk.source_path == source_path)
            .map(|chunk| chunk.chunk_id.clone())
            .collect();
        for id in &doomed {
            state.chunks.remove(id);
            state.keywords.remove_doc(id);
        }
        if !doomed.is_empty() {
            self.persist(&state)?;
        }
        Ok(doomed.len())
    }

    async fn reset(&self) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.chunks.clear();
        state.keywords = Bm25Index::new();
        state.meta = None;
        self.persist(&state)?;
        Ok(())
    }

    async fn get_count(&self, filters: &Filters) -> StorageResult<usize> {
        filters.validate()?;
        let state = self.state.read().await;
        if filters.is_empty() {
            return Ok(state.chunks.len());
        }
        Ok(state
            .chunks
            .values()
            .filter(|chunk| filters.matches(chunk))
            .count())
    }

    async fn embedding_metadata(&self) -> StorageResult<Option<EmbeddingMetadata>> {
        Ok(self.state.read().await.meta.clone())
    }

    async fn close(&self) -> StorageResult<()> {
        let state = self.state.read().await;
        self.persist(&state)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Write a file atomically: temp file in the same directory, then rename
fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterValue;

    fn chunk_with_embedding(path: &str, index: usize, text: &str, embedding: Vec<f32>) -> Chunk {
        let mut chunk = Chunk::document(path, index, text);
        chunk.embedding = Some(embedding);
        chunk
    }

    fn open_backend(dir: &Path) -> EmbeddedBackend {
        EmbeddedBackend::open(dir, DistanceMetric::Cosine).unwrap()
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_source_path_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(dir.path());

        backend
            .upsert(&[chunk_with_embedding("a.md", 0, "first", vec![1.0, 0.0])])
            .await
            .unwrap();
        backend
            .upsert(&[chunk_with_embedding("a.md", 0, "replaced", vec![0.0, 1.0])])
            .await
            .unwrap();
        backend
            .upsert(&[chunk_with_embedding("a.md", 1, "second", vec![1.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(backend.get_count(&Filters::none()).await.unwrap(), 2);

        let hits = backend
            .vector_search(&[0.0, 1.0], 10, &Filters::none())
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.text, "replaced");
    }

    #[tokio::test]
    async fn vector_search_orders_by_similarity_with_id_tiebreak() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(dir.path());

        backend
            .upsert(&[
                chunk_with_embedding("b.md", 0, "tie", vec![1.0, 0.0]),
                chunk_with_embedding("a.md", 0, "tie", vec![1.0, 0.0]),
                chunk_with_embedding("c.md", 0, "far", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = backend
            .vector_search(&[1.0, 0.0], 10, &Filters::none())
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        // Two perfect matches tie; id ascending breaks the tie
        assert_eq!(hits[0].chunk.chunk_id, "a.md#0");
        assert_eq!(hits[1].chunk.chunk_id, "b.md#0");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert!(hits[2].score < hits[1].score);
    }

    #[tokio::test]
    async fn keyword_search_normalizes_to_unit_max() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(dir.path());

        backend
            .upsert(&[
                chunk_with_embedding("a.md", 0, "retrieval engine design", vec![1.0, 0.0]),
                chunk_with_embedding("b.md", 0, "completely different topic", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = backend
            .keyword_search("retrieval engine", 10, &Filters::none())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn hybrid_alpha_extremes_match_single_modes() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(dir.path());

        backend
            .upsert(&[
                chunk_with_embedding("a.md", 0, "alpha text about engines", vec![0.9, 0.1]),
                chunk_with_embedding("b.md", 0, "engines and turbines", vec![0.2, 0.8]),
                chunk_with_embedding("c.md", 0, "unrelated prose", vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        let query = [1.0, 0.0];

        let vector_only = backend
            .vector_search(&query, 3, &Filters::none())
            .await
            .unwrap();
        let hybrid_vector = backend
            .hybrid_search(&query, "engines", 3, 1.0, &Filters::none())
            .await
            .unwrap();
        let vec_ids: Vec<_> = vector_only.iter().map(|h| &h.chunk.chunk_id).collect();
        let hyb_ids: Vec<_> = hybrid_vector.iter().map(|h| &h.chunk.chunk_id).collect();
        assert_eq!(vec_ids, hyb_ids);

        let keyword_only = backend
            .keyword_search("engines", 3, &Filters::none())
            .await
            .unwrap();
        let hybrid_keyword = backend
            .hybrid_search(&query, "engines", 3, 0.0, &Filters::none())
            .await
            .unwrap();
        let kw_ids: Vec<_> = keyword_only.iter().map(|h| &h.chunk.chunk_id).collect();
        let hyb_kw_ids: Vec<_> = hybrid_keyword.iter().map(|h| &h.chunk.chunk_id).collect();
        assert_eq!(kw_ids, hyb_kw_ids);
    }

    #[tokio::test]
    async fn filters_restrict_results_and_unknown_keys_fail() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(dir.path());

        let mut code = Chunk::code(
            "src/lib.rs",
            0,
            "fn search() {}",
            "rust",
            Some("function".to_string()),
            Some("search".to_string()),
            1,
            1,
        );
        code.embedding = Some(vec![1.0, 0.0]);
        backend
            .upsert(&[
                code,
                chunk_with_embedding("doc.md", 0, "search documentation", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let filters = Filters::from_pairs([(
            "source_type".to_string(),
            FilterValue::Eq("code".to_string()),
        )]);
        let hits = backend.vector_search(&[1.0, 0.0], 10, &filters).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.source_path, "src/lib.rs");

        let bad = Filters::from_pairs([("nope".to_string(), FilterValue::Eq("x".to_string()))]);
        assert!(matches!(
            backend.vector_search(&[1.0, 0.0], 10, &bad).await,
            Err(StorageError::InvalidFilter(_))
        ));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = open_backend(dir.path());
            backend.initialize(2, "mock-model").await.unwrap();
            backend
                .upsert(&[chunk_with_embedding("a.md", 0, "persisted text", vec![1.0, 0.0])])
                .await
                .unwrap();
        }

        let reopened = open_backend(dir.path());
        assert_eq!(reopened.get_count(&Filters::none()).await.unwrap(), 1);
        let meta = reopened.embedding_metadata().await.unwrap().unwrap();
        assert_eq!(meta.model, "mock-model");
        assert_eq!(meta.dimension, 2);

        let hits = reopened
            .keyword_search("persisted", 10, &Filters::none())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn initialize_rejects_changed_model() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(dir.path());
        backend.initialize(2, "model-a").await.unwrap();
        assert!(matches!(
            backend.initialize(3, "model-b").await,
            Err(StorageError::DimensionMismatch { .. })
        ));
        // Same model and dimension keeps working
        backend.initialize(2, "model-a").await.unwrap();
    }

    #[tokio::test]
    async fn reset_clears_chunks_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(dir.path());
        backend.initialize(2, "model-a").await.unwrap();
        backend
            .upsert(&[chunk_with_embedding("a.md", 0, "text", vec![1.0, 0.0])])
            .await
            .unwrap();

        backend.reset().await.unwrap();
        assert_eq!(backend.get_count(&Filters::none()).await.unwrap(), 0);
        assert!(backend.embedding_metadata().await.unwrap().is_none());
        // A different model can initialize after reset
        backend.initialize(4, "model-b").await.unwrap();
    }

    #[tokio::test]
    async fn delete_by_source_removes_all_chunks_of_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(dir.path());
        backend
            .upsert(&[
                chunk_with_embedding("a.md", 0, "first part", vec![1.0, 0.0]),
                chunk_with_embedding("a.md", 1, "second part", vec![0.5, 0.5]),
                chunk_with_embedding("b.md", 0, "other file", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let removed = backend.delete_by_source("a.md").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.get_count(&Filters::none()).await.unwrap(), 1);
        assert!(backend.keyword_search("first", 10, &Filters::none()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_query_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(dir.path());
        backend.initialize(2, "model-a").await.unwrap();
        assert!(matches!(
            backend.vector_search(&[1.0, 0.0, 0.0], 5, &Filters::none()).await,
            Err(StorageError::QueryDimension { expected: 2, actual: 3 })
        ));
    }
}
