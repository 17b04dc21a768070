//! Storage backend abstraction
//!
//! A single contract over vector + keyword storage, enabling pluggable
//! backends (embedded files vs. relational store) behind one interface.
//! Scores returned by every method are normalized to [0, 1].

use crate::error::StorageResult;
use crate::filters::Filters;
use crate::meta::EmbeddingMetadata;
use agent_brain_ingest::Chunk;
use async_trait::async_trait;
use std::sync::Arc;

/// A chunk matched by a search, with its normalized score
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The matched chunk (embedding omitted from responses upstream)
    pub chunk: Chunk,
    /// Normalized score in [0, 1]
    pub score: f32,
}

/// Unified contract over vector + keyword chunk storage
///
/// Upserts are keyed by `(source_path, chunk_index)`: storing the same
/// pair twice replaces, never duplicates. All search methods honor the
/// canonical ordering - score descending, `chunk_id` ascending on ties.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Prepare the backend and validate embedding metadata
    ///
    /// Writes the `(model, dimension)` singleton on first use; on every
    /// later startup the stored record must match or initialization fails.
    ///
    /// # Errors
    /// `StorageError::DimensionMismatch` on a metadata conflict;
    /// `StorageError::Unavailable` when the backend cannot be reached.
    async fn initialize(&self, embedding_dim: usize, embedding_model: &str) -> StorageResult<()>;

    /// Insert-or-replace chunks by `(source_path, chunk_index)`
    ///
    /// Returns the number of chunks written.
    ///
    /// # Errors
    /// Surfaces backend I/O failures after the shared retry policy.
    async fn upsert(&self, chunks: &[Chunk]) -> StorageResult<usize>;

    /// Dense similarity search over chunk embeddings
    ///
    /// # Errors
    /// `StorageError::InvalidFilter` on unknown filter keys;
    /// `StorageError::QueryDimension` when the query embedding does not
    /// match the index dimension.
    async fn vector_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filters: &Filters,
    ) -> StorageResult<Vec<SearchHit>>;

    /// Keyword (BM25 / full-text) search over chunk text
    ///
    /// # Errors
    /// `StorageError::InvalidFilter` on unknown filter keys.
    async fn keyword_search(
        &self,
        query_text: &str,
        top_k: usize,
        filters: &Filters,
    ) -> StorageResult<Vec<SearchHit>>;

    /// Weighted hybrid search: `alpha * vector + (1 - alpha) * keyword`
    ///
    /// Both branches over-fetch `top_k * 2` before fusion; results are
    /// deduplicated by `chunk_id` and truncated to `top_k`. With
    /// `alpha = 1.0` results equal vector-only search; with `alpha = 0.0`
    /// they equal keyword-only search.
    ///
    /// # Errors
    /// As [`Self::vector_search`] and [`Self::keyword_search`].
    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        top_k: usize,
        alpha: f32,
        filters: &Filters,
    ) -> StorageResult<Vec<SearchHit>>;

    /// Fetch chunks by id, omitting ids that do not exist
    ///
    /// Used to hydrate graph-mode results, whose candidate ids come from
    /// triple provenance rather than a search.
    ///
    /// # Errors
    /// Surfaces backend I/O failures.
    async fn get_by_ids(&self, chunk_ids: &[String]) -> StorageResult<Vec<Chunk>>;

    /// List every chunk matching `filters`
    ///
    /// Used by graph rebuilds, which re-extract over the stored corpus.
    ///
    /// # Errors
    /// `StorageError::InvalidFilter` on unknown filter keys.
    async fn list_chunks(&self, filters: &Filters) -> StorageResult<Vec<Chunk>>;

    /// Delete every chunk ingested from `source_path`
    ///
    /// Returns the number of chunks removed.
    ///
    /// # Errors
    /// Surfaces backend I/O failures.
    async fn delete_by_source(&self, source_path: &str) -> StorageResult<usize>;

    /// Drop all chunks and the embedding metadata record
    ///
    /// # Errors
    /// Surfaces backend I/O failures.
    async fn reset(&self) -> StorageResult<()>;

    /// Count chunks matching `filters`
    ///
    /// # Errors
    /// `StorageError::InvalidFilter` on unknown filter keys.
    async fn get_count(&self, filters: &Filters) -> StorageResult<usize>;

    /// The stored embedding metadata record, if any
    ///
    /// # Errors
    /// Surfaces backend I/O failures.
    async fn embedding_metadata(&self) -> StorageResult<Option<EmbeddingMetadata>>;

    /// Flush state and release resources
    ///
    /// # Errors
    /// Surfaces backend I/O failures.
    async fn close(&self) -> StorageResult<()>;
}

/// Type alias for a shared storage backend
pub type StorageBackendRef = Arc<dyn StorageBackend>;
