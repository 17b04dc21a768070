//! Shared application state
//!
//! Per-instance state assembled at startup by the bootstrap and passed by
//! reference into every route handler. The one-time module-level
//! singletons of similar systems become fields here.

use agent_brain_indexing::{DimensionGuard, IndexingService};
use agent_brain_jobs::JobQueue;
use agent_brain_retrieval::{EpochSource, RetrievalEngine};
use agent_brain_storage::StorageBackendRef;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Capability flags surfaced in `/health`
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Capabilities {
    /// Knowledge graph extraction and graph-mode queries
    pub graph: bool,
    /// Two-stage rerank
    pub rerank: bool,
    /// Chunk summarization
    pub summarization: bool,
}

/// Everything a request handler needs
pub struct AppState {
    /// The retrieval engine
    pub engine: Arc<RetrievalEngine>,
    /// The job queue feeding the single worker
    pub queue: Arc<JobQueue>,
    /// The indexing service (also the epoch source)
    pub service: Arc<IndexingService>,
    /// The storage backend, for counts and metadata
    pub backend: StorageBackendRef,
    /// Optional capabilities in effect
    pub capabilities: Capabilities,
    /// Stable instance id from the project path hash
    pub instance_id: String,
    /// Embedding model identifier in effect
    pub embedding_model: String,
    /// Embedding dimension in effect
    pub embedding_dim: usize,
    /// When this instance started
    pub started_at: DateTime<Utc>,
    /// Fatal embedding-metadata conflict detected at startup; queries
    /// return 503 until a reset job clears it
    pub dimension_guard: DimensionGuard,
}

impl AppState {
    /// The guard's current error, when tripped
    pub fn dimension_error(&self) -> Option<String> {
        self.dimension_guard
            .read()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

/// Type alias for the shared state handle
pub type SharedState = Arc<AppState>;

/// Adapter exposing the indexing service's mutation epoch to the engine
pub struct ServiceEpoch(pub Arc<IndexingService>);

impl EpochSource for ServiceEpoch {
    fn epoch(&self) -> u64 {
        self.0.epoch()
    }
}
