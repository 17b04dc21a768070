//! Error types for the retrieval engine

use thiserror::Error;

/// Result type alias for retrieval operations
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Errors surfaced by query execution
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The query itself is unusable (empty text, `top_k = 0`, bad alpha)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A filter referenced an unknown key
    #[error("Invalid filter key: {0}")]
    InvalidFilter(String),

    /// Graph mode requested while the graph capability is disabled
    #[error("Graph mode is disabled; enable graph.enabled in configuration and rebuild the graph")]
    GraphDisabled,

    /// Rerank requested while no reranker is configured
    #[error("Reranking is disabled; enable rerank.enabled in configuration")]
    RerankDisabled,

    /// The request-scoped deadline expired
    #[error("Query deadline exceeded after {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },

    /// The storage backend failed; never silently downgraded to a lesser
    /// mode
    #[error(transparent)]
    Storage(agent_brain_storage::StorageError),

    /// The embedding provider failed
    #[error(transparent)]
    Provider(#[from] agent_brain_providers::ProviderError),

    /// Generic error for other issues
    #[error("Other error: {0}")]
    Other(String),
}

impl From<agent_brain_storage::StorageError> for RetrievalError {
    fn from(err: agent_brain_storage::StorageError) -> Self {
        match err {
            agent_brain_storage::StorageError::InvalidFilter(key) => Self::InvalidFilter(key),
            other => Self::Storage(other),
        }
    }
}
