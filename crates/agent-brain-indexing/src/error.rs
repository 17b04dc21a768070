//! Error types for the indexing service

use thiserror::Error;

/// Result type alias for indexing operations
pub type IndexingResult<T> = Result<T, IndexingError>;

/// Errors that can occur while running indexing jobs
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Loading or splitting a file failed
    #[error(transparent)]
    Ingest(#[from] agent_brain_ingest::IngestError),

    /// Embedding or summarization provider failed systemically
    #[error(transparent)]
    Provider(#[from] agent_brain_providers::ProviderError),

    /// Backend write or count failed
    #[error(transparent)]
    Storage(#[from] agent_brain_storage::StorageError),

    /// Graph extraction or persistence failed systemically
    #[error(transparent)]
    Graph(#[from] agent_brain_graph::GraphError),

    /// Ledger I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ledger (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for other issues
    #[error("Other error: {0}")]
    Other(String),
}
