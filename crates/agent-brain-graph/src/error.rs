//! Error types for the knowledge graph

use thiserror::Error;

/// Result type alias for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur during graph extraction and traversal
#[derive(Error, Debug)]
pub enum GraphError {
    /// Persistence I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored or generated triple could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The LLM extractor's provider failed
    #[error("Extraction provider error: {0}")]
    Provider(#[from] agent_brain_providers::ProviderError),

    /// Generic error for other issues
    #[error("Other error: {0}")]
    Other(String),
}
