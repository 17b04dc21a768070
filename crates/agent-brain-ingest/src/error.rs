//! Error types for ingestion operations

use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors that can occur while loading and splitting source material
#[derive(Error, Debug)]
pub enum IngestError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A glob pattern in the discovery configuration is malformed
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// Tree-sitter failed to load or run a grammar
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic error for other issues
    #[error("Other error: {0}")]
    Other(String),
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
