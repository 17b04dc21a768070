//! Error types for storage backends

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Stored embedding metadata conflicts with the configured model
    ///
    /// Fatal at startup: the project must be explicitly re-indexed before
    /// the new model can be used.
    #[error(
        "Embedding dimension mismatch: index was built with {stored_model} ({stored_dimension}d) \
         but configuration selects {configured_model} ({configured_dimension}d)"
    )]
    DimensionMismatch {
        stored_model: String,
        stored_dimension: usize,
        configured_model: String,
        configured_dimension: usize,
    },

    /// A filter referenced a key the backend does not index
    #[error("Invalid filter key: {0}")]
    InvalidFilter(String),

    /// Storage backend is unavailable or a connection failed
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Backend was used before `initialize` ran
    #[error("Storage not initialized")]
    NotInitialized,

    /// A query embedding's dimension does not match the index
    #[error("Query embedding has dimension {actual}, index expects {expected}")]
    QueryDimension { expected: usize, actual: usize },

    /// Snapshot (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other issues
    #[error("Other error: {0}")]
    Other(String),
}

impl StorageError {
    /// Whether a retry under the shared backoff policy makes sense
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => Self::Io(e),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Other(other.to_string()),
        }
    }
}
