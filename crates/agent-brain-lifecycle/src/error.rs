//! Error types for instance lifecycle management

use thiserror::Error;

/// Result type alias for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors that can occur while starting or stopping an instance
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Another live instance already serves this project
    #[error("An instance is already running for this project at {base_url}")]
    AlreadyRunning { base_url: String },

    /// The lock file is held and its owner could not be proven dead
    #[error("Lock held by pid {pid}; stop that instance or remove {path}")]
    LockHeld { pid: u32, path: String },

    /// File I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime/lock file (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for other issues
    #[error("Other error: {0}")]
    Other(String),
}
