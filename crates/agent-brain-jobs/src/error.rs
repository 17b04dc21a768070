//! Error types for the job queue

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for job operations
pub type JobResult<T> = Result<T, JobError>;

/// Errors that can occur in the job queue and worker
#[derive(Error, Debug)]
pub enum JobError {
    /// Log I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A log record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No job with the given id exists
    #[error("Unknown job: {0}")]
    UnknownJob(Uuid),

    /// A state change would violate the PENDING -> RUNNING -> terminal DAG
    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: String,
        to: String,
    },

    /// Generic error for other issues
    #[error("Other error: {0}")]
    Other(String),
}
