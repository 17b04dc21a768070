//! Agent Brain job queue
//!
//! A persistent background job system: jobs append state transitions to a
//! JSONL log (newest record wins), a strict-FIFO queue feeds a
//! single-consumer worker, cancellation is cooperative at coarse
//! checkpoints, and jobs killed by a crash surface as FAILED with reason
//! `InterruptedByRestart` on the next startup.

pub mod error;
pub mod log;
pub mod model;
pub mod queue;
pub mod worker;

pub use error::{JobError, JobResult};
pub use log::JobLog;
pub use model::{INTERRUPTED_BY_RESTART, JobKind, JobProgress, JobRecord, JobStatus};
pub use queue::JobQueue;
pub use worker::{
    CorpusCounts, HandlerOutcome, JobHandler, JobWorker, ProgressReporter, WorkerConfig,
};
