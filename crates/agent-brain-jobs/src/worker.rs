//! Background job worker
//!
//! Exactly one job executes at a time per instance: the worker is a
//! single-consumer pool over the FIFO queue, which makes upsert semantics
//! trivially serializable per project. Each job runs the protocol:
//! claim (PENDING -> RUNNING), read `chunks_before`, execute the handler,
//! read `chunks_after`, verify the delta for the job kind, then move to a
//! terminal state.

use crate::error::JobResult;
use crate::model::{JobKind, JobProgress, JobRecord, JobStatus};
use crate::queue::JobQueue;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// How a handler's execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Ran to completion
    Completed,
    /// Stopped at a cancellation checkpoint; partial upserts are safe to
    /// retry because upserts are idempotent by `(source_path, chunk_index)`
    Cancelled,
}

/// Kind-specific job execution
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute `job`, checking `cancel` at coarse-grained checkpoints
    /// (per file during indexing, per chunk during embedding)
    ///
    /// # Errors
    /// A returned error message fails the job.
    async fn run(
        &self,
        job: &JobRecord,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<HandlerOutcome, String>;
}

/// Counts the worker reads for verification
#[async_trait]
pub trait CorpusCounts: Send + Sync {
    /// Total chunks in the backend
    ///
    /// # Errors
    /// A returned error message fails the job being verified.
    async fn chunk_count(&self) -> Result<usize, String>;

    /// Graph node count, or `None` when the graph is disabled
    ///
    /// # Errors
    /// A returned error message fails the job being verified.
    async fn graph_node_count(&self) -> Result<Option<usize>, String>;
}

/// Handle handlers use to emit progress records
pub struct ProgressReporter {
    queue: Arc<JobQueue>,
    job_id: Uuid,
}

impl ProgressReporter {
    /// Build a reporter for a job on a queue
    pub fn new(queue: Arc<JobQueue>, job_id: Uuid) -> Self {
        Self { queue, job_id }
    }

    /// Record progress counters; never a state change
    pub fn report(&self, progress: JobProgress) {
        if let Err(e) = self.queue.record_progress(self.job_id, progress) {
            tracing::warn!("Failed to record progress for {}: {e}", self.job_id);
        }
    }
}

/// Configuration for the worker loop
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Fallback poll interval when no wakeup arrives
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Single-consumer worker draining the job queue
pub struct JobWorker {
    queue: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    counts: Arc<dyn CorpusCounts>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl JobWorker {
    /// Create a worker over `queue` with the given handler
    pub fn new(
        queue: Arc<JobQueue>,
        handler: Arc<dyn JobHandler>,
        counts: Arc<dyn CorpusCounts>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            counts,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the loop (and cancels the active job) when fired
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown; drains one job at a time in FIFO order
    pub async fn run(&self) {
        info!("Job worker started");
        loop {
            // Drain everything currently pending
            loop {
                if self.shutdown.is_cancelled() {
                    info!("Job worker stopped");
                    return;
                }
                match self.queue.claim_next() {
                    Ok(Some((job, cancel))) => self.process_job(job, cancel).await,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to claim job: {e}");
                        break;
                    }
                }
            }

            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Job worker stopped");
                    return;
                }
                () = self.queue.wait_for_work() => {}
                () = sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn process_job(&self, job: JobRecord, cancel: CancellationToken) {
        let job_id = job.job_id;
        info!("Job {job_id} started ({})", job.kind);

        // Shutdown propagates into the active job as a cooperative cancel
        // so it can checkpoint and exit within the drain window.
        let job_token = cancel.clone();
        let shutdown = self.shutdown.clone();
        let link = tokio::spawn(async move {
            shutdown.cancelled().await;
            job_token.cancel();
        });

        let result = self.execute(&job, &cancel).await;
        link.abort();

        let finished = match result {
            Ok((status, chunks_after, error)) => {
                self.queue.finish(job_id, status, chunks_after, error)
            }
            Err(e) => self
                .queue
                .finish(job_id, JobStatus::Failed, None, Some(e.to_string())),
        };
        match finished {
            Ok(record) => info!("Job {job_id} finished: {}", record.status),
            Err(e) => error!("Failed to finalize job {job_id}: {e}"),
        }
    }

    /// Run one job through the full protocol; returns the terminal state
    async fn execute(
        &self,
        job: &JobRecord,
        cancel: &CancellationToken,
    ) -> JobResult<(JobStatus, Option<usize>, Option<String>)> {
        let chunks_before = match self.counts.chunk_count().await {
            Ok(count) => count,
            Err(e) => return Ok((JobStatus::Failed, None, Some(e))),
        };
        self.queue.set_chunks_before(job.job_id, chunks_before)?;

        let graph_before = if job.kind == JobKind::RebuildGraph {
            match self.counts.graph_node_count().await {
                Ok(count) => count,
                Err(e) => return Ok((JobStatus::Failed, None, Some(e))),
            }
        } else {
            None
        };

        let reporter = ProgressReporter {
            queue: Arc::clone(&self.queue),
            job_id: job.job_id,
        };

        let outcome = self.handler.run(job, cancel, &reporter).await;

        let chunks_after = self.counts.chunk_count().await.ok();
        match outcome {
            Ok(HandlerOutcome::Cancelled) => {
                Ok((JobStatus::Cancelled, chunks_after, Some("Cancelled".to_string())))
            }
            Ok(HandlerOutcome::Completed) => {
                let verification = self
                    .verify(job, chunks_before, chunks_after, graph_before)
                    .await;
                match verification {
                    Ok(()) => Ok((JobStatus::Done, chunks_after, None)),
                    Err(diagnostic) => Ok((JobStatus::Failed, chunks_after, Some(diagnostic))),
                }
            }
            Err(e) => Ok((JobStatus::Failed, chunks_after, Some(e))),
        }
    }

    /// Kind-specific post-conditions; failure text describes expected vs.
    /// observed
    async fn verify(
        &self,
        job: &JobRecord,
        chunks_before: usize,
        chunks_after: Option<usize>,
        graph_before: Option<usize>,
    ) -> Result<(), String> {
        let chunks_after =
            chunks_after.ok_or_else(|| "verification failed: chunk count unavailable".to_string())?;

        match job.kind {
            JobKind::IndexPath | JobKind::AddPath => {
                if !job.is_forced() && chunks_after < chunks_before {
                    return Err(format!(
                        "verification failed: expected chunks_after >= chunks_before \
                         ({chunks_after} < {chunks_before})"
                    ));
                }
                Ok(())
            }
            JobKind::Reset => {
                if chunks_after != 0 {
                    return Err(format!(
                        "verification failed: expected 0 chunks after reset, observed {chunks_after}"
                    ));
                }
                Ok(())
            }
            JobKind::RebuildGraph => {
                let before = graph_before;
                let after = self.counts.graph_node_count().await?;
                match (before, after) {
                    (Some(0), _) | (None, None) => Ok(()),
                    (Some(before), Some(after)) if before != after => Ok(()),
                    (Some(before), Some(after)) => Err(format!(
                        "verification failed: graph node count unchanged ({before} -> {after})"
                    )),
                    (before, after) => Err(format!(
                        "verification failed: graph counts unavailable ({before:?} -> {after:?})"
                    )),
                }
            }
        }
    }
}
