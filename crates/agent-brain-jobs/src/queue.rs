//! Durable FIFO job queue
//!
//! Backed by the append-only JSONL log; the in-memory view is rebuilt by
//! replay at startup. Strict FIFO by enqueue time. On startup, any job
//! whose most recent state is RUNNING is transitioned to FAILED with
//! reason `InterruptedByRestart` and not auto-resumed.

use crate::error::{JobError, JobResult};
use crate::log::JobLog;
use crate::model::{INTERRUPTED_BY_RESTART, JobKind, JobProgress, JobRecord, JobStatus};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct QueueInner {
    order: Vec<Uuid>,
    jobs: HashMap<Uuid, JobRecord>,
    pending: VecDeque<Uuid>,
    watchers: HashMap<Uuid, watch::Sender<JobRecord>>,
    cancel_tokens: HashMap<Uuid, CancellationToken>,
}

/// Persistent single-project job queue
pub struct JobQueue {
    log: JobLog,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl JobQueue {
    /// Open the queue, replaying the log and failing interrupted jobs
    ///
    /// # Errors
    /// Surfaces log I/O failures.
    pub fn open(dir: &Path) -> JobResult<Self> {
        let log = JobLog::open(dir)?;
        let (order, mut jobs) = log.replay()?;

        // Crash recovery: RUNNING jobs were killed mid-flight.
        let mut pending = VecDeque::new();
        for job_id in &order {
            let Some(record) = jobs.get_mut(job_id) else {
                continue;
            };
            match record.status {
                JobStatus::Running => {
                    record.status = JobStatus::Failed;
                    record.error = Some(INTERRUPTED_BY_RESTART.to_string());
                    record.finished_at = Some(Utc::now());
                    log.append(record)?;
                    tracing::warn!("Job {job_id} interrupted by restart, marked FAILED");
                }
                JobStatus::Pending => pending.push_back(*job_id),
                _ => {}
            }
        }

        log.maybe_compact()?;

        Ok(Self {
            log,
            inner: Mutex::new(QueueInner {
                order,
                jobs,
                pending,
                watchers: HashMap::new(),
                cancel_tokens: HashMap::new(),
            }),
            notify: Notify::new(),
        })
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        // Poisoning means a panic mid-transition; propagate it.
        self.inner.lock().unwrap()
    }

    /// Persist and publish an updated record
    fn commit(inner: &mut QueueInner, log: &JobLog, record: JobRecord) -> JobResult<JobRecord> {
        log.append(&record)?;
        if let Some(sender) = inner.watchers.get(&record.job_id) {
            let _ = sender.send(record.clone());
        }
        inner.jobs.insert(record.job_id, record.clone());
        Ok(record)
    }

    /// Enqueue a new job
    ///
    /// # Errors
    /// Surfaces log I/O failures.
    pub fn enqueue(&self, kind: JobKind, params: serde_json::Value) -> JobResult<JobRecord> {
        let record = JobRecord::new(kind, params);
        let mut inner = self.lock();
        inner.order.push(record.job_id);
        inner.pending.push_back(record.job_id);
        let (sender, _) = watch::channel(record.clone());
        inner.watchers.insert(record.job_id, sender);
        let record = Self::commit(&mut inner, &self.log, record)?;
        drop(inner);
        self.notify.notify_one();
        Ok(record)
    }

    /// Fetch one job's current record
    pub fn get(&self, job_id: Uuid) -> Option<JobRecord> {
        self.lock().jobs.get(&job_id).cloned()
    }

    /// List jobs, newest first, optionally filtered by status
    pub fn list(&self, status: Option<JobStatus>) -> Vec<JobRecord> {
        let inner = self.lock();
        let mut records: Vec<JobRecord> = inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|record| status.is_none_or(|s| record.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Whether a job is currently RUNNING
    pub fn running_job(&self) -> Option<JobRecord> {
        let inner = self.lock();
        inner
            .jobs
            .values()
            .find(|record| record.status == JobStatus::Running)
            .cloned()
    }

    /// Subscribe to a job's state changes
    pub fn watch(&self, job_id: Uuid) -> Option<watch::Receiver<JobRecord>> {
        let mut inner = self.lock();
        let record = inner.jobs.get(&job_id).cloned()?;
        let sender = inner
            .watchers
            .entry(job_id)
            .or_insert_with(|| watch::channel(record).0);
        Some(sender.subscribe())
    }

    /// Request cancellation; idempotent
    ///
    /// A PENDING job is cancelled immediately (it never runs). A RUNNING
    /// job observes the cooperative signal at its next checkpoint. A
    /// terminal job is returned unchanged.
    ///
    /// # Errors
    /// `JobError::UnknownJob` when no such job exists.
    pub fn cancel(&self, job_id: Uuid) -> JobResult<JobRecord> {
        let mut inner = self.lock();
        let record = inner
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(JobError::UnknownJob(job_id))?;

        match record.status {
            JobStatus::Pending => {
                inner.pending.retain(|id| *id != job_id);
                let mut cancelled = record;
                cancelled.status = JobStatus::Cancelled;
                cancelled.finished_at = Some(Utc::now());
                Self::commit(&mut inner, &self.log, cancelled)
            }
            JobStatus::Running => {
                if let Some(token) = inner.cancel_tokens.get(&job_id) {
                    token.cancel();
                }
                Ok(record)
            }
            _ => Ok(record),
        }
    }

    /// Claim the next pending job, transitioning it to RUNNING
    ///
    /// # Errors
    /// Surfaces log I/O failures.
    pub fn claim_next(&self) -> JobResult<Option<(JobRecord, CancellationToken)>> {
        let mut inner = self.lock();
        let Some(job_id) = inner.pending.pop_front() else {
            return Ok(None);
        };
        let Some(mut record) = inner.jobs.get(&job_id).cloned() else {
            return Ok(None);
        };
        // A cancel may have raced the claim
        if record.status != JobStatus::Pending {
            return Ok(None);
        }
        record.status = JobStatus::Running;
        record.started_at = Some(Utc::now());
        let token = CancellationToken::new();
        inner.cancel_tokens.insert(job_id, token.clone());
        let record = Self::commit(&mut inner, &self.log, record)?;
        Ok(Some((record, token)))
    }

    /// Record the pre-execution chunk count on a RUNNING job
    ///
    /// # Errors
    /// `JobError::UnknownJob` when no such job exists.
    pub fn set_chunks_before(&self, job_id: Uuid, chunks_before: usize) -> JobResult<JobRecord> {
        let mut inner = self.lock();
        let mut record = inner
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(JobError::UnknownJob(job_id))?;
        record.chunks_before = Some(chunks_before);
        Self::commit(&mut inner, &self.log, record)
    }

    /// Append a progress record; counters only, no state change
    ///
    /// # Errors
    /// `JobError::UnknownJob` when no such job exists.
    pub fn record_progress(&self, job_id: Uuid, progress: JobProgress) -> JobResult<JobRecord> {
        let mut inner = self.lock();
        let mut record = inner
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(JobError::UnknownJob(job_id))?;
        record.progress = Some(progress);
        Self::commit(&mut inner, &self.log, record)
    }

    /// Move a RUNNING job to a terminal state
    ///
    /// # Errors
    /// `JobError::InvalidTransition` when the DAG forbids the move;
    /// `JobError::UnknownJob` when no such job exists.
    pub fn finish(
        &self,
        job_id: Uuid,
        status: JobStatus,
        chunks_after: Option<usize>,
        error: Option<String>,
    ) -> JobResult<JobRecord> {
        let mut inner = self.lock();
        let mut record = inner
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(JobError::UnknownJob(job_id))?;
        if !record.status.can_transition_to(status) {
            return Err(JobError::InvalidTransition {
                job_id,
                from: record.status.to_string(),
                to: status.to_string(),
            });
        }
        record.status = status;
        record.finished_at = Some(Utc::now());
        record.chunks_after = chunks_after;
        record.error = error;
        inner.cancel_tokens.remove(&job_id);
        let record = Self::commit(&mut inner, &self.log, record)?;
        self.log.maybe_compact()?;
        Ok(record)
    }

    /// Wait until a job is enqueued
    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }

    /// Wake the worker (used at startup when pending jobs were replayed)
    pub fn poke(&self) {
        self.notify.notify_one();
    }

    /// Whether any job is waiting
    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_then_cancel_while_pending() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(dir.path()).unwrap();

        let record = queue
            .enqueue(JobKind::IndexPath, serde_json::json!({"folder_path": "."}))
            .unwrap();
        let cancelled = queue.cancel(record.job_id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        // Cancelled job never reaches the worker
        assert!(queue.claim_next().unwrap().is_none());

        // Cancel is idempotent
        let again = queue.cancel(record.job_id).unwrap();
        assert_eq!(again.status, JobStatus::Cancelled);
    }

    #[test]
    fn fifo_claim_order() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(dir.path()).unwrap();

        let first = queue.enqueue(JobKind::IndexPath, serde_json::json!({})).unwrap();
        let second = queue.enqueue(JobKind::Reset, serde_json::json!({})).unwrap();

        let (claimed, _) = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.job_id, first.job_id);
        assert_eq!(claimed.status, JobStatus::Running);

        queue.finish(first.job_id, JobStatus::Done, Some(0), None).unwrap();
        let (claimed, _) = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.job_id, second.job_id);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(dir.path()).unwrap();
        let record = queue.enqueue(JobKind::IndexPath, serde_json::json!({})).unwrap();
        let (running, _) = queue.claim_next().unwrap().unwrap();
        queue.finish(running.job_id, JobStatus::Done, Some(5), None).unwrap();

        let result = queue.finish(record.job_id, JobStatus::Failed, None, None);
        assert!(matches!(result, Err(JobError::InvalidTransition { .. })));
    }

    #[test]
    fn running_jobs_fail_on_restart() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = {
            let queue = JobQueue::open(dir.path()).unwrap();
            queue.enqueue(JobKind::IndexPath, serde_json::json!({})).unwrap();
            let (running, _) = queue.claim_next().unwrap().unwrap();
            running.job_id
            // Queue dropped with the job still RUNNING - simulated crash
        };

        let reopened = JobQueue::open(dir.path()).unwrap();
        let record = reopened.get(job_id).unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error.as_deref(), Some(INTERRUPTED_BY_RESTART));
        // Not auto-resumed
        assert!(reopened.claim_next().unwrap().is_none());
    }

    #[test]
    fn pending_jobs_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = {
            let queue = JobQueue::open(dir.path()).unwrap();
            queue.enqueue(JobKind::IndexPath, serde_json::json!({})).unwrap().job_id
        };

        let reopened = JobQueue::open(dir.path()).unwrap();
        let (claimed, _) = reopened.claim_next().unwrap().unwrap();
        assert_eq!(claimed.job_id, job_id);
    }

    #[test]
    fn cancel_running_triggers_token() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(dir.path()).unwrap();
        queue.enqueue(JobKind::IndexPath, serde_json::json!({})).unwrap();
        let (running, token) = queue.claim_next().unwrap().unwrap();

        assert!(!token.is_cancelled());
        let still_running = queue.cancel(running.job_id).unwrap();
        assert_eq!(still_running.status, JobStatus::Running);
        assert!(token.is_cancelled());
    }

    #[test]
    fn unknown_job_errors() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(dir.path()).unwrap();
        assert!(matches!(
            queue.cancel(Uuid::new_v4()),
            Err(JobError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn watch_observes_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(dir.path()).unwrap();
        let record = queue.enqueue(JobKind::IndexPath, serde_json::json!({})).unwrap();
        let mut receiver = queue.watch(record.job_id).unwrap();

        let (running, _) = queue.claim_next().unwrap().unwrap();
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().status, JobStatus::Running);

        queue.finish(running.job_id, JobStatus::Done, Some(3), None).unwrap();
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().status, JobStatus::Done);
    }
}
