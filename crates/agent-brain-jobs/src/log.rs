//! Append-only job log
//!
//! One JSON object per line, one record per state transition; the newest
//! record for a `job_id` defines its current state. The log lives at
//! `{state_dir}/jobs/jobs.log`. Once it grows past a threshold it is
//! compacted: rewritten with only the newest record per job, via
//! write-then-rename so tailing readers never observe a transition twice.

use crate::error::JobResult;
use crate::model::JobRecord;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const LOG_FILE: &str = "jobs.log";

/// Compact once the log exceeds this size
const COMPACTION_THRESHOLD_BYTES: u64 = 4 * 1024 * 1024;

/// Append-only JSONL store of job state transitions
pub struct JobLog {
    path: PathBuf,
}

impl JobLog {
    /// Open (or create) the log under `dir`
    ///
    /// # Errors
    /// Surfaces directory-creation failures.
    pub fn open(dir: &Path) -> JobResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(LOG_FILE),
        })
    }

    /// The log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and fsync
    ///
    /// # Errors
    /// Surfaces I/O and serialization failures.
    pub fn append(&self, record: &JobRecord) -> JobResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Replay the log into latest-state per job, in first-seen order
    ///
    /// Malformed lines (torn writes from a crash) are skipped with a
    /// warning rather than poisoning the whole log.
    ///
    /// # Errors
    /// Surfaces I/O failures reading the file.
    pub fn replay(&self) -> JobResult<(Vec<Uuid>, HashMap<Uuid, JobRecord>)> {
        let mut order: Vec<Uuid> = Vec::new();
        let mut latest: HashMap<Uuid, JobRecord> = HashMap::new();

        if !self.path.exists() {
            return Ok((order, latest));
        }

        let contents = std::fs::read_to_string(&self.path)?;
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JobRecord>(line) {
                Ok(record) => {
                    if !latest.contains_key(&record.job_id) {
                        order.push(record.job_id);
                    }
                    latest.insert(record.job_id, record);
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed job log line: {e}");
                }
            }
        }
        Ok((order, latest))
    }

    /// Compact the log if it has outgrown the threshold
    ///
    /// # Errors
    /// Surfaces I/O failures; a failed compaction leaves the original
    /// log untouched.
    pub fn maybe_compact(&self) -> JobResult<bool> {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            return Ok(false);
        };
        if metadata.len() < COMPACTION_THRESHOLD_BYTES {
            return Ok(false);
        }
        self.compact()?;
        Ok(true)
    }

    /// Rewrite the log keeping only the newest record per job
    ///
    /// # Errors
    /// Surfaces I/O and serialization failures.
    pub fn compact(&self) -> JobResult<()> {
        let (order, latest) = self.replay()?;
        let mut contents = String::new();
        for job_id in &order {
            if let Some(record) = latest.get(job_id) {
                contents.push_str(&serde_json::to_string(record)?);
                contents.push('\n');
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents.as_bytes())?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobKind, JobStatus};

    #[test]
    fn newest_record_wins_on_replay() {
        let dir = tempfile::tempdir().unwrap();
        let log = JobLog::open(dir.path()).unwrap();

        let mut record = JobRecord::new(JobKind::IndexPath, serde_json::json!({}));
        log.append(&record).unwrap();
        record.status = JobStatus::Running;
        log.append(&record).unwrap();
        record.status = JobStatus::Done;
        log.append(&record).unwrap();

        let (order, latest) = log.replay().unwrap();
        assert_eq!(order.len(), 1);
        assert_eq!(latest[&record.job_id].status, JobStatus::Done);
    }

    #[test]
    fn replay_preserves_enqueue_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = JobLog::open(dir.path()).unwrap();

        let first = JobRecord::new(JobKind::IndexPath, serde_json::json!({}));
        let second = JobRecord::new(JobKind::Reset, serde_json::json!({}));
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let (order, _) = log.replay().unwrap();
        assert_eq!(order, vec![first.job_id, second.job_id]);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = JobLog::open(dir.path()).unwrap();
        let record = JobRecord::new(JobKind::IndexPath, serde_json::json!({}));
        log.append(&record).unwrap();

        // Simulate a torn write from a crash
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap();
        file.write_all(b"{\"job_id\": \"truncat").unwrap();
        drop(file);

        let (order, _) = log.replay().unwrap();
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn compaction_keeps_one_record_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let log = JobLog::open(dir.path()).unwrap();

        let mut record = JobRecord::new(JobKind::IndexPath, serde_json::json!({}));
        log.append(&record).unwrap();
        record.status = JobStatus::Running;
        log.append(&record).unwrap();
        record.status = JobStatus::Done;
        log.append(&record).unwrap();

        log.compact().unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        let (_, latest) = log.replay().unwrap();
        assert_eq!(latest[&record.job_id].status, JobStatus::Done);
    }
}
