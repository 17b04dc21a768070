//! Job domain model
//!
//! A job is a unit of asynchronous work. Its lifecycle forms the DAG
//! PENDING -> RUNNING -> {DONE | FAILED | CANCELLED}; no backward
//! transitions. The newest log record for a `job_id` defines its current
//! state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason string recorded on jobs killed by a restart
pub const INTERRUPTED_BY_RESTART: &str = "InterruptedByRestart";

/// What kind of work a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Index a folder (upserting changed files)
    IndexPath,
    /// Add-only indexing of a folder
    AddPath,
    /// Re-run graph extraction over the stored corpus
    RebuildGraph,
    /// Drop all chunks (and graph triples)
    Reset,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::IndexPath => "index_path",
            Self::AddPath => "add_path",
            Self::RebuildGraph => "rebuild_graph",
            Self::Reset => "reset",
        };
        write!(f, "{kind}")
    }
}

/// Status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether the status is terminal
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Whether the DAG permits moving from `self` to `to`
    pub const fn can_transition_to(self, to: Self) -> bool {
        match self {
            Self::Pending => matches!(to, Self::Running | Self::Cancelled | Self::Failed),
            Self::Running => matches!(to, Self::Done | Self::Failed | Self::Cancelled),
            Self::Done | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{status}")
    }
}

/// Progress counters emitted by handlers; counter fields only, no state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Files the handler has fully processed
    pub files_processed: usize,
    /// Files skipped (unchanged, unsupported, binary)
    pub files_skipped: usize,
    /// Chunks written so far
    pub chunks_written: usize,
}

/// One job record; the newest record per `job_id` is authoritative
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier
    pub job_id: Uuid,
    /// What the job does
    pub kind: JobKind,
    /// Current status
    pub status: JobStatus,
    /// Kind-specific inputs
    #[serde(default)]
    pub params: serde_json::Value,
    /// When the job was enqueued
    pub created_at: DateTime<Utc>,
    /// When the worker picked it up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Chunk count before execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_before: Option<usize>,
    /// Chunk count after execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_after: Option<usize>,
    /// Failure or cancellation reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Latest progress counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
}

impl JobRecord {
    /// Create a freshly enqueued record
    pub fn new(kind: JobKind, params: serde_json::Value) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            kind,
            status: JobStatus::Pending,
            params,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            chunks_before: None,
            chunks_after: None,
            error: None,
            progress: None,
        }
    }

    /// Whether the enqueue request set `force = true`
    pub fn is_forced(&self) -> bool {
        self.params
            .get("force")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_dag_is_monotonic() {
        use JobStatus::{Cancelled, Done, Failed, Pending, Running};

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Done));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Cancelled));

        // No backward or post-terminal transitions
        assert!(!Running.can_transition_to(Pending));
        assert!(!Done.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Done));
        assert!(!Cancelled.can_transition_to(Running));
        assert!(!Done.can_transition_to(Failed));
    }

    #[test]
    fn record_serializes_with_uppercase_status() {
        let record = JobRecord::new(JobKind::IndexPath, serde_json::json!({"folder_path": "."}));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"PENDING\""));
        assert!(json.contains("\"index_path\""));
    }

    #[test]
    fn force_flag_defaults_false() {
        let record = JobRecord::new(JobKind::IndexPath, serde_json::json!({}));
        assert!(!record.is_forced());
        let forced = JobRecord::new(JobKind::IndexPath, serde_json::json!({"force": true}));
        assert!(forced.is_forced());
    }
}
