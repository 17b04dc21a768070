//! Indexing job endpoints
//!
//! `POST /index` and `POST /index/add` enqueue indexing jobs (202 with a
//! `job_id`), `DELETE /index` enqueues a reset, and `/index/jobs` lists,
//! fetches and cancels jobs. `/index/add` refuses to enqueue while
//! another job is running.

use crate::error::ApiError;
use crate::state::SharedState;
use agent_brain_jobs::{JobKind, JobRecord, JobStatus};
use axum::Json;
use axum::extract::{Path, Query as UrlQuery, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 50;

/// `POST /index` request body
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexRequest {
    /// Folder to index, absolute or relative to the project root
    pub folder_path: String,
    /// Descend into subdirectories (default true)
    #[serde(default)]
    pub recursive: Option<bool>,
    /// Ingest code files (default true)
    #[serde(default)]
    pub include_code: Option<bool>,
    /// Chunk size override in tokens
    #[serde(default)]
    pub chunk_size: Option<usize>,
    /// Chunk overlap override in tokens
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
    /// Re-ingest unchanged files
    #[serde(default)]
    pub force: Option<bool>,
}

impl IndexRequest {
    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "folder_path": self.folder_path,
            "recursive": self.recursive.unwrap_or(true),
            "include_code": self.include_code.unwrap_or(true),
            "chunk_size": self.chunk_size,
            "chunk_overlap": self.chunk_overlap,
            "force": self.force.unwrap_or(false),
        })
    }

    fn validate(&self) -> Result<(), ApiError> {
        if self.folder_path.trim().is_empty() {
            return Err(ApiError::invalid_query("folder_path must not be empty")
                .with_hint("pass the folder to index, e.g. {\"folder_path\": \"./docs\"}"));
        }
        Ok(())
    }
}

/// 202 body carrying the enqueued job id
#[derive(Debug, Serialize)]
pub struct EnqueuedResponse {
    /// The enqueued job
    pub job_id: Uuid,
    /// Its initial status (always PENDING)
    pub status: JobStatus,
}

/// Handle `POST /index`
///
/// # Errors
/// 400 on an empty `folder_path`.
pub async fn enqueue_index(
    State(state): State<SharedState>,
    Json(request): Json<IndexRequest>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), ApiError> {
    request.validate()?;
    let record = state.queue.enqueue(JobKind::IndexPath, request.params())?;
    Ok((StatusCode::ACCEPTED, Json(enqueued(&record))))
}

/// Handle `POST /index/add`; refuses while a job is running
///
/// # Errors
/// 409 when another job is currently RUNNING.
pub async fn enqueue_add(
    State(state): State<SharedState>,
    Json(request): Json<IndexRequest>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), ApiError> {
    request.validate()?;
    if let Some(running) = state.queue.running_job() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "JobRunning",
            format!("job {} is already running", running.job_id),
        )
        .with_hint("wait for the current job or use POST /index to queue behind it"));
    }
    let record = state.queue.enqueue(JobKind::AddPath, request.params())?;
    Ok((StatusCode::ACCEPTED, Json(enqueued(&record))))
}

/// `DELETE /index` request body (optional)
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ResetRequest {
    /// Reserved filter hook; a full reset ignores it
    pub source_type: Option<String>,
}

/// Handle `DELETE /index`
///
/// # Errors
/// Surfaces queue persistence failures as 500.
pub async fn enqueue_reset(
    State(state): State<SharedState>,
    body: Option<Json<ResetRequest>>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), ApiError> {
    let params = body
        .map(|Json(request)| serde_json::json!({"source_type": request.source_type}))
        .unwrap_or_else(|| serde_json::json!({}));
    let record = state.queue.enqueue(JobKind::Reset, params)?;
    Ok((StatusCode::ACCEPTED, Json(enqueued(&record))))
}

fn enqueued(record: &JobRecord) -> EnqueuedResponse {
    EnqueuedResponse {
        job_id: record.job_id,
        status: record.status,
    }
}

/// `GET /index/jobs` query string
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ListJobsParams {
    /// Filter by status (PENDING, RUNNING, DONE, FAILED, CANCELLED)
    pub status: Option<String>,
    /// Page size (default 50)
    pub limit: Option<usize>,
    /// Return jobs created strictly before this RFC 3339 timestamp
    pub before: Option<DateTime<Utc>>,
}

/// `GET /index/jobs` response
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    /// Jobs, newest first
    pub jobs: Vec<JobRecord>,
    /// Cursor for the next page, when more jobs exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_before: Option<DateTime<Utc>>,
}

/// Handle `GET /index/jobs` with paging by `created_at`
///
/// # Errors
/// 400 on an unknown status filter value.
pub async fn list_jobs(
    State(state): State<SharedState>,
    UrlQuery(params): UrlQuery<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => Some(parse_status(raw)?),
    };

    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 500);
    let mut jobs = state.queue.list(status);
    if let Some(before) = params.before {
        jobs.retain(|job| job.created_at < before);
    }
    let next_before = (jobs.len() > limit).then(|| {
        jobs.get(limit - 1)
            .map(|job| job.created_at)
            .unwrap_or_default()
    });
    jobs.truncate(limit);
    Ok(Json(ListJobsResponse { jobs, next_before }))
}

fn parse_status(raw: &str) -> Result<JobStatus, ApiError> {
    match raw.to_ascii_uppercase().as_str() {
        "PENDING" => Ok(JobStatus::Pending),
        "RUNNING" => Ok(JobStatus::Running),
        "DONE" => Ok(JobStatus::Done),
        "FAILED" => Ok(JobStatus::Failed),
        "CANCELLED" => Ok(JobStatus::Cancelled),
        other => Err(ApiError::invalid_query(format!("unknown status filter: {other}"))),
    }
}

/// Handle `GET /index/jobs/{id}`
///
/// # Errors
/// 404 for an unknown job id.
pub async fn get_job(
    State(state): State<SharedState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobRecord>, ApiError> {
    state
        .queue
        .get(job_id)
        .map(Json)
        .ok_or_else(|| ApiError::unknown_job(format!("no job {job_id}")))
}

/// Handle `POST /index/jobs/{id}/cancel`; idempotent
///
/// # Errors
/// 404 for an unknown job id.
pub async fn cancel_job(
    State(state): State<SharedState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobRecord>, ApiError> {
    Ok(Json(state.queue.cancel(job_id)?))
}
