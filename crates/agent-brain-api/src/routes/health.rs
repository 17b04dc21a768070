//! Health and status endpoints
//!
//! `GET /health` reports liveness, capability flags and the embedding
//! model in effect; it turns unhealthy when the stored embedding
//! metadata conflicts with configuration. `GET /health/status` reports
//! index counts and the current job.

use crate::error::ApiError;
use crate::state::{Capabilities, SharedState};
use agent_brain_storage::Filters;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use uuid::Uuid;

/// `GET /health` response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "unhealthy"
    pub status: String,
    /// Crate version
    pub version: String,
    /// Serving mode
    pub mode: String,
    /// Stable project instance id
    pub instance_id: String,
    /// Optional capabilities in effect
    pub capabilities: Capabilities,
    /// Embedding model identifier
    pub embedding_model: String,
    /// Embedding dimension
    pub embedding_dimension: usize,
    /// Index mutation epoch
    pub index_epoch: u64,
    /// Fatal startup condition, when unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /health/status` response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Chunks currently stored
    pub total_chunks: usize,
    /// Whether a job is RUNNING right now
    pub indexing_in_progress: bool,
    /// The RUNNING job's id, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job_id: Option<Uuid>,
}

/// Handle `GET /health`
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let dimension_error = state.dimension_error();
    Json(HealthResponse {
        status: if dimension_error.is_none() { "ok" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: "http".to_string(),
        instance_id: state.instance_id.clone(),
        capabilities: state.capabilities,
        embedding_model: state.embedding_model.clone(),
        embedding_dimension: state.embedding_dim,
        index_epoch: state.service.epoch(),
        error: dimension_error,
    })
}

/// Handle `GET /health/status`
///
/// # Errors
/// 503 when the backend cannot be counted.
pub async fn status(State(state): State<SharedState>) -> Result<Json<StatusResponse>, ApiError> {
    let total_chunks = state.backend.get_count(&Filters::none()).await?;
    let running = state.queue.running_job();
    Ok(Json(StatusResponse {
        total_chunks,
        indexing_in_progress: running.is_some(),
        current_job_id: running.map(|job| job.job_id),
    }))
}
