//! Query endpoint
//!
//! `POST /query` executes a retrieval request and returns ranked results
//! with sources and per-mode scores. While the embedding-metadata guard
//! is tripped the endpoint answers 503 until the project is reset.

use crate::error::ApiError;
use crate::state::SharedState;
use agent_brain_retrieval::{Query, QueryResponse, RankedChunk};
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// `POST /query` response
#[derive(Debug, Serialize)]
pub struct QueryResponseBody {
    /// Ranked results, best first
    pub results: Vec<RankedChunk>,
    /// Number of results returned
    pub total: usize,
    /// The mode that produced them
    pub mode: String,
    /// Whether the rerank stage degraded to stage-1 ordering
    pub rerank_degraded: bool,
}

impl From<QueryResponse> for QueryResponseBody {
    fn from(response: QueryResponse) -> Self {
        Self {
            total: response.results.len(),
            mode: response.mode.to_string(),
            rerank_degraded: response.rerank_degraded,
            results: response.results,
        }
    }
}

/// Handle `POST /query`
///
/// # Errors
/// 400 for invalid queries/filters and missing capabilities, 503 while
/// the dimension guard is tripped or the backend is unavailable.
pub async fn query(
    State(state): State<SharedState>,
    Json(request): Json<Query>,
) -> Result<Json<QueryResponseBody>, ApiError> {
    if let Some(error) = state.dimension_error() {
        return Err(ApiError::dimension_mismatch(error));
    }
    let response = state.engine.query(&request).await?;
    Ok(Json(response.into()))
}
