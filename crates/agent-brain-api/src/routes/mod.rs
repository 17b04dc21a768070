//! HTTP route assembly

pub mod health;
pub mod jobs;
pub mod query;

use crate::state::SharedState;
use axum::Router;
use axum::routing::{get, post};

/// Build the full application router
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/status", get(health::status))
        .route("/query", post(query::query))
        .route("/index", post(jobs::enqueue_index).delete(jobs::enqueue_reset))
        .route("/index/add", post(jobs::enqueue_add))
        .route("/index/jobs", get(jobs::list_jobs))
        .route("/index/jobs/{id}", get(jobs::get_job))
        .route("/index/jobs/{id}/cancel", post(jobs::cancel_job))
        .with_state(state)
}
