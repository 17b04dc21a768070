//! HTTP error mapping
//!
//! The shell maps the core's error taxonomy to status codes and
//! `{error_kind, message, hint}` bodies: 400 invalid input, 404 unknown
//! job, 409 conflict, 503 backend not ready, 500 unexpected.

use agent_brain_jobs::JobError;
use agent_brain_retrieval::RetrievalError;
use agent_brain_storage::StorageError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable kind
    pub error_kind: String,
    /// Human-readable message
    pub message: String,
    /// Short actionable hint, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// An HTTP-mappable error
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    /// Build an error with an explicit status and kind
    pub fn new(status: StatusCode, error_kind: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error_kind: error_kind.to_string(),
                message: message.into(),
                hint: None,
            },
        }
    }

    /// Attach an actionable hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.body.hint = Some(hint.into());
        self
    }

    /// 400 with kind `InvalidQuery`
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidQuery", message)
    }

    /// 404 with kind `UnknownJob`
    pub fn unknown_job(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "UnknownJob", message)
    }

    /// 503 with kind `StorageDimensionMismatch`
    pub fn dimension_mismatch(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "StorageDimensionMismatch",
            message,
        )
        .with_hint("reset the project index before switching embedding models")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        match &err {
            RetrievalError::InvalidQuery(_) => {
                Self::new(StatusCode::BAD_REQUEST, "InvalidQuery", err.to_string())
            }
            RetrievalError::InvalidFilter(_) => {
                Self::new(StatusCode::BAD_REQUEST, "InvalidFilter", err.to_string())
            }
            RetrievalError::GraphDisabled => {
                Self::new(StatusCode::BAD_REQUEST, "GraphDisabled", err.to_string())
                    .with_hint("set graph.enabled: true and run a rebuild_graph job")
            }
            RetrievalError::RerankDisabled => {
                Self::new(StatusCode::BAD_REQUEST, "RerankDisabled", err.to_string())
                    .with_hint("set rerank.enabled: true with a rerank.base_url")
            }
            RetrievalError::DeadlineExceeded { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DeadlineExceeded",
                err.to_string(),
            ),
            RetrievalError::Storage(storage) => storage_error(storage, err.to_string()),
            RetrievalError::Provider(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "ProviderUnavailable",
                err.to_string(),
            ),
            RetrievalError::Other(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal",
                err.to_string(),
            ),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match &err {
            JobError::UnknownJob(_) => Self::unknown_job(err.to_string()),
            JobError::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "InvalidTransition", err.to_string())
            }
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal", err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        storage_error(&err, err.to_string())
    }
}

fn storage_error(err: &StorageError, message: String) -> ApiError {
    match err {
        StorageError::DimensionMismatch { .. } => ApiError::dimension_mismatch(message),
        StorageError::InvalidFilter(_) => {
            ApiError::new(StatusCode::BAD_REQUEST, "InvalidFilter", message)
        }
        StorageError::Unavailable(_) | StorageError::NotInitialized => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "StorageUnavailable",
            message,
        )
        .with_hint("check that the storage backend is reachable"),
        _ => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_errors_map_to_contracted_statuses() {
        let cases: Vec<(RetrievalError, StatusCode)> = vec![
            (
                RetrievalError::InvalidQuery("empty".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (RetrievalError::GraphDisabled, StatusCode::BAD_REQUEST),
            (
                RetrievalError::Storage(StorageError::Unavailable("down".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RetrievalError::DeadlineExceeded { timeout_ms: 30000 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, expected);
        }
    }

    #[test]
    fn graph_disabled_carries_a_hint() {
        let api: ApiError = RetrievalError::GraphDisabled.into();
        assert!(api.body.hint.is_some());
        assert_eq!(api.body.error_kind, "GraphDisabled");
    }

    #[test]
    fn dimension_mismatch_is_503() {
        let err = StorageError::DimensionMismatch {
            stored_model: "a".to_string(),
            stored_dimension: 768,
            configured_model: "b".to_string(),
            configured_dimension: 1024,
        };
        let api: ApiError = err.into();
        assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api.body.error_kind, "StorageDimensionMismatch");
    }
}
