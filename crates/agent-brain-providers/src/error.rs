//! Error types for provider adapters

use thiserror::Error;

/// Result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by embedding, generation and rerank providers
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider endpoint could not be reached or returned a 5xx
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider did not answer within the configured timeout
    #[error("Provider timed out after {timeout_ms}ms: {context}")]
    Timeout { context: String, timeout_ms: u64 },

    /// The provider answered with a body we could not interpret
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Authentication/authorization failure (bad or missing API key)
    #[error("Provider authentication failed: {0}")]
    Auth(String),

    /// Provider was constructed with unusable parameters
    #[error("Provider configuration error: {0}")]
    Config(String),

    /// Generic error for other cases
    #[error("Other error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether a retry under the shared backoff policy makes sense
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                context: err.to_string(),
                timeout_ms: 0,
            }
        } else if err.is_connect() || err.is_request() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
