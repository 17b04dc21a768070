//! Rerank provider abstraction
//!
//! A rerank provider scores `(query, document)` pairs; the retrieval
//! engine reorders stage-1 results by those scores. Failures never fail
//! the query - the engine degrades to stage-1 ordering.

use crate::error::{ProviderError, ProviderResult};
use agent_brain_config::RerankConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Trait for rerank providers
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Score each document's relevance to `query`
    ///
    /// Returns one score per document, in document order.
    ///
    /// # Errors
    /// Returns `ProviderError` when the provider cannot be reached, times
    /// out, or answers with an unusable body. Callers treat every error as
    /// a degradation signal, never a query failure.
    async fn rerank(&self, query: &str, documents: &[&str]) -> ProviderResult<Vec<f32>>;

    /// The model identifier in use, if any
    fn model_name(&self) -> Option<&str>;
}

/// Type alias for a shared rerank provider
pub type RerankProviderRef = Arc<dyn RerankProvider>;

#[derive(Serialize)]
struct RerankRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    query: &'a str,
    documents: &'a [&'a str],
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// HTTP rerank adapter speaking the common `/rerank` shape
/// (Cohere/Jina-style request and response bodies)
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
    model: Option<String>,
    timeout_ms: u64,
}

impl HttpReranker {
    /// Create an adapter from the rerank configuration section
    ///
    /// # Errors
    /// Returns `ProviderError::Config` when no base URL is configured or
    /// the HTTP client cannot be built.
    pub fn from_config(config: &RerankConfig) -> ProviderResult<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| ProviderError::Config("rerank.base_url is required".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_ms: config.timeout_ms,
        })
    }
}

#[async_trait]
impl RerankProvider for HttpReranker {
    async fn rerank(&self, query: &str, documents: &[&str]) -> ProviderResult<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/rerank", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RerankRequest {
                model: self.model.as_deref(),
                query,
                documents,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        context: e.to_string(),
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    ProviderError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!("{url} returned {status}")));
        }

        let body: RerankResponse = response.json().await.map_err(ProviderError::from)?;
        let mut scores = vec![0.0_f32; documents.len()];
        for result in body.results {
            match scores.get_mut(result.index) {
                Some(slot) => *slot = result.relevance_score,
                None => {
                    return Err(ProviderError::InvalidResponse(format!(
                        "rerank index {} out of range for {} documents",
                        result.index,
                        documents.len()
                    )));
                }
            }
        }
        Ok(scores)
    }

    fn model_name(&self) -> Option<&str> {
        self.model.as_deref()
    }
}
