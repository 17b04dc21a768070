//! OpenAI-compatible embedding adapter
//!
//! Speaks the `/v1/embeddings` shape used by OpenAI and the many servers
//! that imitate it.

use super::EmbeddingProvider;
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding provider speaking the OpenAI-compatible HTTP API
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout_ms: u64,
    api_key: Option<String>,
}

impl OpenAiEmbedder {
    /// Create an adapter against `base_url` (default `https://api.openai.com/v1`)
    ///
    /// # Errors
    /// Returns `ProviderError::Config` when the HTTP client cannot be built.
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        dimension: usize,
        timeout_secs: u64,
        api_key: Option<String>,
    ) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
            timeout_ms: timeout_secs.saturating_mul(1000),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> ProviderResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&EmbeddingsRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
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
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth(format!("{url} returned {status}")));
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::Unavailable(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(ProviderError::InvalidResponse(format!("{url} returned {status}")));
        }

        let body: EmbeddingsResponse = response.json().await.map_err(ProviderError::from)?;
        if body.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "requested {} embeddings, received {}",
                texts.len(),
                body.data.len()
            )));
        }

        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        for datum in &data {
            if datum.embedding.len() != self.dimension {
                return Err(ProviderError::InvalidResponse(format!(
                    "model {} produced dimension {} but {} is configured",
                    self.model,
                    datum.embedding.len(),
                    self.dimension
                )));
            }
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn is_ready(&self) -> bool {
        // A HEAD against the models listing answers cheaply on compatible servers.
        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embeds_a_batch_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.4, 0.5]},
                    {"index": 0, "embedding": [0.1, 0.2]}
                ]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(
            Some(&server.uri()),
            "text-embedding-3-small",
            2,
            5,
            Some("sk-test".to_string()),
        )
        .unwrap();
        let result = embedder.embed_batch(&["a", "b"]).await.unwrap();
        // Out-of-order response data comes back sorted by index
        assert_eq!(result, vec![vec![0.1, 0.2], vec![0.4, 0.5]]);
    }

    #[tokio::test]
    async fn unauthorized_is_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(Some(&server.uri()), "m", 2, 5, None).unwrap();
        let err = embedder.embed_batch(&["a"]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn rate_limiting_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(Some(&server.uri()), "m", 2, 5, None).unwrap();
        let err = embedder.embed_batch(&["a"]).await.unwrap_err();
        assert!(err.is_transient());
    }
}
