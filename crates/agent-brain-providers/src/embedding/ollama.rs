//! Ollama embedding adapter
//!
//! Speaks Ollama's `/api/embeddings` endpoint, one prompt per request.

use super::EmbeddingProvider;
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

/// Embedding provider backed by a local Ollama server
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout_ms: u64,
}

impl OllamaEmbedder {
    /// Create an adapter against `base_url` (default `http://localhost:11434`)
    ///
    /// # Errors
    /// Returns `ProviderError::Config` when the HTTP client cannot be built.
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        dimension: usize,
        timeout_secs: u64,
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
        })
    }

    async fn embed_one(&self, text: &str) -> ProviderResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingsRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| classify(e, self.timeout_ms))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(ProviderError::InvalidResponse(format!("{url} returned {status}")));
        }

        let body: EmbeddingsResponse = response.json().await.map_err(ProviderError::from)?;
        if body.embedding.len() != self.dimension {
            return Err(ProviderError::InvalidResponse(format!(
                "model {} produced dimension {} but {} is configured",
                self.model,
                body.embedding.len(),
                self.dimension
            )));
        }
        Ok(body.embedding)
    }
}

fn classify(err: reqwest::Error, timeout_ms: u64) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            context: err.to_string(),
            timeout_ms,
        }
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> ProviderResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn is_ready(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embeds_through_the_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(body_partial_json(serde_json::json!({"model": "nomic-embed-text"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": [0.1, 0.2, 0.3]
            })))
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(Some(&server.uri()), "nomic-embed-text", 3, 5).unwrap();
        let result = embedder.embed_batch(&["hello"]).await.unwrap();
        assert_eq!(result, vec![vec![0.1, 0.2, 0.3]]);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": [0.1, 0.2]
            })))
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(Some(&server.uri()), "m", 3, 5).unwrap();
        let result = embedder.embed_batch(&["hello"]).await;
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(Some(&server.uri()), "m", 3, 5).unwrap();
        let err = embedder.embed_batch(&["hello"]).await.unwrap_err();
        assert!(err.is_transient());
    }
}
