//! Ollama text-generation adapter

use super::TextGenerator;
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Text generator backed by a local Ollama server
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
}

impl OllamaGenerator {
    /// Create an adapter against `base_url` (default `http://localhost:11434`)
    ///
    /// # Errors
    /// Returns `ProviderError::Config` when the HTTP client cannot be built.
    pub fn new(base_url: Option<&str>, model: &str, timeout_secs: u64) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout_ms: timeout_secs.saturating_mul(1000),
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> ProviderResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
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
        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(ProviderError::InvalidResponse(format!("{url} returned {status}")));
        }

        let body: GenerateResponse = response.json().await.map_err(ProviderError::from)?;
        Ok(body.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
