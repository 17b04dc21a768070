//! OpenAI-compatible chat-completions adapter

use super::TextGenerator;
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Text generator speaking the OpenAI-compatible chat API
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
    api_key: Option<String>,
}

impl OpenAiGenerator {
    /// Create an adapter against `base_url` (default `https://api.openai.com/v1`)
    ///
    /// # Errors
    /// Returns `ProviderError::Config` when the HTTP client cannot be built.
    pub fn new(
        base_url: Option<&str>,
        model: &str,
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
            timeout_ms: timeout_secs.saturating_mul(1000),
            api_key,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> ProviderResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(&ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
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

        let body: ChatResponse = response.json().await.map_err(ProviderError::from)?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn extracts_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hello back"}}]
            })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(Some(&server.uri()), "gpt-4o-mini", 5, None).unwrap();
        assert_eq!(generator.generate("hi").await.unwrap(), "hello back");
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(Some(&server.uri()), "m", 5, None).unwrap();
        assert!(matches!(
            generator.generate("hi").await,
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
