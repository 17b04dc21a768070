//! Text-generation provider abstraction
//!
//! Used for chunk summarization and LLM graph extraction. Adapters exist
//! for Ollama's `/api/generate` and the OpenAI-compatible
//! `/v1/chat/completions` shape.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;

use crate::embedding::read_api_key;
use crate::error::ProviderResult;
use agent_brain_config::{GenerationProviderKind, SummarizationConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for LLM text generation providers
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`
    ///
    /// # Errors
    /// Returns `ProviderError` when the provider cannot be reached, times
    /// out, or answers with an unusable body.
    async fn generate(&self, prompt: &str) -> ProviderResult<String>;

    /// The model identifier in use
    fn model_name(&self) -> &str;
}

/// Type alias for a shared text generator
pub type TextGeneratorRef = Arc<dyn TextGenerator>;

/// Construct the generation provider selected by configuration
///
/// # Errors
/// Returns `ProviderError::Config` when a required API key variable is
/// missing or the HTTP client cannot be built.
pub fn build_text_generator(config: &SummarizationConfig) -> ProviderResult<TextGeneratorRef> {
    let api_key = read_api_key(config.api_key_env.as_deref())?;
    match config.provider {
        GenerationProviderKind::Ollama => Ok(Arc::new(OllamaGenerator::new(
            config.base_url.as_deref(),
            &config.model,
            config.timeout_secs,
        )?)),
        GenerationProviderKind::OpenAi => Ok(Arc::new(OpenAiGenerator::new(
            config.base_url.as_deref(),
            &config.model,
            config.timeout_secs,
            api_key,
        )?)),
    }
}
