//! Embedding provider abstraction
//!
//! This module provides trait abstractions for embedding providers,
//! enabling pluggable implementations and better testability.

pub mod mock;
pub mod ollama;
pub mod openai;

pub use mock::MockEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

use crate::error::{ProviderError, ProviderResult};
use agent_brain_config::{EmbeddingConfig, EmbeddingProviderKind};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Trait for embedding generation providers
///
/// Abstracts embedding generation so local mocks and remote API services
/// can be used interchangeably.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts
    ///
    /// Returns one embedding per input text, in input order.
    ///
    /// # Errors
    /// Returns `ProviderError` when the provider cannot be reached, times
    /// out, or answers with an unusable body.
    async fn embed_batch(&self, texts: &[&str]) -> ProviderResult<Vec<Vec<f32>>>;

    /// Dimensionality of embeddings produced by this provider
    fn dimension(&self) -> usize;

    /// The model identifier in use
    fn model_name(&self) -> &str;

    /// Check whether the provider answers at all
    async fn is_ready(&self) -> bool;
}

/// Type alias for a shared embedding provider
pub type EmbeddingProviderRef = Arc<dyn EmbeddingProvider>;

/// Construct the embedding provider selected by configuration
///
/// API keys are read from the environment variable named by
/// `api_key_env`; the configuration file never holds the key itself.
///
/// # Errors
/// Returns `ProviderError::Config` when a required API key variable is
/// missing or the HTTP client cannot be built.
pub fn build_embedding_provider(config: &EmbeddingConfig) -> ProviderResult<EmbeddingProviderRef> {
    let api_key = read_api_key(config.api_key_env.as_deref())?;
    match config.provider {
        EmbeddingProviderKind::Mock => Ok(Arc::new(MockEmbedder::new(
            &config.model,
            config.dimension,
        ))),
        EmbeddingProviderKind::Ollama => Ok(Arc::new(OllamaEmbedder::new(
            config.base_url.as_deref(),
            &config.model,
            config.dimension,
            config.timeout_secs,
        )?)),
        EmbeddingProviderKind::OpenAi => Ok(Arc::new(OpenAiEmbedder::new(
            config.base_url.as_deref(),
            &config.model,
            config.dimension,
            config.timeout_secs,
            api_key,
        )?)),
    }
}

pub(crate) fn read_api_key(api_key_env: Option<&str>) -> ProviderResult<Option<String>> {
    match api_key_env {
        None => Ok(None),
        Some(var) => std::env::var(var).map(Some).map_err(|_| {
            ProviderError::Config(format!("API key environment variable {var} is not set"))
        }),
    }
}

/// Embed all `texts`, batched per provider request, with bounded fan-out
///
/// Batches run concurrently up to `concurrency`; output order matches
/// input order regardless of completion order.
///
/// # Errors
/// Fails on the first batch whose retries are exhausted.
pub async fn embed_all(
    provider: &EmbeddingProviderRef,
    texts: &[String],
    batch_size: usize,
    concurrency: usize,
) -> ProviderResult<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let batches: Vec<(usize, Vec<String>)> = texts
        .chunks(batch_size)
        .enumerate()
        .map(|(i, chunk)| (i, chunk.to_vec()))
        .collect();

    let mut results: Vec<(usize, Vec<Vec<f32>>)> = stream::iter(batches)
        .map(|(index, batch)| {
            let provider = Arc::clone(provider);
            async move {
                let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
                let policy = agent_brain_common::RetryPolicy::default();
                let embeddings = agent_brain_common::retry_with_backoff(
                    policy,
                    ProviderError::is_transient,
                    || provider.embed_batch(&refs),
                )
                .await?;
                Ok::<_, ProviderError>((index, embeddings))
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<ProviderResult<Vec<_>>>()?;

    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().flat_map(|(_, batch)| batch).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_all_preserves_input_order() {
        let provider: EmbeddingProviderRef = Arc::new(MockEmbedder::new("test", 16));
        let texts: Vec<String> = (0..20).map(|i| format!("text number {i}")).collect();

        let sequential = embed_all(&provider, &texts, 1, 1).await.unwrap();
        let parallel = embed_all(&provider, &texts, 3, 8).await.unwrap();

        assert_eq!(sequential.len(), 20);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn missing_api_key_env_is_a_config_error() {
        let result = read_api_key(Some("AGENT_BRAIN_TEST_KEY_THAT_DOES_NOT_EXIST"));
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }
}
