//! Agent Brain provider adapters
//!
//! Pluggable adapters for embedding generation, LLM text generation and
//! reranking. Provider kinds are tagged variants resolved at startup from
//! configuration; unknown kinds fail config validation, not first use.

pub mod embedding;
pub mod error;
pub mod generation;
pub mod rerank;

pub use embedding::{
    EmbeddingProvider, EmbeddingProviderRef, MockEmbedder, OllamaEmbedder, OpenAiEmbedder,
    build_embedding_provider, embed_all,
};
pub use error::{ProviderError, ProviderResult};
pub use generation::{
    OllamaGenerator, OpenAiGenerator, TextGenerator, TextGeneratorRef, build_text_generator,
};
pub use rerank::{HttpReranker, RerankProvider, RerankProviderRef};
