//! Centralized configuration management for Agent Brain
//!
//! Configuration is loaded once at process start from a YAML file resolved
//! through a fixed search stack (explicit path, environment variable,
//! project-local file, walk-up discovery, user-global file, built-in
//! defaults), then overlaid with `AGENT_BRAIN_*` scalar environment
//! overrides and validated strictly: unknown keys and missing
//! backend-specific parameters are startup-time errors, never first-use
//! surprises.

pub mod error;
pub mod resolve;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use resolve::{ConfigSource, resolve_config};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// SAFE DEFAULTS - Work for any environment (dev, staging, prod, test)
// =============================================================================

// Server defaults
const DEFAULT_SERVER_HOST: &str = "127.0.0.1"; // Localhost only for security
const DEFAULT_SERVER_PORT: u16 = 0; // 0 = OS-assigned free port
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

// Indexing defaults
const DEFAULT_CHUNK_SIZE_TOKENS: usize = 512;
const DEFAULT_CHUNK_OVERLAP_TOKENS: usize = 64;
const DEFAULT_EMBED_CONCURRENCY: usize = 8; // Bounded fan-out within a job

// Embedding defaults
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 16;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;

// Graph defaults
const DEFAULT_MAX_TRIPLETS_PER_CHUNK: usize = 10;
const DEFAULT_TRAVERSAL_DEPTH: usize = 2;

// Rerank defaults
const DEFAULT_RERANK_TIMEOUT_MS: u64 = 10_000;

// Retrieval defaults
const DEFAULT_QUERY_CACHE_SIZE: usize = 100;

// Relational backend defaults
const DEFAULT_HNSW_M: u32 = 16;
const DEFAULT_HNSW_EF_CONSTRUCTION: u32 = 64;

/// Name of the per-project state directory
pub const STATE_DIR_NAME: &str = ".agent-brain";

/// Environment variable naming an explicit config file path
pub const CONFIG_PATH_ENV: &str = "AGENT_BRAIN_CONFIG";

/// Project-local config file, relative to the project root
pub const PROJECT_CONFIG_RELPATH: &str = ".config/agent-brain.yaml";

/// Top-level configuration for a project instance
///
/// Every section has safe defaults; a missing file yields a fully usable
/// embedded-backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BrainConfig {
    /// Storage backend selection and parameters
    pub storage: StorageConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Optional LLM summarization of chunks
    pub summarization: Option<SummarizationConfig>,

    /// Knowledge-graph extraction configuration
    pub graph: GraphConfig,

    /// Two-stage reranker configuration
    pub rerank: RerankConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Chunking and pipeline configuration
    pub indexing: IndexingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Storage backend choice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// Local persistent vector store + serialized keyword index
    #[default]
    Embedded,
    /// SQL store with vector-index extension and full-text search
    Postgres,
}

/// Distance metric for vector search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance, normalized as `1 - d/2`
    #[default]
    Cosine,
    /// Euclidean distance, normalized as `1/(1+d)`
    L2,
    /// Inner product, normalized through a sigmoid
    InnerProduct,
}

/// Storage section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    /// Which backend stores chunks and serves search
    pub backend: StorageBackendKind,

    /// Distance metric used for vector similarity
    pub metric: DistanceMetric,

    /// Relational backend parameters (required when `backend = postgres`)
    pub postgres: Option<PostgresConfig>,
}

/// Relational backend parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    /// Connection URL (e.g. `postgres://user@localhost/agent_brain`)
    pub url: String,

    /// HNSW graph degree
    #[serde(default = "default_hnsw_m")]
    pub hnsw_m: u32,

    /// HNSW build-time candidate list size
    #[serde(default = "default_hnsw_ef_construction")]
    pub hnsw_ef_construction: u32,

    /// Maximum connections in the pool
    #[serde(default = "default_pg_max_connections")]
    pub max_connections: u32,
}

const fn default_hnsw_m() -> u32 {
    DEFAULT_HNSW_M
}

const fn default_hnsw_ef_construction() -> u32 {
    DEFAULT_HNSW_EF_CONSTRUCTION
}

const fn default_pg_max_connections() -> u32 {
    5
}

/// Embedding provider kind - defines where embeddings are generated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Deterministic in-process embedder (tests, offline use)
    Mock,
    /// Local Ollama server
    #[default]
    Ollama,
    /// OpenAI-compatible HTTP API
    OpenAi,
}

/// Text-generation provider kind (summaries, graph extraction)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProviderKind {
    /// Local Ollama server
    #[default]
    Ollama,
    /// OpenAI-compatible HTTP API
    OpenAi,
}

/// Embedding section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EmbeddingConfig {
    /// Provider adapter to construct
    pub provider: EmbeddingProviderKind,

    /// Model identifier passed to the provider
    pub model: String,

    /// Embedding dimension produced by the model; fixed per project
    pub dimension: usize,

    /// Environment variable holding the API key (never inlined in the file)
    pub api_key_env: Option<String>,

    /// Provider base URL override
    pub base_url: Option<String>,

    /// Texts per provider request
    pub batch_size: usize,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            api_key_env: None,
            base_url: None,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
        }
    }
}

/// Summarization section - same shape as embedding but for text generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummarizationConfig {
    /// Provider adapter to construct
    pub provider: GenerationProviderKind,

    /// Model identifier passed to the provider
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Provider base URL override
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-call timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

const fn default_provider_timeout() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

/// Graph section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GraphConfig {
    /// Whether graph extraction and graph-mode queries are available
    pub enabled: bool,

    /// Upper bound on triples emitted per chunk by the LLM extractor
    pub max_triplets_per_chunk: usize,

    /// Default traversal depth for graph-mode queries
    pub traversal_depth: usize,

    /// Run the LLM extractor (requires a generation provider)
    pub use_llm_extraction: bool,

    /// Run the AST extractor over code chunks
    pub use_ast_extraction: bool,

    /// Generation provider for the LLM extractor; falls back to the
    /// summarization provider when unset
    pub extraction: Option<SummarizationConfig>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_triplets_per_chunk: DEFAULT_MAX_TRIPLETS_PER_CHUNK,
            traversal_depth: DEFAULT_TRAVERSAL_DEPTH,
            use_llm_extraction: false,
            use_ast_extraction: true,
            extraction: None,
        }
    }
}

/// Rerank section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RerankConfig {
    /// Whether the two-stage rerank pipeline is available
    pub enabled: bool,

    /// Rerank endpoint base URL
    pub base_url: Option<String>,

    /// Model identifier passed to the rerank provider
    pub model: Option<String>,

    /// Per-call timeout in milliseconds; expiry degrades gracefully
    pub timeout_ms: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            model: None,
            timeout_ms: DEFAULT_RERANK_TIMEOUT_MS,
        }
    }
}

/// Server section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,

    /// Bind port; 0 asks the OS for a free port
    pub port: u16,

    /// Request-scoped deadline propagated to backend calls
    pub request_timeout_secs: u64,

    /// How long shutdown waits for the active job to checkpoint
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
        }
    }
}

/// Indexing section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IndexingConfig {
    /// Target chunk size in tokens
    pub chunk_size: usize,

    /// Token overlap carried between adjacent document chunks
    pub chunk_overlap: usize,

    /// Include globs applied during discovery (empty = everything)
    pub include: Vec<String>,

    /// Exclude globs applied during discovery
    pub exclude: Vec<String>,

    /// Bounded fan-out for embedding calls within a job
    pub embed_concurrency: usize,

    /// Query-result cache entries held by the retrieval engine
    pub query_cache_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE_TOKENS,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP_TOKENS,
            include: Vec::new(),
            exclude: Vec::new(),
            embed_concurrency: DEFAULT_EMBED_CONCURRENCY,
            query_cache_size: DEFAULT_QUERY_CACHE_SIZE,
        }
    }
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Default level filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BrainConfig {
    /// Parse a YAML document into a validated configuration
    ///
    /// # Errors
    /// Returns `ConfigError` on malformed YAML, unknown keys, or
    /// validation failures.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.apply_env_overrides().validated()
    }

    /// Load a configuration file from disk
    ///
    /// # Errors
    /// Returns `ConfigError::Io` when the file cannot be read, otherwise
    /// as [`Self::from_yaml`].
    pub fn from_file(path: &std::path::Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Built-in defaults overlaid with environment overrides
    ///
    /// # Errors
    /// Returns `ConfigError` if an environment override produces an
    /// invalid configuration.
    pub fn from_defaults() -> ConfigResult<Self> {
        Self::default().apply_env_overrides().validated()
    }

    /// Overlay scalar `AGENT_BRAIN_*` environment overrides
    fn apply_env_overrides(mut self) -> Self {
        if let Some(port) = read_env_parse::<u16>("AGENT_BRAIN_PORT") {
            self.server.port = port;
        }
        if let Ok(host) = std::env::var("AGENT_BRAIN_HOST") {
            self.server.host = host;
        }
        if let Ok(level) = std::env::var("AGENT_BRAIN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(dim) = read_env_parse::<usize>("AGENT_BRAIN_EMBEDDING_DIMENSION") {
            self.embedding.dimension = dim;
        }
        if let Ok(model) = std::env::var("AGENT_BRAIN_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        self
    }

    /// Validate and return self, for call chaining
    fn validated(self) -> ConfigResult<Self> {
        validation::Validate::validate(&self)?;
        Ok(self)
    }

    /// Path of the state directory under `project_root`
    pub fn state_dir(project_root: &std::path::Path) -> PathBuf {
        project_root.join(STATE_DIR_NAME)
    }
}

fn read_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl validation::Validate for BrainConfig {
    fn validate(&self) -> ConfigResult<()> {
        // Backend-specific required keys
        if self.storage.backend == StorageBackendKind::Postgres {
            let pg = self.storage.postgres.as_ref().ok_or_else(|| {
                ConfigError::invalid(
                    "storage.backend = postgres requires the storage.postgres section",
                )
            })?;
            validation::validate_url(&pg.url, "storage.postgres.url")?;
            validation::validate_range(u64::from(pg.hnsw_m), 2, 128, "storage.postgres.hnsw_m")?;
            validation::validate_range(
                u64::from(pg.hnsw_ef_construction),
                4,
                1024,
                "storage.postgres.hnsw_ef_construction",
            )?;
        }

        validation::validate_non_empty(&self.embedding.model, "embedding.model")?;
        validation::validate_range(self.embedding.dimension as u64, 1, 10_000, "embedding.dimension")?;
        validation::validate_range(self.embedding.batch_size as u64, 1, 1000, "embedding.batch_size")?;

        if let Some(summarization) = &self.summarization {
            validation::validate_non_empty(&summarization.model, "summarization.model")?;
        }

        if self.graph.enabled {
            validation::validate_range(
                self.graph.max_triplets_per_chunk as u64,
                1,
                100,
                "graph.max_triplets_per_chunk",
            )?;
            validation::validate_range(
                self.graph.traversal_depth as u64,
                1,
                10,
                "graph.traversal_depth",
            )?;
        }

        if self.rerank.enabled {
            let url = self.rerank.base_url.as_deref().ok_or_else(|| {
                ConfigError::invalid("rerank.enabled = true requires rerank.base_url")
            })?;
            validation::validate_url(url, "rerank.base_url")?;
            validation::validate_range(self.rerank.timeout_ms, 100, 120_000, "rerank.timeout_ms")?;
        }

        validation::validate_non_empty(&self.server.host, "server.host")?;
        validation::validate_range(
            self.server.request_timeout_secs,
            1,
            3600,
            "server.request_timeout_secs",
        )?;
        validation::validate_range(
            self.server.drain_timeout_secs,
            1,
            3600,
            "server.drain_timeout_secs",
        )?;

        validation::validate_range(self.indexing.chunk_size as u64, 16, 8192, "indexing.chunk_size")?;
        if self.indexing.chunk_overlap >= self.indexing.chunk_size {
            return Err(ConfigError::invalid(format!(
                "indexing.chunk_overlap ({}) must be smaller than indexing.chunk_size ({})",
                self.indexing.chunk_overlap, self.indexing.chunk_size
            )));
        }
        validation::validate_range(
            self.indexing.embed_concurrency as u64,
            1,
            64,
            "indexing.embed_concurrency",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Validate;

    #[test]
    fn defaults_are_valid() {
        let config = BrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, StorageBackendKind::Embedded);
        assert_eq!(config.embedding.dimension, DEFAULT_EMBEDDING_DIMENSION);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let yaml = "storage:\n  backend: embedded\n  wat: true\n";
        let result = BrainConfig::from_yaml(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_backend_kind_is_rejected() {
        let yaml = "storage:\n  backend: mongo\n";
        assert!(BrainConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn postgres_backend_requires_parameters() {
        let yaml = "storage:\n  backend: postgres\n";
        let result = BrainConfig::from_yaml(yaml);
        assert!(result.is_err());

        let yaml = concat!(
            "storage:\n",
            "  backend: postgres\n",
            "  postgres:\n",
            "    url: postgres://localhost/agent_brain\n",
        );
        let config = BrainConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.storage.postgres.unwrap().hnsw_m, DEFAULT_HNSW_M);
    }

    #[test]
    fn rerank_requires_base_url_when_enabled() {
        let yaml = "rerank:\n  enabled: true\n";
        assert!(BrainConfig::from_yaml(yaml).is_err());

        let yaml = concat!(
            "rerank:\n",
            "  enabled: true\n",
            "  base_url: http://localhost:9200\n",
        );
        assert!(BrainConfig::from_yaml(yaml).is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let yaml = "indexing:\n  chunk_size: 100\n  chunk_overlap: 100\n";
        assert!(BrainConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn full_document_round_trips() {
        let yaml = concat!(
            "storage:\n",
            "  backend: embedded\n",
            "  metric: cosine\n",
            "embedding:\n",
            "  provider: mock\n",
            "  model: test-model\n",
            "  dimension: 64\n",
            "graph:\n",
            "  enabled: true\n",
            "  use_llm_extraction: false\n",
            "server:\n",
            "  port: 0\n",
        );
        let config = BrainConfig::from_yaml(yaml).unwrap();
        assert!(config.graph.enabled);
        assert_eq!(config.embedding.model, "test-model");
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Mock);
    }
}
