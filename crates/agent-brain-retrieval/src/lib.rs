//! Agent Brain retrieval engine
//!
//! Multi-mode query execution: vector, keyword, hybrid (weighted), graph
//! (traversal from seeded entities) and multi (hybrid + graph fused with
//! RRF), with thresholds, deterministic ordering, request deadlines, an
//! epoch-invalidated result cache, and a gracefully degrading two-stage
//! rerank.

pub mod engine;
pub mod error;
pub mod query;
pub mod rerank;

pub use engine::{EngineConfig, EpochSource, RetrievalEngine};
pub use error::{RetrievalError, RetrievalResult};
pub use query::{ModeScores, Query, QueryFilters, QueryMode, QueryResponse, RankedChunk};
pub use rerank::RerankStage;
