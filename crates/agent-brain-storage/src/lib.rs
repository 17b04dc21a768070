//! Agent Brain storage crate
//!
//! One contract over vector + keyword chunk storage with two concrete
//! backends: the embedded file-backed store (default) and a relational
//! store with a vector-index extension. Both normalize scores to [0, 1]
//! so fused scores have the same meaning regardless of backend.

pub mod backend;
pub mod embedded;
pub mod error;
pub mod filters;
pub mod meta;
pub mod postgres;
pub mod scoring;

pub use backend::{SearchHit, StorageBackend, StorageBackendRef};
pub use embedded::{Bm25Index, EmbeddedBackend};
pub use error::{StorageError, StorageResult};
pub use filters::{FILTERABLE_KEYS, FilterValue, Filters};
pub use meta::EmbeddingMetadata;
pub use postgres::PostgresBackend;
pub use scoring::{RRF_K, normalize_keyword_scores, normalize_vector_score, rrf_fuse, sort_hits};
