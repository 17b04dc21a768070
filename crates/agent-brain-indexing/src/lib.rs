//! Agent Brain indexing service
//!
//! Drives the document -> chunk -> embedding pipeline behind the job
//! queue: discovery, content-hash deduplication, splitting, optional
//! summarization, bounded-fan-out embedding, optional graph extraction,
//! and idempotent upserts keyed by `(source_path, chunk_index)`.

pub mod error;
pub mod ledger;
pub mod service;
pub mod summarize;

pub use error::{IndexingError, IndexingResult};
pub use ledger::FileLedger;
pub use service::{
    BrainJobHandler, DimensionGuard, GraphFacilities, IndexParams, IndexingService, PipelineConfig,
};
