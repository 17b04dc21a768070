//! Agent Brain ingestion crate
//!
//! Owns the chunk model and everything that turns files into chunks:
//! discovery with include/exclude globs, the semantic document splitter,
//! the tree-sitter code splitter, token counting and content hashing.

pub mod chunk;
pub mod discovery;
pub mod error;
pub mod hash;
pub mod splitting;
pub mod tokens;

pub use chunk::{Chunk, SourceType};
pub use discovery::{DiscoveredFile, DiscoveryConfig, DiscoveryReport, FileKind, discover};
pub use error::{IngestError, IngestResult};
pub use hash::{hash_bytes, hash_content};
pub use splitting::{
    CodeSplitter, DocumentSplitter, DocumentSplitterConfig, get_language_config,
    language_for_extension,
};
pub use tokens::{HeuristicCounter, TiktokenCounter, TokenCounter, TokenCounterRef, default_counter};
