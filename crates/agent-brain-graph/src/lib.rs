//! Agent Brain knowledge graph
//!
//! Typed `(subject, predicate, object)` triples extracted from chunks by
//! an LLM extractor and an AST extractor, stored flat and traversed with
//! bounded depth. The graph is an optional capability: extraction and
//! graph-mode queries only exist when enabled in configuration.

pub mod error;
pub mod extract;
pub mod store;
pub mod triple;

pub use error::{GraphError, GraphResult};
pub use extract::{LlmExtractor, extract_structural};
pub use store::{GraphNode, GraphStore};
pub use triple::{EntityType, Relationship, Triple};
