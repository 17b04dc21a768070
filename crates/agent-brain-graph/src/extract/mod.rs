//! Triple extractors
//!
//! Two extractors run per chunk when the graph is enabled: the LLM
//! extractor (prompt + JSON validation) and the AST extractor (structural
//! triples from splitter metadata). Their outputs are merged and deduped
//! by the store.

pub mod ast;
pub mod llm;

pub use ast::extract_structural;
pub use llm::LlmExtractor;
