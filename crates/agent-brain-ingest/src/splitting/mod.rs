//! Document and code splitters

pub mod code;
pub mod document;
pub mod languages;

pub use code::CodeSplitter;
pub use document::{DocumentSplitter, DocumentSplitterConfig};
pub use languages::{LANGUAGE_REGISTRY, LanguageConfig, get_language_config, language_for_extension};
