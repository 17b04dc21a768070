//! The chunk model - the unit of retrieval
//!
//! A chunk is a span of text (or code) with an embedding and metadata.
//! `(source_path, chunk_index)` uniquely identifies a chunk; re-ingesting a
//! source path upserts by this key and never duplicates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a chunk came from prose or from source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Markdown, plain text, HTML and friends
    Document,
    /// A recognized programming language
    Code,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::Code => write!(f, "code"),
        }
    }
}

/// A span of text stored with an embedding and metadata; the unit of retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier derived from `source_path` and `chunk_index`
    pub chunk_id: String,
    /// Path of the file this chunk came from, relative to the project root
    pub source_path: String,
    /// The chunk text
    pub text: String,
    /// Dense embedding; dimension is fixed per project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Document or code
    pub source_type: SourceType,
    /// Language identifier when `source_type` is code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Declaration kind when AST-extracted (function, class, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_type: Option<String>,
    /// Declaration name when AST-extracted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    /// Position of this chunk within its source file (0-based)
    pub chunk_index: usize,
    /// Starting line number (1-indexed)
    pub start_line: usize,
    /// Ending line number (1-indexed, inclusive)
    pub end_line: usize,
    /// Optional LLM summary, embedded together with the text when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Free-form metadata map
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Chunk {
    /// Derive the stable chunk id for a `(source_path, chunk_index)` pair
    pub fn id_for(source_path: &str, chunk_index: usize) -> String {
        format!("{source_path}#{chunk_index}")
    }

    /// Create a document chunk
    pub fn document(source_path: &str, chunk_index: usize, text: impl Into<String>) -> Self {
        Self {
            chunk_id: Self::id_for(source_path, chunk_index),
            source_path: source_path.to_string(),
            text: text.into(),
            embedding: None,
            source_type: SourceType::Document,
            language: None,
            symbol_type: None,
            symbol_name: None,
            chunk_index,
            start_line: 0,
            end_line: 0,
            summary: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Create a code chunk
    #[allow(clippy::too_many_arguments)]
    pub fn code(
        source_path: &str,
        chunk_index: usize,
        text: impl Into<String>,
        language: &str,
        symbol_type: Option<String>,
        symbol_name: Option<String>,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        Self {
            chunk_id: Self::id_for(source_path, chunk_index),
            source_path: source_path.to_string(),
            text: text.into(),
            embedding: None,
            source_type: SourceType::Code,
            language: Some(language.to_string()),
            symbol_type,
            symbol_name,
            chunk_index,
            start_line,
            end_line,
            summary: None,
            metadata: BTreeMap::new(),
        }
    }

    /// The text that gets embedded: `summary\n\ntext` when a summary exists
    pub fn embeddable_text(&self) -> String {
        match &self.summary {
            Some(summary) if !summary.is_empty() => format!("{summary}\n\n{}", self.text),
            _ => self.text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_stable() {
        assert_eq!(Chunk::id_for("src/main.rs", 3), "src/main.rs#3");
        let chunk = Chunk::document("docs/readme.md", 0, "hello");
        assert_eq!(chunk.chunk_id, "docs/readme.md#0");
    }

    #[test]
    fn embeddable_text_concatenates_summary() {
        let mut chunk = Chunk::document("a.md", 0, "body text");
        assert_eq!(chunk.embeddable_text(), "body text");

        chunk.summary = Some("a summary".to_string());
        assert_eq!(chunk.embeddable_text(), "a summary\n\nbody text");

        chunk.summary = Some(String::new());
        assert_eq!(chunk.embeddable_text(), "body text");
    }
}
