//! Query model
//!
//! The engine accepts a query with text, a mode, and tuning knobs with
//! serde defaults (`top_k` 5, `threshold` 0.7, `alpha` 0.5,
//! `traversal_depth` 2). `top_k = 0` and empty text are invalid.

use crate::error::{RetrievalError, RetrievalResult};
use agent_brain_graph::{EntityType, Relationship};
use agent_brain_ingest::Chunk;
use agent_brain_storage::{FilterValue, Filters};
use serde::{Deserialize, Serialize};

/// Which retrieval strategy to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Dense similarity over embeddings
    Vector,
    /// BM25 / full-text search
    Keyword,
    /// Weighted combination of vector and keyword
    #[default]
    Hybrid,
    /// Knowledge-graph traversal from seeded entities
    Graph,
    /// Hybrid and graph fused with RRF
    Multi,
}

impl std::fmt::Display for QueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self {
            Self::Vector => "vector",
            Self::Keyword => "keyword",
            Self::Hybrid => "hybrid",
            Self::Graph => "graph",
            Self::Multi => "multi",
        };
        write!(f, "{mode}")
    }
}

/// Filters accepted on a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QueryFilters {
    /// Restrict to document or code chunks
    pub source_type: Option<String>,
    /// Restrict to one or more languages
    pub language: Option<Vec<String>>,
    /// Restrict to one or more symbol kinds
    pub symbol_type: Option<Vec<String>>,
    /// Graph-mode: restrict traversal to these entity types
    pub entity_types: Vec<String>,
    /// Graph-mode: restrict traversal to these relationship types
    pub relationship_types: Vec<String>,
}

impl QueryFilters {
    /// The chunk-metadata part, for the storage backend
    pub fn storage_filters(&self) -> Filters {
        let mut pairs = Vec::new();
        if let Some(source_type) = &self.source_type {
            pairs.push((
                "source_type".to_string(),
                FilterValue::Eq(source_type.clone()),
            ));
        }
        if let Some(language) = &self.language {
            pairs.push(("language".to_string(), FilterValue::In(language.clone())));
        }
        if let Some(symbol_type) = &self.symbol_type {
            pairs.push(("symbol_type".to_string(), FilterValue::In(symbol_type.clone())));
        }
        Filters::from_pairs(pairs)
    }

    /// The graph part: normalized entity types
    pub fn entity_types(&self) -> Vec<EntityType> {
        self.entity_types
            .iter()
            .map(|raw| EntityType::normalize(raw))
            .collect()
    }

    /// The graph part: normalized relationship types
    pub fn relationship_types(&self) -> Vec<Relationship> {
        self.relationship_types
            .iter()
            .map(|raw| Relationship::normalize(raw))
            .collect()
    }
}

const fn default_top_k() -> usize {
    5
}

const fn default_threshold() -> f32 {
    0.7
}

const fn default_alpha() -> f32 {
    0.5
}

/// A retrieval request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Query {
    /// The query text
    pub text: String,
    /// Retrieval strategy
    #[serde(default)]
    pub mode: QueryMode,
    /// Maximum results returned
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum normalized similarity kept
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Hybrid weight: `alpha * vector + (1 - alpha) * keyword`
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Metadata and graph filters
    #[serde(default)]
    pub filters: QueryFilters,
    /// Graph traversal depth override
    #[serde(default)]
    pub traversal_depth: Option<usize>,
    /// Include per-mode scores in the response
    #[serde(default)]
    pub include_scores: bool,
    /// Request (or suppress) the two-stage rerank
    #[serde(default)]
    pub rerank: Option<bool>,
}

impl Query {
    /// A query with defaults for everything but the text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: QueryMode::default(),
            top_k: default_top_k(),
            threshold: default_threshold(),
            alpha: default_alpha(),
            filters: QueryFilters::default(),
            traversal_depth: None,
            include_scores: false,
            rerank: None,
        }
    }

    /// Validate the request shape
    ///
    /// # Errors
    /// `RetrievalError::InvalidQuery` on empty text, `top_k = 0`, or
    /// out-of-range threshold/alpha.
    pub fn validate(&self) -> RetrievalResult<()> {
        if self.text.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery("query text is empty".to_string()));
        }
        if self.top_k == 0 {
            return Err(RetrievalError::InvalidQuery("top_k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(RetrievalError::InvalidQuery(format!(
                "threshold {} is outside [0, 1]",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(RetrievalError::InvalidQuery(format!(
                "alpha {} is outside [0, 1]",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Per-mode score breakdown, included on request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeScores {
    /// Score from the primary retrieval stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<f32>,
    /// Rerank provider's relevance score, when reranked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank: Option<f32>,
}

/// One ranked result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedChunk {
    /// Stable chunk identifier
    pub chunk_id: String,
    /// Source file the chunk came from
    pub source_path: String,
    /// Chunk text
    pub text: String,
    /// document or code
    pub source_type: String,
    /// Language for code chunks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Symbol kind for AST-extracted chunks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_type: Option<String>,
    /// Symbol name for AST-extracted chunks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    /// 1-indexed line span
    pub start_line: usize,
    /// 1-indexed line span (inclusive)
    pub end_line: usize,
    /// LLM summary, when produced at indexing time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Final score this result was ranked by
    pub score: f32,
    /// Per-stage breakdown, when `include_scores` was set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<ModeScores>,
}

impl RankedChunk {
    /// Build a response row from a chunk and its final score
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            source_path: chunk.source_path.clone(),
            text: chunk.text.clone(),
            source_type: chunk.source_type.to_string(),
            language: chunk.language.clone(),
            symbol_type: chunk.symbol_type.clone(),
            symbol_name: chunk.symbol_name.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            summary: chunk.summary.clone(),
            score,
            scores: None,
        }
    }
}

/// The engine's answer to a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Ranked results, best first
    pub results: Vec<RankedChunk>,
    /// The mode that produced them
    pub mode: QueryMode,
    /// Whether the rerank stage failed and stage-1 order was returned
    pub rerank_degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let query: Query = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(query.mode, QueryMode::Hybrid);
        assert_eq!(query.top_k, 5);
        assert!((query.threshold - 0.7).abs() < f32::EPSILON);
        assert!((query.alpha - 0.5).abs() < f32::EPSILON);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn empty_text_and_zero_top_k_are_invalid() {
        assert!(Query::new("  ").validate().is_err());

        let mut query = Query::new("ok");
        query.top_k = 0;
        assert!(matches!(
            query.validate(),
            Err(RetrievalError::InvalidQuery(_))
        ));
    }

    #[test]
    fn out_of_range_alpha_is_invalid() {
        let mut query = Query::new("ok");
        query.alpha = 1.5;
        assert!(query.validate().is_err());
    }

    #[test]
    fn filters_split_into_storage_and_graph_parts() {
        let filters = QueryFilters {
            source_type: Some("code".to_string()),
            language: Some(vec!["rust".to_string()]),
            symbol_type: None,
            entity_types: vec!["Class".to_string()],
            relationship_types: vec!["calls".to_string()],
        };
        let storage = filters.storage_filters();
        assert!(!storage.is_empty());
        assert!(storage.validate().is_ok());
        assert_eq!(filters.entity_types(), vec![EntityType::Class]);
        assert_eq!(filters.relationship_types(), vec![Relationship::Calls]);
    }

    #[test]
    fn unknown_query_fields_are_rejected() {
        let result: Result<Query, _> = serde_json::from_str(r#"{"text": "x", "wat": 1}"#);
        assert!(result.is_err());
    }
}
