//! Metadata filters for search operations
//!
//! Filters accept equality and membership over chunk metadata. Unknown
//! keys are rejected with `InvalidFilter` instead of silently matching
//! nothing.

use crate::error::{StorageError, StorageResult};
use agent_brain_ingest::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keys the backends index and accept in filters
pub const FILTERABLE_KEYS: &[&str] = &["source_type", "language", "symbol_type"];

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Equality against one value
    Eq(String),
    /// Membership in a set of values
    In(Vec<String>),
}

impl FilterValue {
    fn matches(&self, candidate: Option<&str>) -> bool {
        match (self, candidate) {
            (Self::Eq(expected), Some(actual)) => expected == actual,
            (Self::In(allowed), Some(actual)) => allowed.iter().any(|v| v == actual),
            (_, None) => false,
        }
    }
}

/// A set of filter conditions, all of which must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(pub BTreeMap<String, FilterValue>);

impl Filters {
    /// The empty filter set, matching every chunk
    pub fn none() -> Self {
        Self::default()
    }

    /// Build a filter set from key/value pairs
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, FilterValue)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    /// Whether no conditions are present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reject filters naming keys the backends do not index
    ///
    /// # Errors
    /// Returns `StorageError::InvalidFilter` naming the offending key.
    pub fn validate(&self) -> StorageResult<()> {
        for key in self.0.keys() {
            if !FILTERABLE_KEYS.contains(&key.as_str()) {
                return Err(StorageError::InvalidFilter(key.clone()));
            }
        }
        Ok(())
    }

    /// Whether `chunk` satisfies every condition
    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.0.iter().all(|(key, value)| {
            let source_type = chunk.source_type.to_string();
            let candidate = match key.as_str() {
                "source_type" => Some(source_type.as_str()),
                "language" => chunk.language.as_deref(),
                "symbol_type" => chunk.symbol_type.as_deref(),
                _ => None,
            };
            value.matches(candidate)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_chunk() -> Chunk {
        Chunk::code(
            "src/lib.rs",
            0,
            "fn run() {}",
            "rust",
            Some("function".to_string()),
            Some("run".to_string()),
            1,
            1,
        )
    }

    #[test]
    fn empty_filters_match_everything() {
        assert!(Filters::none().matches(&code_chunk()));
        assert!(Filters::none().validate().is_ok());
    }

    #[test]
    fn equality_and_membership() {
        let eq = Filters::from_pairs([(
            "language".to_string(),
            FilterValue::Eq("rust".to_string()),
        )]);
        assert!(eq.matches(&code_chunk()));

        let membership = Filters::from_pairs([(
            "language".to_string(),
            FilterValue::In(vec!["go".to_string(), "rust".to_string()]),
        )]);
        assert!(membership.matches(&code_chunk()));

        let miss = Filters::from_pairs([(
            "language".to_string(),
            FilterValue::Eq("python".to_string()),
        )]);
        assert!(!miss.matches(&code_chunk()));
    }

    #[test]
    fn source_type_filtering() {
        let filters = Filters::from_pairs([(
            "source_type".to_string(),
            FilterValue::Eq("code".to_string()),
        )]);
        assert!(filters.matches(&code_chunk()));
        assert!(!filters.matches(&Chunk::document("a.md", 0, "text")));
    }

    #[test]
    fn unknown_keys_are_invalid() {
        let filters = Filters::from_pairs([(
            "commit_sha".to_string(),
            FilterValue::Eq("abc".to_string()),
        )]);
        assert!(matches!(
            filters.validate(),
            Err(StorageError::InvalidFilter(key)) if key == "commit_sha"
        ));
    }

    #[test]
    fn document_chunk_has_no_language() {
        let filters = Filters::from_pairs([(
            "language".to_string(),
            FilterValue::Eq("rust".to_string()),
        )]);
        assert!(!filters.matches(&Chunk::document("a.md", 0, "text")));
    }
}
