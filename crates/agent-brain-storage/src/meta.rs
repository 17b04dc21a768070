//! Embedding metadata singleton
//!
//! One record per project storing the embedding model identifier and its
//! dimension. Written on first successful initialization; validated on
//! every subsequent startup. A mismatch is fatal and demands explicit
//! re-indexing.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The embedding model a project's index was built with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    /// Model identifier (e.g. "nomic-embed-text")
    pub model: String,
    /// Embedding dimension
    pub dimension: usize,
    /// When the record was first written
    pub created_at: DateTime<Utc>,
}

impl EmbeddingMetadata {
    /// Create a record for a freshly initialized index
    pub fn new(model: &str, dimension: usize) -> Self {
        Self {
            model: model.to_string(),
            dimension,
            created_at: Utc::now(),
        }
    }

    /// Validate a configured model/dimension pair against this record
    ///
    /// # Errors
    /// Returns `StorageError::DimensionMismatch` when either the model
    /// identifier or the dimension differs.
    pub fn validate(&self, model: &str, dimension: usize) -> StorageResult<()> {
        if self.model != model || self.dimension != dimension {
            return Err(StorageError::DimensionMismatch {
                stored_model: self.model.clone(),
                stored_dimension: self.dimension,
                configured_model: model.to_string(),
                configured_dimension: dimension,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_metadata_validates() {
        let meta = EmbeddingMetadata::new("model-a", 768);
        assert!(meta.validate("model-a", 768).is_ok());
    }

    #[test]
    fn model_or_dimension_change_is_fatal() {
        let meta = EmbeddingMetadata::new("model-a", 768);
        assert!(matches!(
            meta.validate("model-b", 768),
            Err(StorageError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            meta.validate("model-a", 1024),
            Err(StorageError::DimensionMismatch { .. })
        ));
    }
}
