//! Deterministic in-process embedder
//!
//! Produces bag-of-words style vectors seeded from the input text: each
//! token is hashed into a dimension bucket and the vector is then
//! L2-normalized. Texts sharing vocabulary land near each other under
//! cosine similarity, which is what tests and offline use need.

use super::EmbeddingProvider;
use crate::error::ProviderResult;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Deterministic embedding provider for tests and offline use
pub struct MockEmbedder {
    model_name: String,
    dimension: usize,
}

impl MockEmbedder {
    /// Create a mock embedder producing vectors of `dimension`
    pub fn new(model_name: &str, dimension: usize) -> Self {
        Self {
            model_name: model_name.to_string(),
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let bucket = usize::from(digest[0]) << 8 | usize::from(digest[1]);
            let index = bucket % self.dimension;
            let sign = if digest[2] & 1 == 0 { 1.0 } else { -1.0 };
            if let Some(slot) = vector.get_mut(index) {
                *slot += sign;
            }
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        } else if let Some(first) = vector.first_mut() {
            // Empty text still gets a valid unit vector
            *first = 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> ProviderResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalized() {
        let embedder = MockEmbedder::new("mock", 64);
        let a = embedder.embed_batch(&["hello world"]).await.unwrap();
        let b = embedder.embed_batch(&["hello world"]).await.unwrap();
        assert_eq!(a, b);

        let norm: f32 = a[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn similar_texts_score_higher_than_unrelated() {
        let embedder = MockEmbedder::new("mock", 128);
        let vectors = embedder
            .embed_batch(&[
                "the quick brown fox jumps",
                "a quick brown fox leaps",
                "database connection pooling internals",
            ])
            .await
            .unwrap();

        let similar = cosine(&vectors[0], &vectors[1]);
        let unrelated = cosine(&vectors[0], &vectors[2]);
        assert!(similar > unrelated, "similar {similar} <= unrelated {unrelated}");
    }

    #[tokio::test]
    async fn empty_text_is_still_a_unit_vector() {
        let embedder = MockEmbedder::new("mock", 8);
        let vectors = embedder.embed_batch(&[""]).await.unwrap();
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
