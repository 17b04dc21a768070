//! Token counting for chunk budgeting
//!
//! The splitters budget chunks in tokens, not bytes. The tiktoken counter
//! gives model-accurate counts; the heuristic counter is the fast fallback
//! when no BPE vocabulary applies.

use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base};

/// Trait for counting tokens in text
///
/// Implementations provide model-specific token counting without coupling
/// to embedding providers.
pub trait TokenCounter: Send + Sync {
    /// Get the name/identifier of this counter
    fn name(&self) -> &str;

    /// Count tokens in the given text
    ///
    /// This should be fast and deterministic for the same input
    fn count(&self, text: &str) -> usize;
}

/// Type alias for shared token counter
pub type TokenCounterRef = Arc<dyn TokenCounter>;

/// Token counter backed by a tiktoken BPE vocabulary
pub struct TiktokenCounter {
    model_name: String,
    encoder: CoreBPE,
}

impl TiktokenCounter {
    /// Create a counter using the `cl100k_base` vocabulary
    ///
    /// # Errors
    /// Returns an error when the embedded vocabulary fails to load.
    pub fn cl100k(model_name: &str) -> anyhow::Result<Self> {
        Ok(Self {
            model_name: model_name.to_string(),
            encoder: cl100k_base()?,
        })
    }
}

impl TokenCounter for TiktokenCounter {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn count(&self, text: &str) -> usize {
        self.encoder.encode_ordinary(text).len()
    }
}

/// Fast heuristic token counter that estimates based on character patterns
///
/// Uses the usual ~4 characters per token ratio for English-like text.
pub struct HeuristicCounter {
    name: String,
    chars_per_token: f64,
}

impl HeuristicCounter {
    /// Create a new heuristic counter with the default 4.0 ratio
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            chars_per_token: 4.0,
        }
    }

    /// Create with a custom chars-per-token ratio
    pub fn with_ratio(name: &str, chars_per_token: f64) -> Self {
        Self {
            name: name.to_string(),
            chars_per_token,
        }
    }
}

impl TokenCounter for HeuristicCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let estimate = (text.chars().count() as f64 / self.chars_per_token).ceil() as usize;
        estimate.max(1)
    }
}

/// Default counter: tiktoken when the vocabulary loads, heuristic otherwise
pub fn default_counter() -> TokenCounterRef {
    match TiktokenCounter::cl100k("cl100k_base") {
        Ok(counter) => Arc::new(counter),
        Err(e) => {
            tracing::warn!("tiktoken vocabulary unavailable, using heuristic counter: {e}");
            Arc::new(HeuristicCounter::new("heuristic"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_counts_scale_with_length() {
        let counter = HeuristicCounter::new("test");
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abcd"), 1);
        assert!(counter.count("a much longer piece of text") > 4);
    }

    #[test]
    fn tiktoken_counts_simple_text() {
        let counter = TiktokenCounter::cl100k("cl100k_base").expect("vocabulary loads");
        let count = counter.count("Hello, world!");
        assert!(count > 0 && count <= 5);
        assert_eq!(counter.count(""), 0);
    }
}
