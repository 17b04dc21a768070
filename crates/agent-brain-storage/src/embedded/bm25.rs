//! BM25 inverted index for the embedded backend
//!
//! Plain Okapi BM25 with `k1 = 1.2`, `b = 0.75` over lowercase
//! alphanumeric tokens. The whole index serializes with bincode for the
//! on-disk snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_K1: f32 = 1.2;
const DEFAULT_B: f32 = 0.75;

/// Serializable BM25 index over chunk text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Index {
    k1: f32,
    b: f32,
    /// Document length in tokens per chunk id
    doc_lens: HashMap<String, u32>,
    /// term -> (chunk id -> term frequency)
    postings: HashMap<String, HashMap<String, u32>>,
    /// Sum of all document lengths, for avgdl
    total_len: u64,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Index {
    /// Create an empty index with default parameters
    pub fn new() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
            doc_lens: HashMap::new(),
            postings: HashMap::new(),
            total_len: 0,
        }
    }

    /// Number of indexed documents
    pub fn doc_count(&self) -> usize {
        self.doc_lens.len()
    }

    /// Insert-or-replace a document
    pub fn upsert_doc(&mut self, id: &str, text: &str) {
        self.remove_doc(id);

        let tokens = tokenize(text);
        let len = tokens.len() as u32;
        if len == 0 {
            // Still record the document so counts stay consistent
            self.doc_lens.insert(id.to_string(), 0);
            return;
        }

        let mut freqs: HashMap<&str, u32> = HashMap::new();
        for token in &tokens {
            *freqs.entry(token.as_str()).or_insert(0) += 1;
        }
        for (term, freq) in freqs {
            self.postings
                .entry(term.to_string())
                .or_default()
                .insert(id.to_string(), freq);
        }
        self.doc_lens.insert(id.to_string(), len);
        self.total_len += u64::from(len);
    }

    /// Remove a document if present
    pub fn remove_doc(&mut self, id: &str) {
        let Some(len) = self.doc_lens.remove(id) else {
            return;
        };
        self.total_len = self.total_len.saturating_sub(u64::from(len));
        self.postings.retain(|_, docs| {
            docs.remove(id);
            !docs.is_empty()
        });
    }

    /// Score documents against `query`, best first
    ///
    /// Raw BM25 scores; callers normalize per query before fusion.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        let n = self.doc_count();
        if n == 0 || limit == 0 {
            return Vec::new();
        }
        #[allow(clippy::cast_precision_loss)]
        let avgdl = (self.total_len as f32 / n as f32).max(1.0);

        let mut scores: HashMap<&str, f32> = HashMap::new();
        for term in tokenize(query) {
            let Some(docs) = self.postings.get(&term) else {
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let idf = (((n as f32 - docs.len() as f32 + 0.5) / (docs.len() as f32 + 0.5)) + 1.0).ln();
            for (id, freq) in docs {
                #[allow(clippy::cast_precision_loss)]
                let tf = *freq as f32;
                #[allow(clippy::cast_precision_loss)]
                let dl = *self.doc_lens.get(id).unwrap_or(&0) as f32;
                let denom = tf + self.k1 * (1.0 - self.b + self.b * dl / avgdl);
                *scores.entry(id.as_str()).or_insert(0.0) += idf * (tf * (self.k1 + 1.0)) / denom;
            }
        }

        let mut ranked: Vec<(String, f32)> = scores
            .into_iter()
            .map(|(id, score)| (id.to_string(), score))
            .collect();
        crate::scoring::sort_hits(&mut ranked);
        ranked.truncate(limit);
        ranked
    }
}

/// Lowercase alphanumeric tokenization
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevant_documents_rank_first() {
        let mut index = Bm25Index::new();
        index.upsert_doc("1", "fn get_user_by_id(id: i32) -> User");
        index.upsert_doc("2", "fn delete_account(id: i32)");
        index.upsert_doc("3", "struct DatabaseConnection { pool: Pool }");

        let results = index.search("get user", 10);
        assert!(!results.is_empty());
        assert_eq!(results[0].0, "1");
    }

    #[test]
    fn upsert_replaces_instead_of_duplicating() {
        let mut index = Bm25Index::new();
        index.upsert_doc("1", "alpha beta");
        index.upsert_doc("1", "gamma delta");
        assert_eq!(index.doc_count(), 1);

        assert!(index.search("alpha", 10).is_empty());
        assert_eq!(index.search("gamma", 10).len(), 1);
    }

    #[test]
    fn remove_clears_postings() {
        let mut index = Bm25Index::new();
        index.upsert_doc("1", "needle in haystack");
        index.remove_doc("1");
        assert_eq!(index.doc_count(), 0);
        assert!(index.search("needle", 10).is_empty());
    }

    #[test]
    fn empty_query_matches_nothing() {
        let mut index = Bm25Index::new();
        index.upsert_doc("1", "some text");
        assert!(index.search("", 10).is_empty());
        assert!(index.search("   ", 10).is_empty());
    }

    #[test]
    fn snapshot_round_trips_through_bincode() {
        let mut index = Bm25Index::new();
        index.upsert_doc("a#0", "reciprocal rank fusion");
        index.upsert_doc("b#0", "vector similarity search");

        let bytes = bincode::serialize(&index).unwrap();
        let restored: Bm25Index = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.doc_count(), 2);
        assert_eq!(restored.search("fusion", 10)[0].0, "a#0");
    }
}
