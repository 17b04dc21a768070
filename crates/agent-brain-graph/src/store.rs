//! Triple store
//!
//! A flat set of triples held in memory and persisted one JSON object per
//! line at `{state_dir}/index/graph.jsonl`. Triples are deduplicated by
//! `(subject, predicate, object)` before persistence. Type filtering uses
//! over-fetch-then-filter (3x `top_k`) to preserve ordering without
//! pre-indexing by type.

use crate::error::GraphResult;
use crate::triple::{EntityType, Relationship, Triple};
use agent_brain_storage::Bm25Index;
use agent_brain_storage::scoring::normalize_keyword_scores;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const GRAPH_FILE: &str = "graph.jsonl";

/// Over-fetch multiplier for type-filtered triple queries
const TYPE_FILTER_OVERFETCH: usize = 3;

#[derive(Default)]
struct GraphState {
    triples: Vec<Triple>,
    keys: HashSet<(String, String, String)>,
    text_index: Bm25Index,
}

/// A node surviving traversal, with its provenance
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Entity identity string
    pub name: String,
    /// Normalized score in [0, 1]
    pub score: f32,
    /// Chunks that defined this node (via extracted triples)
    pub chunk_ids: Vec<String>,
}

/// File-backed store of knowledge-graph triples
pub struct GraphStore {
    path: PathBuf,
    state: RwLock<GraphState>,
}

impl GraphStore {
    /// Open (or create) the graph store under `dir`
    ///
    /// # Errors
    /// Returns `GraphError` when an existing log cannot be read or parsed.
    pub fn open(dir: &Path) -> GraphResult<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(GRAPH_FILE);

        let mut state = GraphState::default();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let triple: Triple = serde_json::from_str(line)?;
                Self::insert_into(&mut state, triple);
            }
        }

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    fn insert_into(state: &mut GraphState, triple: Triple) -> bool {
        let key = triple.key();
        if !state.keys.insert(key) {
            return false;
        }
        let doc_id = format!("t{}", state.triples.len());
        state.text_index.upsert_doc(&doc_id, &triple.as_text());
        state.triples.push(triple);
        true
    }

    /// Add triples, deduplicating by `(subject, predicate, object)`
    ///
    /// Returns how many were actually new. New triples are appended to the
    /// on-disk log.
    ///
    /// # Errors
    /// Surfaces persistence I/O failures.
    pub async fn add_triples(&self, triples: Vec<Triple>) -> GraphResult<usize> {
        let mut state = self.state.write().await;
        let mut added = Vec::new();
        for triple in triples {
            if Self::insert_into(&mut state, triple.clone()) {
                added.push(triple);
            }
        }
        if !added.is_empty() {
            let mut lines = String::new();
            for triple in &added {
                lines.push_str(&serde_json::to_string(triple)?);
                lines.push('\n');
            }
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(lines.as_bytes())?;
        }
        Ok(added.len())
    }

    /// Total stored triples
    pub async fn triple_count(&self) -> usize {
        self.state.read().await.triples.len()
    }

    /// Number of distinct entity nodes
    pub async fn node_count(&self) -> usize {
        let state = self.state.read().await;
        let mut nodes: HashSet<&str> = HashSet::new();
        for triple in &state.triples {
            nodes.insert(triple.subject.as_str());
            nodes.insert(triple.object.as_str());
        }
        nodes.len()
    }

    /// Drop every triple and truncate the log
    ///
    /// # Errors
    /// Surfaces persistence I/O failures.
    pub async fn reset(&self) -> GraphResult<()> {
        let mut state = self.state.write().await;
        *state = GraphState::default();
        if self.path.exists() {
            std::fs::write(&self.path, b"")?;
        }
        Ok(())
    }

    /// Query triples by text with optional type filtering
    ///
    /// Over-fetches 3x `top_k` from the text index, then filters by
    /// `entity_types` / `relationship_types`, preserving score order.
    pub async fn query_triples(
        &self,
        query: &str,
        top_k: usize,
        entity_types: &[EntityType],
        relationship_types: &[Relationship],
    ) -> Vec<(Triple, f32)> {
        let state = self.state.read().await;
        let overfetch = top_k.saturating_mul(TYPE_FILTER_OVERFETCH).max(top_k);

        let mut scored = state.text_index.search(query, overfetch);
        normalize_keyword_scores(&mut scored);

        let mut out = Vec::new();
        for (doc_id, score) in scored {
            let Some(index) = doc_id.strip_prefix('t').and_then(|s| s.parse::<usize>().ok()) else {
                continue;
            };
            let Some(triple) = state.triples.get(index) else {
                continue;
            };
            if !matches_types(triple, entity_types) {
                continue;
            }
            if !relationship_types.is_empty() && !relationship_types.contains(&triple.predicate) {
                continue;
            }
            out.push((triple.clone(), score));
            if out.len() >= top_k {
                break;
            }
        }
        out
    }

    /// Traverse from seed nodes, honoring type filters and depth decay
    ///
    /// `seeds` maps entity names to seed scores. Each hop multiplies the
    /// score by `decay`; a visited set bounds the walk alongside
    /// `traversal_depth`. Returns surviving nodes with the chunks that
    /// defined them, best first.
    pub async fn traverse(
        &self,
        seeds: &HashMap<String, f32>,
        traversal_depth: usize,
        decay: f32,
        entity_types: &[EntityType],
        relationship_types: &[Relationship],
    ) -> Vec<GraphNode> {
        let state = self.state.read().await;

        // Adjacency + provenance maps built per traversal; corpora are
        // small enough per project that rebuilding beats maintaining
        // incremental indexes under mutation.
        let mut adjacency: HashMap<&str, Vec<(&Triple, &str)>> = HashMap::new();
        let mut defining_chunks: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut node_types: HashMap<&str, &EntityType> = HashMap::new();
        for triple in &state.triples {
            adjacency
                .entry(triple.subject.as_str())
                .or_default()
                .push((triple, triple.object.as_str()));
            adjacency
                .entry(triple.object.as_str())
                .or_default()
                .push((triple, triple.subject.as_str()));
            if let Some(chunk_id) = &triple.chunk_id {
                defining_chunks
                    .entry(triple.subject.as_str())
                    .or_default()
                    .push(chunk_id.as_str());
                defining_chunks
                    .entry(triple.object.as_str())
                    .or_default()
                    .push(chunk_id.as_str());
            }
            if let Some(t) = &triple.subject_type {
                node_types.insert(triple.subject.as_str(), t);
            }
            if let Some(t) = &triple.object_type {
                node_types.insert(triple.object.as_str(), t);
            }
        }

        let mut best: HashMap<String, f32> = HashMap::new();
        let mut frontier: Vec<(String, f32)> = seeds
            .iter()
            .map(|(name, score)| (name.clone(), *score))
            .collect();
        let mut visited: HashSet<String> = HashSet::new();

        for _depth in 0..=traversal_depth {
            let mut next_frontier: Vec<(String, f32)> = Vec::new();
            for (name, score) in frontier {
                if !visited.insert(name.clone()) {
                    continue;
                }
                let type_ok = entity_types.is_empty()
                    || node_types
                        .get(name.as_str())
                        .is_some_and(|t| entity_types.contains(t));
                if type_ok {
                    let entry = best.entry(name.clone()).or_insert(0.0);
                    if score > *entry {
                        *entry = score;
                    }
                }

                if let Some(edges) = adjacency.get(name.as_str()) {
                    for (triple, neighbor) in edges {
                        if !relationship_types.is_empty()
                            && !relationship_types.contains(&triple.predicate)
                        {
                            continue;
                        }
                        if !visited.contains(*neighbor) {
                            next_frontier.push(((*neighbor).to_string(), score * decay));
                        }
                    }
                }
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }

        let mut nodes: Vec<GraphNode> = best
            .into_iter()
            .map(|(name, score)| {
                let mut chunk_ids: Vec<String> = defining_chunks
                    .get(name.as_str())
                    .map(|ids| ids.iter().map(|s| (*s).to_string()).collect())
                    .unwrap_or_default();
                chunk_ids.sort();
                chunk_ids.dedup();
                GraphNode {
                    name,
                    score,
                    chunk_ids,
                }
            })
            .collect();
        nodes.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        nodes
    }
}

fn matches_types(triple: &Triple, entity_types: &[EntityType]) -> bool {
    if entity_types.is_empty() {
        return true;
    }
    triple
        .subject_type
        .as_ref()
        .is_some_and(|t| entity_types.contains(t))
        || triple
            .object_type
            .as_ref()
            .is_some_and(|t| entity_types.contains(t))
}
