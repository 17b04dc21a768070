//! Retrieval engine
//!
//! Mode dispatch over the storage backend and graph store, score-level
//! fusion, thresholding, deterministic ordering, a request-scoped
//! deadline, and an LRU result cache invalidated by the index mutation
//! epoch. Backend failures surface as errors - the engine never silently
//! falls back to a lesser mode.

use crate::error::{RetrievalError, RetrievalResult};
use crate::query::{ModeScores, Query, QueryMode, QueryResponse, RankedChunk};
use crate::rerank::RerankStage;
use agent_brain_config::BrainConfig;
use agent_brain_graph::GraphStore;
use agent_brain_ingest::Chunk;
use agent_brain_providers::{EmbeddingProviderRef, RerankProviderRef};
use agent_brain_storage::{SearchHit, StorageBackendRef, rrf_fuse};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-hop score decay during graph traversal
const DEPTH_DECAY: f32 = 0.7;

/// Minimum stage-1 size when reranking
const RERANK_STAGE1_FLOOR: usize = 30;

/// Where the engine reads the index mutation epoch from
pub trait EpochSource: Send + Sync {
    /// Monotonic counter bumped on every index mutation
    fn epoch(&self) -> u64;
}

/// Engine tuning derived from configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Request-scoped deadline propagated to backend calls
    pub request_timeout: Duration,
    /// Graph traversal depth when the query does not override it
    pub default_traversal_depth: usize,
    /// LRU query-result cache entries
    pub cache_size: usize,
    /// Rerank provider call timeout
    pub rerank_timeout: Duration,
}

impl EngineConfig {
    /// Derive engine tuning from the application configuration
    pub fn from_config(config: &BrainConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            default_traversal_depth: config.graph.traversal_depth,
            cache_size: config.indexing.query_cache_size,
            rerank_timeout: Duration::from_millis(config.rerank.timeout_ms),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            default_traversal_depth: 2,
            cache_size: 100,
            rerank_timeout: Duration::from_secs(10),
        }
    }
}

/// Multi-mode retrieval over one project's corpus
pub struct RetrievalEngine {
    backend: StorageBackendRef,
    embedder: EmbeddingProviderRef,
    graph: Option<Arc<GraphStore>>,
    rerank: Option<RerankStage>,
    epoch: Arc<dyn EpochSource>,
    config: EngineConfig,
    cache: Mutex<LruCache<String, QueryResponse>>,
}

impl RetrievalEngine {
    /// Assemble the engine from its collaborators
    pub fn new(
        backend: StorageBackendRef,
        embedder: EmbeddingProviderRef,
        graph: Option<Arc<GraphStore>>,
        reranker: Option<RerankProviderRef>,
        epoch: Arc<dyn EpochSource>,
        config: EngineConfig,
    ) -> Self {
        let cache_size = NonZeroUsize::new(config.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        let rerank = reranker.map(|provider| RerankStage::new(provider, config.rerank_timeout));
        Self {
            backend,
            embedder,
            graph,
            rerank,
            epoch,
            config,
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Whether graph-mode queries are available
    pub fn graph_enabled(&self) -> bool {
        self.graph.is_some()
    }

    /// Whether the rerank stage is available
    pub fn rerank_enabled(&self) -> bool {
        self.rerank.is_some()
    }

    /// Execute a query under the request deadline
    ///
    /// # Errors
    /// See [`RetrievalError`]; notably `InvalidQuery` for a malformed
    /// request, `GraphDisabled`/`RerankDisabled` for missing
    /// capabilities, and `DeadlineExceeded` on timeout.
    pub async fn query(&self, query: &Query) -> RetrievalResult<QueryResponse> {
        query.validate()?;

        let cache_key = format!(
            "{}:{}",
            self.epoch.epoch(),
            serde_json::to_string(query).unwrap_or_default()
        );
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&cache_key) {
                tracing::debug!("Query cache hit");
                return Ok(cached.clone());
            }
        }

        let timeout_ms =
            u64::try_from(self.config.request_timeout.as_millis()).unwrap_or(u64::MAX);
        let response = tokio::time::timeout(self.config.request_timeout, self.execute(query))
            .await
            .map_err(|_| RetrievalError::DeadlineExceeded { timeout_ms })??;

        if !response.rerank_degraded {
            if let Ok(mut cache) = self.cache.lock() {
                cache.put(cache_key, response.clone());
            }
        }
        Ok(response)
    }

    async fn execute(&self, query: &Query) -> RetrievalResult<QueryResponse> {
        let rerank_requested = match query.rerank {
            Some(false) => false,
            Some(true) => {
                if self.rerank.is_none() {
                    return Err(RetrievalError::RerankDisabled);
                }
                true
            }
            None => self.rerank.is_some(),
        };
        let fetch_k = if rerank_requested {
            query.top_k.saturating_mul(3).max(RERANK_STAGE1_FLOOR)
        } else {
            query.top_k
        };

        let stage1: Vec<SearchHit> = match query.mode {
            QueryMode::Vector | QueryMode::Keyword | QueryMode::Hybrid => {
                self.primary_search(query, query.mode, fetch_k).await?
            }
            QueryMode::Graph => self.graph_search(query, fetch_k).await?,
            QueryMode::Multi => self.multi_search(query, fetch_k).await?,
        };

        let (ranked, degraded) = match (&self.rerank, rerank_requested) {
            (Some(stage), true) if !stage1.is_empty() => stage.apply(&query.text, stage1).await,
            _ => (
                stage1
                    .into_iter()
                    .map(|hit| (hit.chunk, hit.score, None))
                    .collect(),
                false,
            ),
        };

        let results = ranked
            .into_iter()
            .take(query.top_k)
            .map(|(chunk, score, rerank_score)| {
                let mut row = RankedChunk::from_chunk(&chunk, score);
                if query.include_scores || rerank_score.is_some() {
                    row.scores = Some(ModeScores {
                        retrieval: Some(score),
                        rerank: rerank_score,
                    });
                }
                if let Some(rerank_score) = rerank_score {
                    row.score = rerank_score;
                    if let Some(scores) = &mut row.scores {
                        // `score` on the row is the rerank ordering; keep the
                        // stage-1 value observable alongside it.
                        scores.retrieval = Some(score);
                    }
                }
                row
            })
            .collect();

        Ok(QueryResponse {
            results,
            mode: query.mode,
            rerank_degraded: degraded,
        })
    }

    /// Vector / keyword / hybrid dispatch with threshold and ordering
    async fn primary_search(
        &self,
        query: &Query,
        mode: QueryMode,
        fetch_k: usize,
    ) -> RetrievalResult<Vec<SearchHit>> {
        let filters = query.filters.storage_filters();
        let hits = match mode {
            QueryMode::Vector => {
                let embedding = self.embed_query(&query.text).await?;
                self.backend.vector_search(&embedding, fetch_k, &filters).await?
            }
            QueryMode::Keyword => {
                self.backend
                    .keyword_search(&query.text, fetch_k, &filters)
                    .await?
            }
            QueryMode::Hybrid => {
                let embedding = self.embed_query(&query.text).await?;
                self.backend
                    .hybrid_search(&embedding, &query.text, fetch_k, query.alpha, &filters)
                    .await?
            }
            QueryMode::Graph | QueryMode::Multi => unreachable!("dispatched separately"),
        };
        Ok(hits
            .into_iter()
            .filter(|hit| hit.score >= query.threshold)
            .collect())
    }

    /// Graph mode: seed from triple text, traverse, hydrate defining chunks
    async fn graph_search(&self, query: &Query, fetch_k: usize) -> RetrievalResult<Vec<SearchHit>> {
        let graph = self.graph.as_ref().ok_or(RetrievalError::GraphDisabled)?;

        let entity_types = query.filters.entity_types();
        let relationship_types = query.filters.relationship_types();
        let seeds_overfetch = fetch_k.saturating_mul(2).max(fetch_k);
        let seed_triples = graph
            .query_triples(&query.text, seeds_overfetch, &entity_types, &relationship_types)
            .await;

        let mut seeds: HashMap<String, f32> = HashMap::new();
        for (triple, score) in seed_triples {
            for node in [&triple.subject, &triple.object] {
                let entry = seeds.entry(node.clone()).or_insert(0.0);
                if score > *entry {
                    *entry = score;
                }
            }
        }
        if seeds.is_empty() {
            return Ok(Vec::new());
        }

        let depth = query
            .traversal_depth
            .unwrap_or(self.config.default_traversal_depth);
        let nodes = graph
            .traverse(&seeds, depth, DEPTH_DECAY, &entity_types, &relationship_types)
            .await;

        // Chunk score = best surviving node that the chunk defined.
        let mut chunk_scores: HashMap<String, f32> = HashMap::new();
        for node in nodes {
            for chunk_id in node.chunk_ids {
                let entry = chunk_scores.entry(chunk_id).or_insert(0.0);
                if node.score > *entry {
                    *entry = node.score;
                }
            }
        }

        let ids: Vec<String> = chunk_scores.keys().cloned().collect();
        let chunks = self.backend.get_by_ids(&ids).await?;
        let storage_filters = query.filters.storage_filters();
        storage_filters.validate()?;

        let mut hits: Vec<SearchHit> = chunks
            .into_iter()
            .filter(|chunk| storage_filters.matches(chunk))
            .filter_map(|chunk| {
                chunk_scores.get(&chunk.chunk_id).map(|score| SearchHit {
                    score: *score,
                    chunk,
                })
            })
            .filter(|hit| hit.score >= query.threshold)
            .collect();
        sort_search_hits(&mut hits);
        hits.truncate(fetch_k);
        Ok(hits)
    }

    /// Multi mode: hybrid and graph independently, fused with RRF
    async fn multi_search(&self, query: &Query, fetch_k: usize) -> RetrievalResult<Vec<SearchHit>> {
        if self.graph.is_none() {
            return Err(RetrievalError::GraphDisabled);
        }

        let (hybrid, graph) = tokio::join!(
            self.primary_search(query, QueryMode::Hybrid, fetch_k),
            self.graph_search(query, fetch_k),
        );
        let hybrid = hybrid?;
        let graph = graph?;

        let mut chunks: HashMap<String, Chunk> = HashMap::new();
        let hybrid_ids: Vec<String> = hybrid
            .iter()
            .map(|hit| hit.chunk.chunk_id.clone())
            .collect();
        let graph_ids: Vec<String> = graph.iter().map(|hit| hit.chunk.chunk_id.clone()).collect();
        for hit in hybrid.into_iter().chain(graph) {
            chunks.entry(hit.chunk.chunk_id.clone()).or_insert(hit.chunk);
        }

        let fused = rrf_fuse(&[hybrid_ids, graph_ids]);
        Ok(fused
            .into_iter()
            .take(fetch_k)
            .filter_map(|(id, score)| chunks.remove(&id).map(|chunk| SearchHit { chunk, score }))
            .collect())
    }

    async fn embed_query(&self, text: &str) -> RetrievalResult<Vec<f32>> {
        let mut embeddings = self.embedder.embed_batch(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| RetrievalError::Other("embedder returned no vector".to_string()))
    }
}

/// Canonical hit ordering: score descending, chunk id ascending on ties
fn sort_search_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
}
