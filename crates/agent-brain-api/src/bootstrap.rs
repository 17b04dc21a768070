//! Instance bootstrap
//!
//! Constructs providers, backend, graph, queue, service and engine from
//! the resolved configuration. Everything is per-instance state passed by
//! reference; a dimension-metadata conflict is recorded rather than
//! aborting so `/health` can report it and queries can answer 503 until
//! the project is reset.

use crate::state::{AppState, Capabilities, ServiceEpoch, SharedState};
use agent_brain_config::{BrainConfig, StorageBackendKind};
use agent_brain_graph::{GraphStore, LlmExtractor};
use agent_brain_indexing::{
    BrainJobHandler, GraphFacilities, IndexingService, PipelineConfig,
};
use agent_brain_jobs::{JobQueue, JobWorker, WorkerConfig};
use agent_brain_providers::{
    HttpReranker, RerankProviderRef, build_embedding_provider, build_text_generator,
};
use agent_brain_retrieval::{EngineConfig, RetrievalEngine};
use agent_brain_storage::{
    EmbeddedBackend, PostgresBackend, StorageBackendRef, StorageError,
};
use anyhow::Context;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

/// Build the full application state and its job worker
///
/// # Errors
/// Fails on unusable configuration, unreachable relational backend, or
/// provider construction problems. A `StorageDimensionMismatch` is NOT an
/// error here - it is recorded on the state for `/health` to report.
pub async fn build_state(
    project_root: &Path,
    config: &BrainConfig,
) -> anyhow::Result<(SharedState, JobWorker)> {
    let state_dir = agent_brain_lifecycle::state_dir(project_root);
    let index_dir = state_dir.join("index");
    let jobs_dir = state_dir.join("jobs");

    let backend: StorageBackendRef = match config.storage.backend {
        StorageBackendKind::Embedded => Arc::new(
            EmbeddedBackend::open(&index_dir, config.storage.metric)
                .context("opening embedded index")?,
        ),
        StorageBackendKind::Postgres => {
            let pg = config
                .storage
                .postgres
                .as_ref()
                .context("storage.postgres section is required")?;
            Arc::new(
                PostgresBackend::connect(pg, config.storage.metric)
                    .await
                    .context("connecting to postgres")?,
            )
        }
    };

    let dimension_error = match backend
        .initialize(config.embedding.dimension, &config.embedding.model)
        .await
    {
        Ok(()) => None,
        Err(e @ StorageError::DimensionMismatch { .. }) => {
            tracing::error!("{e}");
            Some(e.to_string())
        }
        Err(e) => return Err(e).context("initializing storage backend"),
    };
    let dimension_guard: agent_brain_indexing::DimensionGuard =
        Arc::new(std::sync::RwLock::new(dimension_error));

    let embedder =
        build_embedding_provider(&config.embedding).context("building embedding provider")?;

    let summarizer = config
        .summarization
        .as_ref()
        .map(build_text_generator)
        .transpose()
        .context("building summarization provider")?;

    let graph_store = if config.graph.enabled {
        Some(Arc::new(
            GraphStore::open(&index_dir).context("opening graph store")?,
        ))
    } else {
        None
    };

    let graph_facilities = match &graph_store {
        Some(store) => {
            let llm = if config.graph.use_llm_extraction {
                let generation = config
                    .graph
                    .extraction
                    .as_ref()
                    .or(config.summarization.as_ref())
                    .context("graph.use_llm_extraction requires graph.extraction or summarization")?;
                let generator =
                    build_text_generator(generation).context("building extraction provider")?;
                Some(Arc::new(LlmExtractor::new(
                    generator,
                    config.graph.max_triplets_per_chunk,
                )))
            } else {
                None
            };
            Some(GraphFacilities {
                store: Arc::clone(store),
                llm,
                use_ast: config.graph.use_ast_extraction,
            })
        }
        None => None,
    };

    let reranker: Option<RerankProviderRef> = if config.rerank.enabled {
        Some(Arc::new(HttpReranker::from_config(&config.rerank)?))
    } else {
        None
    };

    let queue = Arc::new(JobQueue::open(&jobs_dir).context("opening job queue")?);

    let service = Arc::new(
        IndexingService::new(
            project_root.to_path_buf(),
            &index_dir,
            Arc::clone(&backend),
            Arc::clone(&embedder),
            summarizer.clone(),
            graph_facilities,
            PipelineConfig::from_config(config),
            agent_brain_ingest::default_counter(),
            config.embedding.model.clone(),
            config.embedding.dimension,
            Arc::clone(&dimension_guard),
        )
        .context("creating indexing service")?,
    );

    let engine = Arc::new(RetrievalEngine::new(
        Arc::clone(&backend),
        Arc::clone(&embedder),
        graph_store,
        reranker,
        Arc::new(ServiceEpoch(Arc::clone(&service))),
        EngineConfig::from_config(config),
    ));

    let worker = JobWorker::new(
        Arc::clone(&queue),
        Arc::new(BrainJobHandler::new(Arc::clone(&service))),
        Arc::clone(&service) as _,
        WorkerConfig::default(),
    );
    // Jobs replayed as PENDING should run without waiting for a new enqueue
    if queue.has_pending() {
        queue.poke();
    }

    let state = Arc::new(AppState {
        engine,
        queue,
        service,
        backend,
        capabilities: Capabilities {
            graph: config.graph.enabled,
            rerank: config.rerank.enabled,
            summarization: summarizer.is_some(),
        },
        instance_id: agent_brain_lifecycle::instance_id(project_root),
        embedding_model: config.embedding.model.clone(),
        embedding_dim: config.embedding.dimension,
        started_at: Utc::now(),
        dimension_guard,
    });

    Ok((state, worker))
}
