//! Indexing service
//!
//! Orchestrates the staged pipeline: discover files, dedupe against the
//! content-hash ledger, split by type, optionally summarize, embed with
//! bounded fan-out, optionally extract graph triples, upsert, and record
//! the ledger entry. Per-item failures (one unparseable file, one chunk
//! whose summary failed) are logged and counted but never fail the job;
//! systemic failures (provider auth, backend down) do.

use crate::error::{IndexingError, IndexingResult};
use crate::ledger::FileLedger;
use agent_brain_config::BrainConfig;
use agent_brain_graph::{GraphStore, LlmExtractor, extract_structural};
use agent_brain_ingest::{
    Chunk, CodeSplitter, DiscoveryConfig, DocumentSplitter, DocumentSplitterConfig, FileKind,
    SourceType, TokenCounterRef, discover, hash_content,
};
use agent_brain_jobs::{
    CorpusCounts, HandlerOutcome, JobHandler, JobKind, JobProgress, JobRecord, ProgressReporter,
};
use agent_brain_providers::{EmbeddingProviderRef, TextGeneratorRef, embed_all};
use agent_brain_storage::{Filters, StorageBackendRef};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared handle for the embedding-metadata guard
///
/// Set at startup when the stored metadata conflicts with configuration;
/// cleared by a successful reset. While set, queries answer 503.
pub type DimensionGuard = Arc<RwLock<Option<String>>>;

/// Graph extraction facilities, present when the graph is enabled
pub struct GraphFacilities {
    /// The triple store
    pub store: Arc<GraphStore>,
    /// LLM extractor, when `use_llm_extraction` is on
    pub llm: Option<Arc<LlmExtractor>>,
    /// Whether the AST extractor runs over code chunks
    pub use_ast: bool,
}

/// Pipeline tuning derived from configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target chunk size in tokens
    pub chunk_size: usize,
    /// Token overlap between adjacent document chunks
    pub chunk_overlap: usize,
    /// Texts per embedding request
    pub embed_batch_size: usize,
    /// Bounded fan-out for embedding calls
    pub embed_concurrency: usize,
    /// Discovery include globs
    pub include: Vec<String>,
    /// Discovery exclude globs
    pub exclude: Vec<String>,
}

impl PipelineConfig {
    /// Derive pipeline tuning from the application configuration
    pub fn from_config(config: &BrainConfig) -> Self {
        Self {
            chunk_size: config.indexing.chunk_size,
            chunk_overlap: config.indexing.chunk_overlap,
            embed_batch_size: config.embedding.batch_size,
            embed_concurrency: config.indexing.embed_concurrency,
            include: config.indexing.include.clone(),
            exclude: config.indexing.exclude.clone(),
        }
    }
}

/// Parameters of an `index_path` / `add_path` job
#[derive(Debug, Clone, Deserialize)]
pub struct IndexParams {
    /// Folder to index, absolute or relative to the project root
    pub folder_path: String,
    /// Whether to descend into subdirectories
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Whether code files are ingested
    #[serde(default = "default_true")]
    pub include_code: bool,
    /// Per-request chunk size override
    #[serde(default)]
    pub chunk_size: Option<usize>,
    /// Per-request chunk overlap override
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
    /// Re-ingest files whose content hash is unchanged
    #[serde(default)]
    pub force: bool,
}

const fn default_true() -> bool {
    true
}

/// The indexing service: turns folders into stored, embedded chunks
pub struct IndexingService {
    project_root: PathBuf,
    backend: StorageBackendRef,
    embedder: EmbeddingProviderRef,
    summarizer: Option<TextGeneratorRef>,
    graph: Option<GraphFacilities>,
    config: PipelineConfig,
    counter: TokenCounterRef,
    embedding_model: String,
    embedding_dim: usize,
    dimension_guard: DimensionGuard,
    ledger: tokio::sync::Mutex<FileLedger>,
    epoch: AtomicU64,
}

impl IndexingService {
    /// Create the service over an opened backend and providers
    ///
    /// `index_dir` is `{state_dir}/index`, holding the dedupe ledger.
    ///
    /// # Errors
    /// Surfaces ledger I/O failures.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_root: PathBuf,
        index_dir: &Path,
        backend: StorageBackendRef,
        embedder: EmbeddingProviderRef,
        summarizer: Option<TextGeneratorRef>,
        graph: Option<GraphFacilities>,
        config: PipelineConfig,
        counter: TokenCounterRef,
        embedding_model: String,
        embedding_dim: usize,
        dimension_guard: DimensionGuard,
    ) -> IndexingResult<Self> {
        let ledger = FileLedger::open(index_dir)?;
        Ok(Self {
            project_root,
            backend,
            embedder,
            summarizer,
            graph,
            config,
            counter,
            embedding_model,
            embedding_dim,
            dimension_guard,
            ledger: tokio::sync::Mutex::new(ledger),
            epoch: AtomicU64::new(0),
        })
    }

    /// Monotonic index mutation epoch, for query-cache invalidation
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether the graph capability is available
    pub fn graph_enabled(&self) -> bool {
        self.graph.is_some()
    }

    /// Index a folder per `params`, honoring cancellation at file
    /// boundaries so the index never contains half a file's chunks
    ///
    /// # Errors
    /// Systemic failures only; per-file problems are skipped and counted.
    pub async fn index_folder(
        &self,
        params: &IndexParams,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> IndexingResult<HandlerOutcome> {
        let root = self.resolve_path(&params.folder_path);
        let discovery = DiscoveryConfig {
            include: self.config.include.clone(),
            exclude: self.config.exclude.clone(),
            recursive: params.recursive,
            include_code: params.include_code,
        };
        let report = discover(&root, &discovery, agent_brain_config::STATE_DIR_NAME)?;

        let chunk_size = params.chunk_size.unwrap_or(self.config.chunk_size);
        let chunk_overlap = params.chunk_overlap.unwrap_or(self.config.chunk_overlap);

        let mut counters = JobProgress {
            files_skipped: report.skipped.len(),
            ..JobProgress::default()
        };
        info!(
            "Indexing {} files from {} ({} skipped as unsupported)",
            report.files.len(),
            root.display(),
            report.skipped.len()
        );

        for file in &report.files {
            if cancel.is_cancelled() {
                info!("Indexing cancelled after {} files", counters.files_processed);
                return Ok(HandlerOutcome::Cancelled);
            }

            match self
                .process_file(&file.absolute_path, &file.relative_path, &file.kind, chunk_size, chunk_overlap, params.force)
                .await
            {
                Ok(Some(written)) => {
                    counters.files_processed += 1;
                    counters.chunks_written += written;
                }
                Ok(None) => counters.files_skipped += 1,
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => {
                    warn!("Skipping {}: {e}", file.relative_path);
                    counters.files_skipped += 1;
                }
            }
            progress.report(counters);
        }

        Ok(HandlerOutcome::Completed)
    }

    /// Load, split, summarize, embed, extract and upsert one file
    ///
    /// Returns `Ok(None)` when the file is skipped (binary, unchanged,
    /// empty) and `Ok(Some(chunk_count))` after a successful upsert.
    async fn process_file(
        &self,
        absolute_path: &Path,
        relative_path: &str,
        kind: &FileKind,
        chunk_size: usize,
        chunk_overlap: usize,
        force: bool,
    ) -> IndexingResult<Option<usize>> {
        let Some(content) = read_text(absolute_path)? else {
            debug!("Skipping binary file {relative_path}");
            return Ok(None);
        };

        let content_hash = hash_content(&content);
        {
            let ledger = self.ledger.lock().await;
            if !force && ledger.is_unchanged(relative_path, &content_hash) {
                debug!("Skipping unchanged file {relative_path}");
                return Ok(None);
            }
        }

        let mut chunks = self.split_file(relative_path, &content, kind, chunk_size, chunk_overlap);
        if chunks.is_empty() {
            debug!("File {relative_path} produced zero chunks");
            return Ok(None);
        }

        if let Some(summarizer) = &self.summarizer {
            for chunk in &mut chunks {
                chunk.summary = crate::summarize::summarize_chunk(summarizer, chunk).await;
            }
        }

        // Embedding fan-out joins before any upsert for the file.
        let texts: Vec<String> = chunks.iter().map(Chunk::embeddable_text).collect();
        let embeddings = embed_all(
            &self.embedder,
            &texts,
            self.config.embed_batch_size,
            self.config.embed_concurrency,
        )
        .await?;
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }

        // Replace, never accumulate: stale higher-index chunks of a
        // shrunken file must not survive the upsert.
        self.backend.delete_by_source(relative_path).await?;
        let written = self.backend.upsert(&chunks).await?;

        if let Some(graph) = &self.graph {
            let triples = self.extract_triples(graph, &chunks).await;
            if !triples.is_empty() {
                graph.store.add_triples(triples).await?;
            }
        }

        self.ledger.lock().await.record(relative_path, &content_hash)?;
        self.bump_epoch();
        Ok(Some(written))
    }

    fn split_file(
        &self,
        relative_path: &str,
        content: &str,
        kind: &FileKind,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Vec<Chunk> {
        let document_splitter = DocumentSplitter::new(
            DocumentSplitterConfig {
                chunk_size,
                chunk_overlap,
            },
            Arc::clone(&self.counter),
        );

        match kind {
            FileKind::Code(language) => {
                let splitter = CodeSplitter::new(chunk_size, Arc::clone(&self.counter));
                match splitter.split(relative_path, content, language) {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!("Code parse failed for {relative_path}, using document splitter: {e}");
                        let mut chunks = document_splitter.split(relative_path, content);
                        for chunk in &mut chunks {
                            chunk.source_type = SourceType::Code;
                            chunk.language = Some((*language).to_string());
                        }
                        chunks
                    }
                }
            }
            FileKind::Document | FileKind::Skipped => {
                document_splitter.split(relative_path, content)
            }
        }
    }

    async fn extract_triples(
        &self,
        graph: &GraphFacilities,
        chunks: &[Chunk],
    ) -> Vec<agent_brain_graph::Triple> {
        let mut triples = Vec::new();
        for chunk in chunks {
            if graph.use_ast {
                triples.extend(extract_structural(chunk));
            }
            if let Some(llm) = &graph.llm {
                match llm.extract(chunk).await {
                    Ok(extracted) => triples.extend(extracted),
                    Err(e) => warn!("Triple extraction failed for {}: {e}", chunk.chunk_id),
                }
            }
        }
        triples
    }

    /// Re-run graph extraction over the stored corpus
    ///
    /// # Errors
    /// `IndexingError::Other` when the graph capability is disabled.
    pub async fn rebuild_graph(
        &self,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> IndexingResult<HandlerOutcome> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| IndexingError::Other("graph extraction is disabled".to_string()))?;

        graph.store.reset().await?;
        let chunks = self.backend.list_chunks(&Filters::none()).await?;
        info!("Rebuilding graph over {} chunks", chunks.len());

        let mut counters = JobProgress::default();
        for chunk in &chunks {
            if cancel.is_cancelled() {
                return Ok(HandlerOutcome::Cancelled);
            }
            let triples = self.extract_triples(graph, std::slice::from_ref(chunk)).await;
            if !triples.is_empty() {
                graph.store.add_triples(triples).await?;
            }
            counters.files_processed += 1;
            progress.report(counters);
        }
        self.bump_epoch();
        Ok(HandlerOutcome::Completed)
    }

    /// Drop all chunks, triples and ledger entries, then re-initialize
    /// the backend for the configured embedding model
    ///
    /// # Errors
    /// Surfaces backend failures.
    pub async fn reset(&self) -> IndexingResult<HandlerOutcome> {
        self.backend.reset().await?;
        self.backend
            .initialize(self.embedding_dim, &self.embedding_model)
            .await?;
        if let Some(graph) = &self.graph {
            graph.store.reset().await?;
        }
        self.ledger.lock().await.clear()?;
        if let Ok(mut guard) = self.dimension_guard.write() {
            if guard.take().is_some() {
                info!("Embedding metadata guard cleared by reset");
            }
        }
        self.bump_epoch();
        Ok(HandlerOutcome::Completed)
    }

    fn resolve_path(&self, folder_path: &str) -> PathBuf {
        let path = Path::new(folder_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

impl IndexingError {
    /// Systemic errors fail the whole job; the rest skip the file
    fn is_systemic(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Storage(_) | Self::Graph(_)
        )
    }
}

/// Read a file as text, returning `None` for binary content
///
/// PDF and docx files are read through their pre-extracted `.txt`
/// sidecar.
fn read_text(path: &Path) -> IndexingResult<Option<String>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let effective = if ext == "pdf" || ext == "docx" {
        path.with_extension(format!("{ext}.txt"))
    } else {
        path.to_path_buf()
    };

    let bytes = std::fs::read(&effective)?;
    if bytes.contains(&0) {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Job handler wiring the service into the queue's worker
pub struct BrainJobHandler {
    service: Arc<IndexingService>,
}

impl BrainJobHandler {
    /// Wrap the service as the worker's handler
    pub fn new(service: Arc<IndexingService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for BrainJobHandler {
    async fn run(
        &self,
        job: &JobRecord,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<HandlerOutcome, String> {
        let outcome = match job.kind {
            JobKind::IndexPath | JobKind::AddPath => {
                let params: IndexParams = serde_json::from_value(job.params.clone())
                    .map_err(|e| format!("invalid job params: {e}"))?;
                self.service.index_folder(&params, cancel, progress).await
            }
            JobKind::RebuildGraph => self.service.rebuild_graph(cancel, progress).await,
            JobKind::Reset => self.service.reset().await,
        };
        outcome.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl CorpusCounts for IndexingService {
    async fn chunk_count(&self) -> Result<usize, String> {
        self.backend
            .get_count(&Filters::none())
            .await
            .map_err(|e| e.to_string())
    }

    async fn graph_node_count(&self) -> Result<Option<usize>, String> {
        match &self.graph {
            Some(graph) => Ok(Some(graph.store.node_count().await)),
            None => Ok(None),
        }
    }
}
