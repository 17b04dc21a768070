//! Full-pipeline tests over the embedded backend and mock providers
//!
//! Exercise the worker protocol end to end: index a folder, verify
//! chunk-count deltas, re-index without changes, reset.

use agent_brain_config::DistanceMetric;
use agent_brain_indexing::{BrainJobHandler, IndexingService, PipelineConfig};
use agent_brain_ingest::default_counter;
use agent_brain_jobs::{
    CorpusCounts, JobKind, JobQueue, JobStatus, JobWorker, WorkerConfig,
};
use agent_brain_providers::MockEmbedder;
use agent_brain_storage::{EmbeddedBackend, Filters, StorageBackend, StorageBackendRef};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const DIMENSION: usize = 32;

struct Harness {
    queue: Arc<JobQueue>,
    service: Arc<IndexingService>,
    backend: StorageBackendRef,
    _project: tempfile::TempDir,
}

impl Harness {
    async fn new() -> Self {
        let project = tempfile::tempdir().unwrap();
        write_file(
            project.path(),
            "docs/guide.md",
            "# Guide\n\nAgent Brain indexes your documents and code.\n\nQueries run against the local index.",
        );
        write_file(
            project.path(),
            "src/lib.rs",
            "use std::collections::HashMap;\n\nfn lookup(map: &HashMap<String, u32>, key: &str) -> Option<u32> {\n    map.get(key).copied()\n}\n",
        );
        write_file(project.path(), "assets/logo.png", "binary-ish");

        let state_dir = project.path().join(".agent-brain");
        let index_dir = state_dir.join("index");
        let backend: StorageBackendRef = Arc::new(
            EmbeddedBackend::open(&index_dir, DistanceMetric::Cosine).unwrap(),
        );
        backend.initialize(DIMENSION, "mock").await.unwrap();

        let service = Arc::new(
            IndexingService::new(
                project.path().to_path_buf(),
                &index_dir,
                Arc::clone(&backend),
                Arc::new(MockEmbedder::new("mock", DIMENSION)),
                None,
                None,
                PipelineConfig {
                    chunk_size: 128,
                    chunk_overlap: 16,
                    embed_batch_size: 8,
                    embed_concurrency: 2,
                    include: Vec::new(),
                    exclude: Vec::new(),
                },
                default_counter(),
                "mock".to_string(),
                DIMENSION,
                Arc::new(std::sync::RwLock::new(None)),
            )
            .unwrap(),
        );

        let queue = Arc::new(JobQueue::open(&state_dir.join("jobs")).unwrap());

        Self {
            queue,
            service,
            backend,
            _project: project,
        }
    }

    /// Run a fresh worker until `job_id` is terminal, then stop it
    async fn run_to_completion(&self, job_id: Uuid) -> agent_brain_jobs::JobRecord {
        let worker = JobWorker::new(
            Arc::clone(&self.queue),
            Arc::new(BrainJobHandler::new(Arc::clone(&self.service))),
            Arc::clone(&self.service) as Arc<dyn CorpusCounts>,
            WorkerConfig {
                poll_interval: Duration::from_millis(10),
            },
        );
        let mut receiver = self.queue.watch(job_id).unwrap();
        let shutdown = worker.shutdown_token();
        let watcher = async {
            loop {
                receiver.changed().await.unwrap();
                let record = receiver.borrow().clone();
                if record.status.is_terminal() {
                    shutdown.cancel();
                    return record;
                }
            }
        };
        let (record, ()) = tokio::join!(watcher, worker.run());
        record
    }

    async fn chunk_count(&self) -> usize {
        self.backend.get_count(&Filters::none()).await.unwrap()
    }
}

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn index_params() -> serde_json::Value {
    serde_json::json!({
        "folder_path": ".",
        "recursive": true,
        "include_code": true,
        "force": false,
    })
}

#[tokio::test]
async fn fresh_index_job_completes_with_chunks() {
    let harness = Harness::new().await;
    let job = harness
        .queue
        .enqueue(JobKind::IndexPath, index_params())
        .unwrap();

    let record = harness.run_to_completion(job.job_id).await;
    assert_eq!(record.status, JobStatus::Done, "error: {:?}", record.error);
    assert_eq!(record.chunks_before, Some(0));
    assert!(record.chunks_after.unwrap() > 0);

    // Both the document and the code file produced chunks; the png did not
    let count = harness.chunk_count().await;
    assert_eq!(count, record.chunks_after.unwrap());
    let progress = record.progress.unwrap();
    assert_eq!(progress.files_processed, 2);
    assert!(progress.files_skipped >= 1);
}

#[tokio::test]
async fn reindex_without_changes_is_a_no_op() {
    let harness = Harness::new().await;
    let first = harness
        .queue
        .enqueue(JobKind::IndexPath, index_params())
        .unwrap();
    let first = harness.run_to_completion(first.job_id).await;
    assert_eq!(first.status, JobStatus::Done);
    let count_after_first = harness.chunk_count().await;

    let second = harness
        .queue
        .enqueue(JobKind::IndexPath, index_params())
        .unwrap();
    let second = harness.run_to_completion(second.job_id).await;
    assert_eq!(second.status, JobStatus::Done);

    assert_eq!(harness.chunk_count().await, count_after_first);
    // Every file deduplicated against the ledger
    assert_eq!(second.progress.unwrap().files_processed, 0);
}

#[tokio::test]
async fn reset_job_empties_the_index() {
    let harness = Harness::new().await;
    let index = harness
        .queue
        .enqueue(JobKind::IndexPath, index_params())
        .unwrap();
    harness.run_to_completion(index.job_id).await;
    assert!(harness.chunk_count().await > 0);

    let reset = harness
        .queue
        .enqueue(JobKind::Reset, serde_json::json!({}))
        .unwrap();
    let record = harness.run_to_completion(reset.job_id).await;
    assert_eq!(record.status, JobStatus::Done, "error: {:?}", record.error);
    assert_eq!(record.chunks_after, Some(0));
    assert_eq!(harness.chunk_count().await, 0);
}

#[tokio::test]
async fn indexed_chunks_are_searchable() {
    let harness = Harness::new().await;
    let job = harness
        .queue
        .enqueue(JobKind::IndexPath, index_params())
        .unwrap();
    harness.run_to_completion(job.job_id).await;

    let hits = harness
        .backend
        .keyword_search("documents and code", 5, &Filters::none())
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].chunk.source_path, "docs/guide.md");

    // Code chunks carry language metadata from the splitter
    let code_hits = harness
        .backend
        .keyword_search("lookup HashMap", 5, &Filters::none())
        .await
        .unwrap();
    assert!(
        code_hits
            .iter()
            .any(|hit| hit.chunk.language.as_deref() == Some("rust"))
    );
}
