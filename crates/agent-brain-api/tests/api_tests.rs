//! HTTP surface tests against a real embedded-backend instance
//!
//! The app state is bootstrapped with the mock embedding provider, so the
//! full index -> query flow runs offline.

use agent_brain_api::routes::router;
use agent_brain_api::{SharedState, build_state};
use agent_brain_config::BrainConfig;
use agent_brain_jobs::JobWorker;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::path::Path;
use std::time::Duration;
use tower::ServiceExt;

fn test_config() -> BrainConfig {
    BrainConfig::from_yaml(
        "embedding:\n  provider: mock\n  model: mock-model\n  dimension: 32\n",
    )
    .unwrap()
}

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

async fn instance() -> (Router, SharedState, JobWorker, tempfile::TempDir) {
    let project = tempfile::tempdir().unwrap();
    write_file(
        project.path(),
        "docs/hello.md",
        "# Hello\n\nHello world from the retrieval service.\n\nIt answers natural language queries.",
    );
    let (state, worker) = build_state(project.path(), &test_config()).await.unwrap();
    (router(state.clone()), state, worker, project)
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(body.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Poll one job until it is terminal
async fn wait_for_job(app: &Router, job_id: &str) -> serde_json::Value {
    for _ in 0..200 {
        let (status, body) = send_json(app, "GET", &format!("/index/jobs/{job_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let job_status = body["status"].as_str().unwrap_or_default().to_string();
        if ["DONE", "FAILED", "CANCELLED"].contains(&job_status.as_str()) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

#[tokio::test]
async fn health_reports_capabilities_and_model() {
    let (app, _state, _worker, _project) = instance().await;
    let (status, body) = send_json(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["embedding_model"], "mock-model");
    assert_eq!(body["capabilities"]["graph"], false);
    assert_eq!(body["mode"], "http");
}

#[tokio::test]
async fn empty_corpus_query_returns_empty_list_not_error() {
    let (app, _state, _worker, _project) = instance().await;
    let (status, body) = send_json(
        &app,
        "POST",
        "/query",
        Some(serde_json::json!({"text": "hello", "mode": "hybrid", "top_k": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert_eq!(body["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn invalid_queries_are_400() {
    let (app, _state, _worker, _project) = instance().await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/query",
        Some(serde_json::json!({"text": "", "mode": "vector"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "InvalidQuery");

    let (status, _) = send_json(
        &app,
        "POST",
        "/query",
        Some(serde_json::json!({"text": "x", "top_k": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn graph_mode_without_capability_is_graph_disabled() {
    let (app, _state, _worker, _project) = instance().await;
    let (status, body) = send_json(
        &app,
        "POST",
        "/query",
        Some(serde_json::json!({"text": "anything", "mode": "graph"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "GraphDisabled");
    assert!(body["hint"].as_str().unwrap().contains("graph.enabled"));
}

#[tokio::test]
async fn unknown_job_is_404() {
    let (app, _state, _worker, _project) = instance().await;
    let (status, body) = send_json(
        &app,
        "GET",
        "/index/jobs/00000000-0000-0000-0000-000000000000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_kind"], "UnknownJob");
}

#[tokio::test]
async fn index_then_query_round_trip() {
    let (app, _state, worker, _project) = instance().await;
    let worker_task = tokio::spawn(async move { worker.run().await });

    // 202 with a job id
    let (status, body) = send_json(
        &app,
        "POST",
        "/index",
        Some(serde_json::json!({"folder_path": "."})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let job = wait_for_job(&app, &job_id).await;
    assert_eq!(job["status"], "DONE", "job failed: {job:?}");
    assert!(job["chunks_after"].as_u64().unwrap() > 0);

    // The indexed chunk is retrievable
    let (status, body) = send_json(
        &app,
        "POST",
        "/query",
        Some(serde_json::json!({
            "text": "hello world retrieval",
            "mode": "hybrid",
            "top_k": 3,
            "threshold": 0.1,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["total"].as_u64().unwrap() > 0);
    let first = &body["results"][0];
    assert_eq!(first["source_path"], "docs/hello.md");
    assert_eq!(body["rerank_degraded"], false);

    // Status endpoint reflects the indexed corpus
    let (status, body) = send_json(&app, "GET", "/health/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["total_chunks"].as_u64().unwrap() > 0);

    worker_task.abort();
}

#[tokio::test]
async fn hybrid_alpha_one_matches_vector_mode() {
    let (app, _state, worker, _project) = instance().await;
    let worker_task = tokio::spawn(async move { worker.run().await });

    let (_, body) = send_json(
        &app,
        "POST",
        "/index",
        Some(serde_json::json!({"folder_path": "."})),
    )
    .await;
    let job_id = body["job_id"].as_str().unwrap().to_string();
    wait_for_job(&app, &job_id).await;

    let vector = send_json(
        &app,
        "POST",
        "/query",
        Some(serde_json::json!({
            "text": "natural language queries",
            "mode": "vector",
            "top_k": 5,
            "threshold": 0.0,
        })),
    )
    .await
    .1;
    let hybrid = send_json(
        &app,
        "POST",
        "/query",
        Some(serde_json::json!({
            "text": "natural language queries",
            "mode": "hybrid",
            "alpha": 1.0,
            "top_k": 5,
            "threshold": 0.0,
        })),
    )
    .await
    .1;

    let ids = |body: &serde_json::Value| -> Vec<String> {
        body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["chunk_id"].as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(ids(&vector), ids(&hybrid));

    worker_task.abort();
}

#[tokio::test]
async fn jobs_listing_pages_newest_first() {
    let (app, _state, _worker, _project) = instance().await;

    for _ in 0..3 {
        let (status, _) = send_json(
            &app,
            "POST",
            "/index",
            Some(serde_json::json!({"folder_path": "."})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let (status, body) = send_json(&app, "GET", "/index/jobs?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobs"].as_array().unwrap().len(), 2);

    let (status, body) = send_json(&app, "GET", "/index/jobs?status=PENDING", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobs"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn cancel_pending_job_is_idempotent() {
    // No worker running, so the job stays PENDING until cancelled
    let (app, _state, _worker, _project) = instance().await;

    let (_, body) = send_json(
        &app,
        "POST",
        "/index",
        Some(serde_json::json!({"folder_path": "."})),
    )
    .await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, body) =
        send_json(&app, "POST", &format!("/index/jobs/{job_id}/cancel"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");

    // Cancelling again returns the same terminal record
    let (status, body) =
        send_json(&app, "POST", &format!("/index/jobs/{job_id}/cancel"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");
}

#[tokio::test]
async fn add_conflicts_while_a_job_is_running() {
    // Without a worker, claim the job manually to simulate RUNNING
    let (app, state, _worker, _project) = instance().await;

    let (_, _body) = send_json(
        &app,
        "POST",
        "/index",
        Some(serde_json::json!({"folder_path": "."})),
    )
    .await;
    let _claimed = state.queue.claim_next().unwrap().unwrap();

    let (status, body) = send_json(
        &app,
        "POST",
        "/index/add",
        Some(serde_json::json!({"folder_path": "./docs"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_kind"], "JobRunning");
}
