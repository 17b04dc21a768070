//! Instance startup, serving and graceful shutdown
//!
//! `start` resolves the project root, takes the advisory lock (reporting
//! the live instance's base URL when one already serves the project),
//! binds the listener, writes the runtime discovery file atomically,
//! runs the job worker next to the HTTP server, and on shutdown drains
//! the active job before deleting the runtime and lock files.

use crate::bootstrap::build_state;
use crate::routes;
use agent_brain_config::resolve_config;
use agent_brain_lifecycle::{
    LifecycleError, LockFile, RuntimeState, discover_live_instance, resolve_project_root,
    state_dir,
};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Options for the `start` command
#[derive(Debug, Default)]
pub struct StartOptions {
    /// Directory to resolve the project from (defaults to the cwd)
    pub dir: Option<PathBuf>,
    /// Explicit configuration file path
    pub config_path: Option<PathBuf>,
    /// Port override; 0 asks the OS for a free port
    pub port: Option<u16>,
}

/// Start and serve an instance until shutdown
///
/// # Errors
/// Fails on lock conflicts with a live instance, bind conflicts on a
/// requested port, unusable configuration, and backend startup failures.
pub async fn start(options: StartOptions) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    let start_dir = options.dir.unwrap_or_else(|| cwd.clone());
    let project_root = resolve_project_root(&start_dir);

    let (mut config, source) =
        resolve_config(options.config_path.as_deref(), &project_root, &cwd)?;
    if let Some(port) = options.port {
        config.server.port = port;
    }
    agent_brain_common::init::initialize_tracing(&config.logging.level);
    info!(
        "Starting agent-brain for {} (config: {:?})",
        project_root.display(),
        source.path()
    );

    let state_dir = state_dir(&project_root);
    let lock = match LockFile::acquire(&state_dir) {
        Ok(lock) => lock,
        Err(LifecycleError::LockHeld { pid, path }) => {
            // The lock holder may be a live, healthy instance - hand its
            // address to the caller instead of a bare conflict.
            if let Some(live) = discover_live_instance(&state_dir).await {
                return Err(LifecycleError::AlreadyRunning {
                    base_url: live.base_url,
                }
                .into());
            }
            return Err(LifecycleError::LockHeld { pid, path }.into());
        }
        Err(e) => return Err(e.into()),
    };

    // Any leftover runtime file belongs to a dead instance now that we
    // hold the lock.
    RuntimeState::remove(&state_dir)?;

    let (state, worker) = build_state(&project_root, &config).await?;

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
            .await
            .with_context(|| {
                format!(
                    "binding {}:{} (a requested port conflict is fatal)",
                    config.server.host, config.server.port
                )
            })?;
    let port = listener.local_addr()?.port();

    let runtime =
        RuntimeState::for_instance(&project_root, &state.instance_id, &config.server.host, port);
    runtime.write(&state_dir)?;
    info!("Serving at {}", runtime.base_url);

    let worker_shutdown = worker.shutdown_token();
    let worker_task = tokio::spawn(async move { worker.run().await });

    let app = routes::router(Arc::clone(&state));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    // Drain: stop intake, give the active job time to checkpoint.
    info!("Shutting down, draining active job");
    worker_shutdown.cancel();
    let drain = Duration::from_secs(config.server.drain_timeout_secs);
    if tokio::time::timeout(drain, worker_task).await.is_err() {
        warn!("Worker did not drain within {drain:?}");
    }

    if let Err(e) = state.backend.close().await {
        warn!("Backend close failed: {e}");
    }
    RuntimeState::remove(&state_dir)?;
    lock.release()?;
    info!("Shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!("Failed to listen for SIGTERM: {e}"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Stop the instance serving `dir`'s project, if one is alive
///
/// # Errors
/// Surfaces discovery I/O failures; a missing instance is not an error.
pub async fn stop(dir: Option<PathBuf>) -> anyhow::Result<()> {
    let start_dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let project_root = resolve_project_root(&start_dir);
    let state_dir = state_dir(&project_root);

    let Some(live) = discover_live_instance(&state_dir).await else {
        println!("No running instance for {}", project_root.display());
        return Ok(());
    };

    println!("Stopping instance {} (pid {})", live.instance_id, live.pid);
    signal_terminate(live.pid)?;

    // Wait for the health endpoint to go dark.
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        if !agent_brain_lifecycle::probe_health(&live.base_url).await {
            println!("Stopped");
            return Ok(());
        }
    }
    anyhow::bail!("instance did not stop within 15s")
}

#[cfg(unix)]
fn signal_terminate(pid: u32) -> anyhow::Result<()> {
    let status = std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .context("sending SIGTERM")?;
    anyhow::ensure!(status.success(), "kill -TERM {pid} failed");
    Ok(())
}

#[cfg(not(unix))]
fn signal_terminate(pid: u32) -> anyhow::Result<()> {
    anyhow::bail!("stop is only supported on unix; terminate pid {pid} manually")
}

/// Print the status of the instance serving `dir`'s project
///
/// # Errors
/// Surfaces discovery and HTTP failures.
pub async fn status(dir: Option<PathBuf>) -> anyhow::Result<()> {
    let start_dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let project_root = resolve_project_root(&start_dir);
    let state_dir = state_dir(&project_root);

    let Some(live) = discover_live_instance(&state_dir).await else {
        println!("No running instance for {}", project_root.display());
        return Ok(());
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let body: serde_json::Value = client
        .get(format!("{}/health/status", live.base_url))
        .send()
        .await?
        .json()
        .await?;

    println!("Instance {} at {}", live.instance_id, live.base_url);
    println!("  pid:        {}", live.pid);
    println!("  started_at: {}", live.started_at.to_rfc3339());
    println!(
        "  chunks:     {}",
        body.get("total_chunks").and_then(serde_json::Value::as_u64).unwrap_or(0)
    );
    if body
        .get("indexing_in_progress")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
    {
        println!(
            "  indexing:   job {}",
            body.get("current_job_id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("?")
        );
    }
    Ok(())
}
