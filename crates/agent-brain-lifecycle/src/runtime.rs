//! Runtime discovery file
//!
//! A small JSON file written by the running instance after it binds its
//! listener, consulted by every client. At most one live instance per
//! project owns it; stale files (dead PID or failing health check) are
//! treated as absent and evicted by the next startup. No environment
//! variable overrides a valid runtime file - it is the single source of
//! truth for the handoff.

use crate::error::LifecycleResult;
use crate::lock::is_pid_alive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const RUNTIME_FILE: &str = "runtime.json";

/// Current schema version of the runtime file
pub const RUNTIME_SCHEMA_VERSION: u32 = 1;

/// The discovery record written by a live instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Serving mode (currently always "http")
    pub mode: String,
    /// The project this instance serves
    pub project_root: PathBuf,
    /// Stable id derived from the project path hash
    pub instance_id: String,
    /// Base URL clients should talk to
    pub base_url: String,
    /// Bound port
    pub port: u16,
    /// Owning process id
    pub pid: u32,
    /// RFC 3339 start timestamp
    pub started_at: DateTime<Utc>,
}

impl RuntimeState {
    /// Build the record for this process
    pub fn for_instance(project_root: &Path, instance_id: &str, host: &str, port: u16) -> Self {
        Self {
            schema_version: RUNTIME_SCHEMA_VERSION,
            mode: "http".to_string(),
            project_root: project_root.to_path_buf(),
            instance_id: instance_id.to_string(),
            base_url: format!("http://{host}:{port}"),
            port,
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    /// Path of the runtime file under a state directory
    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join(RUNTIME_FILE)
    }

    /// Write the file atomically (write-then-rename)
    ///
    /// # Errors
    /// Surfaces I/O and serialization failures.
    pub fn write(&self, state_dir: &Path) -> LifecycleResult<()> {
        std::fs::create_dir_all(state_dir)?;
        let path = Self::path_in(state_dir);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Read the file without any liveness verification
    pub fn read(state_dir: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(Self::path_in(state_dir)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Remove the file if present
    ///
    /// # Errors
    /// Surfaces removal failures other than the file already being gone.
    pub fn remove(state_dir: &Path) -> LifecycleResult<()> {
        match std::fs::remove_file(Self::path_in(state_dir)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Discover the live instance for a project, if any
///
/// Reads the runtime file, verifies the PID is alive and the health
/// endpoint answers; anything less is treated as absent.
pub async fn discover_live_instance(state_dir: &Path) -> Option<RuntimeState> {
    let state = RuntimeState::read(state_dir)?;
    if !is_pid_alive(state.pid) {
        tracing::debug!("Runtime file names dead pid {}", state.pid);
        return None;
    }
    if probe_health(&state.base_url).await {
        Some(state)
    } else {
        tracing::debug!("Instance at {} does not answer /health", state.base_url);
        None
    }
}

/// Whether `base_url/health` answers 200 within a short timeout
pub async fn probe_health(base_url: &str) -> bool {
    let Ok(client) = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    else {
        return false;
    };
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    client
        .get(&url)
        .send()
        .await
        .map(|response| response.status().is_success())
        .unwrap_or(false)
}
