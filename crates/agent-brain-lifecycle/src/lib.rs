//! Agent Brain instance lifecycle
//!
//! Per-project single-writer process management: project root
//! resolution, the advisory lock, the atomic runtime discovery file,
//! and client-side discovery with stale-file eviction.

pub mod error;
pub mod lock;
pub mod project;
pub mod runtime;

pub use error::{LifecycleError, LifecycleResult};
pub use lock::{LockFile, LockInfo, is_pid_alive};
pub use project::{instance_id, resolve_project_root, state_dir};
pub use runtime::{
    RUNTIME_SCHEMA_VERSION, RuntimeState, discover_live_instance, probe_health,
};
