//! Global initialization utilities for the application

use std::sync::Once;

static INIT: Once = Once::new();
static TRACING: Once = Once::new();

/// Initialize the application environment
///
/// This should be called once at the start of the application to load
/// environment variables from a .env file. Safe to call multiple times -
/// will only run once.
pub fn initialize_environment() {
    INIT.call_once(|| {
        dotenvy::dotenv().ok();
    });
}

/// Install the global tracing subscriber
///
/// `default_level` is used when `RUST_LOG` is unset (e.g. "info" or
/// "agent_brain=debug"). Safe to call multiple times - will only run once,
/// so tests sharing a process don't panic on double installation.
pub fn initialize_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level.to_string()));
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    });
}
