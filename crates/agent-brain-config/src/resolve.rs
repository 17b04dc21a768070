//! Configuration file resolution
//!
//! The search stack, first hit wins:
//! 1. Explicit path passed on the command line
//! 2. `AGENT_BRAIN_CONFIG` environment variable naming a path
//! 3. `{project_root}/.config/agent-brain.yaml`
//! 4. Walk-up from the current directory for the same relative path
//! 5. `{user_config_dir}/agent-brain/config.yaml`
//! 6. Built-in defaults

use crate::{BrainConfig, CONFIG_PATH_ENV, ConfigError, ConfigResult, PROJECT_CONFIG_RELPATH};
use std::path::{Path, PathBuf};

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config <path>`
    Explicit(PathBuf),
    /// Path named by `AGENT_BRAIN_CONFIG`
    Environment(PathBuf),
    /// `{project_root}/.config/agent-brain.yaml`
    ProjectLocal(PathBuf),
    /// Found by walking up from the current directory
    WalkUp(PathBuf),
    /// `{user_config_dir}/agent-brain/config.yaml`
    UserGlobal(PathBuf),
    /// No file found anywhere; process defaults in effect
    Defaults,
}

impl ConfigSource {
    /// The file path, when the configuration came from a file
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Explicit(p)
            | Self::Environment(p)
            | Self::ProjectLocal(p)
            | Self::WalkUp(p)
            | Self::UserGlobal(p) => Some(p),
            Self::Defaults => None,
        }
    }
}

/// Resolve and load the configuration for a project
///
/// `explicit` is the CLI-provided path, if any; `project_root` anchors the
/// project-local lookup; `cwd` anchors the walk-up lookup.
///
/// # Errors
/// Returns `ConfigError` when an explicitly named file is missing or any
/// found file fails to parse or validate. A missing file at the lower
/// precedence levels is not an error - resolution falls through.
pub fn resolve_config(
    explicit: Option<&Path>,
    project_root: &Path,
    cwd: &Path,
) -> ConfigResult<(BrainConfig, ConfigSource)> {
    // 1. Explicit path: missing file is an error, not a fall-through.
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::invalid(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok((
            BrainConfig::from_file(path)?,
            ConfigSource::Explicit(path.to_path_buf()),
        ));
    }

    // 2. Environment variable naming a path: same strictness.
    if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if !path.exists() {
            return Err(ConfigError::invalid(format!(
                "{CONFIG_PATH_ENV} points at a missing file: {}",
                path.display()
            )));
        }
        return Ok((BrainConfig::from_file(&path)?, ConfigSource::Environment(path)));
    }

    // 3. Project-local file.
    let project_local = project_root.join(PROJECT_CONFIG_RELPATH);
    if project_local.exists() {
        return Ok((
            BrainConfig::from_file(&project_local)?,
            ConfigSource::ProjectLocal(project_local),
        ));
    }

    // 4. Walk up from the current directory.
    let mut dir = Some(cwd);
    while let Some(current) = dir {
        let candidate = current.join(PROJECT_CONFIG_RELPATH);
        if candidate != project_local && candidate.exists() {
            return Ok((
                BrainConfig::from_file(&candidate)?,
                ConfigSource::WalkUp(candidate),
            ));
        }
        dir = current.parent();
    }

    // 5. User-global file.
    if let Some(config_dir) = dirs::config_dir() {
        let user_global = config_dir.join("agent-brain").join("config.yaml");
        if user_global.exists() {
            return Ok((
                BrainConfig::from_file(&user_global)?,
                ConfigSource::UserGlobal(user_global),
            ));
        }
    }

    // 6. Built-in defaults.
    Ok((BrainConfig::from_defaults()?, ConfigSource::Defaults))
}
