//! Project root resolution and instance identity
//!
//! The project root is the version-control top-level, else the nearest
//! ancestor already carrying a state directory, else the starting
//! directory. The instance id is derived from the canonical project path
//! so every client computes the same identity.

use agent_brain_config::STATE_DIR_NAME;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Length of the hex instance id
const INSTANCE_ID_LEN: usize = 12;

/// Resolve the project root for a starting directory
pub fn resolve_project_root(start: &Path) -> PathBuf {
    // 1. Version-control top-level
    let mut dir = Some(start);
    while let Some(current) = dir {
        if current.join(".git").exists() {
            return current.to_path_buf();
        }
        dir = current.parent();
    }

    // 2. Nearest ancestor containing a project marker
    let mut dir = Some(start);
    while let Some(current) = dir {
        if current.join(STATE_DIR_NAME).exists() {
            return current.to_path_buf();
        }
        dir = current.parent();
    }

    // 3. The starting directory itself
    start.to_path_buf()
}

/// Derive the stable instance id from the project root path
pub fn instance_id(project_root: &Path) -> String {
    let canonical = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let mut id = String::with_capacity(INSTANCE_ID_LEN);
    for byte in digest.iter().take(INSTANCE_ID_LEN / 2) {
        use std::fmt::Write;
        let _ = write!(id, "{byte:02x}");
    }
    id
}

/// The project's state directory (`{project_root}/.agent-brain`)
pub fn state_dir(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_toplevel_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(resolve_project_root(&nested), dir.path());
    }

    #[test]
    fn state_dir_marker_is_second_choice() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(STATE_DIR_NAME)).unwrap();
        let nested = dir.path().join("docs");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(resolve_project_root(&nested), dir.path());
    }

    #[test]
    fn falls_back_to_start_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("plain");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(resolve_project_root(&nested), nested);
    }

    #[test]
    fn instance_id_is_stable_and_short() {
        let dir = tempfile::tempdir().unwrap();
        let first = instance_id(dir.path());
        let second = instance_id(dir.path());
        assert_eq!(first, second);
        assert_eq!(first.len(), INSTANCE_ID_LEN);

        let other = tempfile::tempdir().unwrap();
        assert_ne!(first, instance_id(other.path()));
    }
}
