//! Advisory exclusive lock
//!
//! One lock file per project state directory, created with `create_new`
//! so acquisition is atomic. Holding the lock is a precondition for
//! writing the runtime file and mutating the index. A lock held by a
//! dead PID (or one whose health endpoint no longer answers) is broken
//! by the next startup attempt.

use crate::error::{LifecycleError, LifecycleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "agent-brain.lock";

/// Contents of the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// PID of the owning process
    pub pid: u32,
    /// When the lock was taken
    pub started_at: DateTime<Utc>,
}

/// An acquired advisory lock; delete with [`LockFile::release`]
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Path of the lock file under a state directory
    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join(LOCK_FILE)
    }

    /// Read the current owner, if a lock file exists and parses
    pub fn read_owner(state_dir: &Path) -> Option<LockInfo> {
        let contents = std::fs::read_to_string(Self::path_in(state_dir)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Acquire the lock for this process
    ///
    /// # Errors
    /// `LifecycleError::LockHeld` when another live process owns it.
    pub fn acquire(state_dir: &Path) -> LifecycleResult<Self> {
        std::fs::create_dir_all(state_dir)?;
        let path = Self::path_in(state_dir);

        match try_create(&path) {
            Ok(()) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let owner = Self::read_owner(state_dir);
                match owner {
                    Some(info) if is_pid_alive(info.pid) => Err(LifecycleError::LockHeld {
                        pid: info.pid,
                        path: path.display().to_string(),
                    }),
                    _ => {
                        // Dead owner (or unreadable file): break the lock.
                        tracing::warn!("Breaking stale lock at {}", path.display());
                        std::fs::remove_file(&path)?;
                        try_create(&path)?;
                        Ok(Self { path })
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release the lock, removing the file
    ///
    /// # Errors
    /// Surfaces file removal failures other than the file already being
    /// gone.
    pub fn release(self) -> LifecycleResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn try_create(path: &Path) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let info = LockInfo {
        pid: std::process::id(),
        started_at: Utc::now(),
    };
    let contents = serde_json::to_string(&info).unwrap_or_default();
    file.write_all(contents.as_bytes())?;
    file.sync_data()
}

/// Best-effort PID liveness check
pub fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    if pid == std::process::id() {
        return true;
    }
    if cfg!(unix) {
        return Path::new("/proc").join(pid.to_string()).exists();
    }
    // Without a liveness source, treat the owner as dead and rely on the
    // health probe during discovery.
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LockFile::acquire(dir.path()).unwrap();
        let owner = LockFile::read_owner(dir.path()).unwrap();
        assert_eq!(owner.pid, std::process::id());
        lock.release().unwrap();
        assert!(LockFile::read_owner(dir.path()).is_none());
    }

    #[test]
    fn second_acquire_by_live_owner_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _lock = LockFile::acquire(dir.path()).unwrap();
        // Our own PID is alive, so the second acquisition is refused
        assert!(matches!(
            LockFile::acquire(dir.path()),
            Err(LifecycleError::LockHeld { .. })
        ));
    }

    #[test]
    fn stale_lock_with_dead_pid_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = LockFile::path_in(dir.path());
        let stale = LockInfo {
            pid: u32::MAX - 1,
            started_at: Utc::now(),
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = LockFile::acquire(dir.path()).unwrap();
        let owner = LockFile::read_owner(dir.path()).unwrap();
        assert_eq!(owner.pid, std::process::id());
        lock.release().unwrap();
    }

    #[test]
    fn unreadable_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = LockFile::path_in(dir.path());
        std::fs::write(&path, b"garbage").unwrap();

        let lock = LockFile::acquire(dir.path()).unwrap();
        lock.release().unwrap();
    }
}
