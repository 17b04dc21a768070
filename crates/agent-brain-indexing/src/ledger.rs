//! Content-hash ledger for deduplication
//!
//! Maps `source_path -> sha256(content)` as of the last successful
//! ingestion of that path. Unchanged files are skipped unless the request
//! sets `force = true`. The ledger entry for a file is written only after
//! that file's chunks are fully upserted, so a cancelled job never
//! records a half-ingested file.

use crate::error::IndexingResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const LEDGER_FILE: &str = "files.json";

/// Persistent `source_path -> content hash` map
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FileLedger {
    entries: BTreeMap<String, String>,
    #[serde(skip)]
    path: PathBuf,
}

impl FileLedger {
    /// Load (or create) the ledger under `dir`
    ///
    /// # Errors
    /// Surfaces I/O and parse failures of an existing ledger file.
    pub fn open(dir: &Path) -> IndexingResult<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LEDGER_FILE);
        let mut ledger = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        ledger.path = path;
        Ok(ledger)
    }

    /// The recorded hash for a path, if any
    pub fn get(&self, source_path: &str) -> Option<&str> {
        self.entries.get(source_path).map(String::as_str)
    }

    /// Whether `hash` matches the recorded hash for `source_path`
    pub fn is_unchanged(&self, source_path: &str, hash: &str) -> bool {
        self.get(source_path) == Some(hash)
    }

    /// Record a successfully ingested file and persist
    ///
    /// # Errors
    /// Surfaces I/O failures writing the ledger.
    pub fn record(&mut self, source_path: &str, hash: &str) -> IndexingResult<()> {
        self.entries.insert(source_path.to_string(), hash.to_string());
        self.save()
    }

    /// Forget a deleted file and persist
    ///
    /// # Errors
    /// Surfaces I/O failures writing the ledger.
    pub fn remove(&mut self, source_path: &str) -> IndexingResult<()> {
        if self.entries.remove(source_path).is_some() {
            self.save()?;
        }
        Ok(())
    }

    /// Drop every entry and persist
    ///
    /// # Errors
    /// Surfaces I/O failures writing the ledger.
    pub fn clear(&mut self) -> IndexingResult<()> {
        self.entries.clear();
        self.save()
    }

    fn save(&self) -> IndexingResult<()> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&self)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
