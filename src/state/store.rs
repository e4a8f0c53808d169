//! Durable storage for the last known snapshot.
//!
//! The file is a pretty-printed JSON array of `[name, address, port]`
//! triples in key order. Writes go to a temp file in the same directory
//! which is then renamed over the target, so readers never see a partial file.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::error::{StateError, StateResult};
use super::snapshot::Snapshot;

/// File-backed snapshot store.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if a state file has been written.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the persisted snapshot.
    ///
    /// A missing file is not an error: nothing has been seen yet.
    #[must_use = "Load errors should be handled appropriately"]
    pub fn load(&self) -> StateResult<Snapshot> {
        if !self.path.exists() {
            return Ok(Snapshot::new());
        }

        let content = std::fs::read(&self.path).map_err(|source| StateError::Read {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_slice(&content).map_err(|source| StateError::Corrupted {
            path: self.path.clone(),
            source,
        })
    }

    /// Load the persisted snapshot, starting empty if it cannot be read.
    pub fn load_or_default(&self) -> Snapshot {
        match self.load() {
            Ok(snapshot) => {
                crate::debug_event!(
                    "state",
                    "loaded",
                    "{} servers from {}",
                    snapshot.len(),
                    self.path.display()
                );
                snapshot
            }
            Err(e) => {
                tracing::warn!("[state] {e}; starting with an empty snapshot");
                Snapshot::new()
            }
        }
    }

    /// Atomically replace the persisted snapshot.
    #[must_use = "Save errors should be handled to ensure data is persisted"]
    pub fn save(&self, snapshot: &Snapshot) -> StateResult<()> {
        let mut bytes = serde_json::to_vec_pretty(snapshot)?;
        bytes.push(b'\n');

        let write_err = |source: std::io::Error| StateError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        crate::debug_event!(
            "state",
            "saved",
            "{} servers to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Delete the persisted snapshot.
    pub fn clear(&self) -> Result<(), std::io::Error> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
