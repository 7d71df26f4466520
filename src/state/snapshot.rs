//! Durable progress snapshot
//!
//! The whole progress map is written as one JSON document:
//!
//! ```json
//! { "1": { "page": 1, "error": "", "total": 200, "state": "finished" } }
//! ```
//!
//! Reads are permissive: a missing or corrupt file is treated as empty progress.

use crate::state::ProgressSnapshot;
use crate::IndexerError;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Snapshot file guarded by its own write mutex
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the snapshot file with the given progress map
    ///
    /// The document is written to a sibling temporary file and renamed over the
    /// previous snapshot, so readers see either the old or the new version.
    pub fn save(&self, snapshot: &ProgressSnapshot) -> Result<(), IndexerError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }

    /// Reads the snapshot file, failing on missing or malformed content
    pub fn read(&self) -> Result<ProgressSnapshot, IndexerError> {
        let content = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Reads the snapshot file, treating any failure as empty progress
    pub fn load(&self) -> ProgressSnapshot {
        match self.read() {
            Ok(snapshot) => {
                tracing::debug!(
                    "Loaded progress for {} pages from {}",
                    snapshot.len(),
                    self.path.display()
                );
                snapshot
            }
            Err(IndexerError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                ProgressSnapshot::new()
            }
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable progress snapshot {}: {}",
                    self.path.display(),
                    e
                );
                ProgressSnapshot::new()
            }
        }
    }
}
