//! Snapshot persistence: the storage directory of completed-run JSON files.
//!
//! A snapshot is written exactly once per completed run, named with the
//! run's completion timestamp, and immutable afterward — its lifecycle
//! ends only by external deletion. Listing and lookup back the HTTP
//! shell's index and download endpoints.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use saturator_shared::{JobDocument, Result, SaturatorError};

/// Timestamp format embedded in snapshot filenames.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage directory of snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open (creating if needed) the storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| SaturatorError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// Serialize `document` and write it as `data_<timestamp>.json`.
    ///
    /// The file is written to a hidden temp name and renamed into place so
    /// a snapshot is never observable half-written. Returns the final path.
    pub fn persist(&self, document: &JobDocument) -> Result<PathBuf> {
        let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| SaturatorError::Storage(format!("snapshot serialization: {e}")))?;

        let path = self.dir.join(format!("data_{stamp}.json"));
        let tmp = self.dir.join(format!(".data_{stamp}.json.tmp"));

        std::fs::write(&tmp, &json).map_err(|e| SaturatorError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| SaturatorError::io(&path, e))?;

        info!(path = %path.display(), bytes = json.len(), "snapshot written");
        Ok(path)
    }

    /// List snapshot filenames, newest-sorting last (lexicographic order
    /// matches timestamp order). Placeholder and hidden files are skipped.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| SaturatorError::io(&self.dir, e))?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();

        names.sort();
        Ok(names)
    }

    /// Resolve a snapshot filename to its path, rejecting names that could
    /// escape the storage directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(SaturatorError::validation(format!(
                "invalid snapshot name: {name:?}"
            )));
        }
        Ok(self.dir.join(name))
    }

    /// The storage directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
