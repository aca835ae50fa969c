//! Durable per-file sync progress
//!
//! Tracks, for every (symbol, file) pair, whether the file has been fully
//! loaded and optionally the byte position reached. State is persisted as
//! human-readable JSON and reloaded at the start of every run so completed
//! files are skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors while loading or saving checkpoint state
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed checkpoint file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Progress entry for a single contract file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileCheckpoint {
    /// True once the file has been fully loaded
    #[serde(default)]
    pub completed: bool,
    /// Byte offset reached, for resuming a partially-loaded file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SymbolCheckpoint {
    #[serde(default)]
    files: BTreeMap<String, FileCheckpoint>,
}

/// Durable store of per-(symbol, file) sync progress
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    data: BTreeMap<String, SymbolCheckpoint>,
}

impl CheckpointStore {
    /// Load checkpoint state from `path`. A missing file yields an empty
    /// store, not an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let data = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, data })
    }

    /// Persist the current state. Must be called before advancing to the
    /// next file so a crash leaves exactly the completed entries durable.
    pub fn save(&self) -> Result<(), CheckpointError> {
        let text = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    /// Whether a file has been fully loaded. Unknown keys are incomplete.
    pub fn is_completed(&self, symbol: &str, file: &Path) -> bool {
        self.entry(symbol, file)
            .map(|e| e.completed)
            .unwrap_or(false)
    }

    /// Mark a file as fully loaded. Idempotent.
    pub fn set_completed(&mut self, symbol: &str, file: &Path, completed: bool) {
        let entry = self.entry_mut(symbol, file);
        entry.completed = completed;
        entry.last_updated = Some(Utc::now());
    }

    /// Byte position reached in a partially-loaded file.
    pub fn last_position(&self, symbol: &str, file: &Path) -> Option<u64> {
        self.entry(symbol, file).and_then(|e| e.last_position)
    }

    /// Record the byte position reached. Idempotent.
    pub fn set_position(&mut self, symbol: &str, file: &Path, position: u64) {
        let entry = self.entry_mut(symbol, file);
        entry.last_position = Some(position);
        entry.last_updated = Some(Utc::now());
    }

    fn file_key(file: &Path) -> String {
        file.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .unwrap_or_else(|| file.display().to_string())
    }

    fn entry(&self, symbol: &str, file: &Path) -> Option<&FileCheckpoint> {
        self.data
            .get(symbol)
            .and_then(|s| s.files.get(&Self::file_key(file)))
    }

    fn entry_mut(&mut self, symbol: &str, file: &Path) -> &mut FileCheckpoint {
        self.data
            .entry(symbol.to_string())
            .or_default()
            .files
            .entry(Self::file_key(file))
            .or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::load(dir.path().join("checkpoint.json")).unwrap();
        assert!(!store.is_completed("ES", Path::new("ESZ24_FUT_CME.scid")));
        assert_eq!(store.last_position("ES", Path::new("ESZ24_FUT_CME.scid")), None);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let file = Path::new("/data/ESZ24_FUT_CME.scid");

        let mut store = CheckpointStore::load(&path).unwrap();
        store.set_completed("ES", file, true);
        store.set_position("NQ", Path::new("NQH25.scid"), 4096);
        store.save().unwrap();

        let reloaded = CheckpointStore::load(&path).unwrap();
        assert!(reloaded.is_completed("ES", file));
        // Keyed by filename, not the full path.
        assert!(reloaded.is_completed("ES", Path::new("ESZ24_FUT_CME.scid")));
        assert_eq!(
            reloaded.last_position("NQ", Path::new("NQH25.scid")),
            Some(4096)
        );
        assert!(!reloaded.is_completed("NQ", Path::new("NQH25.scid")));
    }

    #[test]
    fn test_set_completed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let file = Path::new("ESZ24_FUT_CME.scid");

        let mut store = CheckpointStore::load(&path).unwrap();
        store.set_completed("ES", file, true);
        store.set_completed("ES", file, true);
        store.save().unwrap();
        store.save().unwrap();

        let reloaded = CheckpointStore::load(&path).unwrap();
        assert!(reloaded.is_completed("ES", file));
    }
}
