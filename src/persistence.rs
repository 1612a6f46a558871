//! Persistence layer for MyCoin ledger state

use crate::blockchain::LedgerState;
use crate::error::ChainError;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

/// Abstraction for persistence backends. Implementations store and restore
/// the whole ledger state; a save either fully replaces the previous state or
/// leaves it untouched.
pub trait Persistence: Send + Sync {
    fn save_state(&self, state: &LedgerState) -> Result<(), ChainError>;
    /// `Ok(None)` when nothing has been saved yet.
    fn load_state(&self) -> Result<Option<LedgerState>, ChainError>;
}

/// Whole-state JSON document on disk. Writes go to a temporary file in the
/// same directory which is then renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonFilePersistence {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl Persistence for JsonFilePersistence {
    fn save_state(&self, state: &LedgerState) -> Result<(), ChainError> {
        let dir = self.parent_dir();
        fs::create_dir_all(dir).map_err(|e| {
            ChainError::PersistenceError(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let json = serde_json::to_vec_pretty(state)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| {
            ChainError::PersistenceError(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        debug!(
            "Saved ledger state to {} ({} bytes)",
            self.path.display(),
            json.len()
        );
        Ok(())
    }

    fn load_state(&self) -> Result<Option<LedgerState>, ChainError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path).map_err(|e| {
            ChainError::PersistenceError(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let state = serde_json::from_slice(&bytes).map_err(|e| {
            ChainError::PersistenceError(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(state))
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    state: Arc<Mutex<Option<LedgerState>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_state(&self, state: &LedgerState) -> Result<(), ChainError> {
        *self.state.lock() = Some(state.clone());
        Ok(())
    }

    fn load_state(&self) -> Result<Option<LedgerState>, ChainError> {
        Ok(self.state.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LedgerConfig, StakingConfig};

    fn genesis_state() -> LedgerState {
        LedgerState::genesis(&LedgerConfig::default(), &StakingConfig::default())
    }

    #[test]
    fn test_missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePersistence::new(dir.path().join("absent.json"));
        assert!(store.load_state().unwrap().is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePersistence::new(dir.path().join("nested/ledger.json"));

        let mut state = genesis_state();
        state.credit("alice", 0.1 + 0.2).unwrap();
        state.produce_block_at("miner", 1_700_000_000).unwrap();
        store.save_state(&state).unwrap();

        let mut loaded = store.load_state().unwrap().unwrap();
        loaded.rebuild_indexes();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePersistence::new(dir.path().join("ledger.json"));

        let mut state = genesis_state();
        store.save_state(&state).unwrap();
        state.credit("alice", 5.0).unwrap();
        store.save_state(&state).unwrap();

        let loaded = store.load_state().unwrap().unwrap();
        assert_eq!(loaded.get_balance("alice"), 5.0);
        // Only the target file remains; the temporary was renamed over it.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = JsonFilePersistence::new(&path).load_state().unwrap_err();
        assert!(matches!(err, ChainError::PersistenceError(_)));
    }

    #[test]
    fn test_in_memory_round_trip() {
        let store = InMemoryPersistence::new();
        assert!(store.load_state().unwrap().is_none());

        let state = genesis_state();
        store.save_state(&state).unwrap();
        assert_eq!(store.load_state().unwrap(), Some(state));
    }
}
