//! Durable session state behind an explicit load/save seam.

use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::monitor::{ResultItem, Stats, Website};

pub const STATE_VERSION: u32 = 1;

/// The single record everything persists into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    #[serde(default)]
    pub websites: Vec<Website>,
    #[serde(default)]
    pub results: Vec<ResultItem>,
    #[serde(default)]
    pub stats: Stats,
}

impl Default for PersistedState {
    fn default() -> Self {
        PersistedState {
            version: STATE_VERSION,
            websites: Vec::new(),
            results: Vec::new(),
            stats: Stats::default(),
        }
    }
}

/// Load/save seam so sessions can run against a file, memory, or nothing.
pub trait StateStore: Send + Sync {
    /// Read the record; Ok(None) when nothing has been saved yet.
    fn load(&self) -> Result<Option<PersistedState>>;

    /// Replace the record.
    fn save(&self, state: &PersistedState) -> Result<()>;
}

/// JSON-file-backed store.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<PersistedState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)?;
        let state: PersistedState = serde_json::from_str(&raw)
            .map_err(|e| AppError::StorageError(format!("Corrupt state file: {}", e)))?;

        if state.version != STATE_VERSION {
            return Err(AppError::StorageError(format!(
                "Unsupported state version: {}",
                state.version
            )));
        }

        Ok(Some(state))
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let raw = serde_json::to_string_pretty(state)
            .map_err(|e| AppError::StorageError(e.to_string()))?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    record: RwLock<Option<PersistedState>>,
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedState>> {
        Ok(self.record.read().expect("store lock poisoned").clone())
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        *self.record.write().expect("store lock poisoned") = Some(state.clone());
        Ok(())
    }
}
