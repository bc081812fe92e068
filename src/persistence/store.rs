use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{ProctorError, Result};
use crate::session::Session;

/// Session code -> full session record, participants included
pub type RegistrySnapshot = HashMap<String, Session>;

/// Persistence adapter the registry writes through. Implementations are
/// called from a blocking context and may do synchronous I/O.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<RegistrySnapshot>>;
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<()>;
}

/// Pretty-printed JSON file, replaced atomically on every save
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "rooms.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Result<Option<RegistrySnapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: RegistrySnapshot = serde_json::from_slice(&bytes)?;
        tracing::info!(
            path = %self.path.display(),
            sessions = snapshot.len(),
            "Loaded session snapshot"
        );
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            sessions = snapshot.len(),
            "Saved session snapshot"
        );
        Ok(())
    }
}

/// In-process store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<RegistrySnapshot>>,
    saves: Mutex<usize>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every save fails with an I/O error
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Option<RegistrySnapshot> {
        self.snapshot.lock().ok().and_then(|s| s.clone())
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Option<RegistrySnapshot>> {
        Ok(self.current())
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        if self.fail_saves {
            return Err(ProctorError::Io("store is read-only".to_string()));
        }
        let mut slot = self
            .snapshot
            .lock()
            .map_err(|_| ProctorError::internal("memory store poisoned"))?;
        *slot = Some(snapshot.clone());
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}
