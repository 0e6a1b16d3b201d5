use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedPosition {
    pub x: f32,
    pub y: f32,
    pub x0: f32,
    pub y0: f32,
}

pub trait PositionStore: Send {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save(&mut self, key: &str, value: String) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Stores every entry in one JSON object on disk. Writes re-read the file,
/// replace the single key and swap the file in through a rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `positions.json` in the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "topoview", "topoview")
            .map(|dirs| dirs.data_dir().join("positions.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl PositionStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn save(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(&entries)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

pub fn position_key(prefix: &str, node_key: &str) -> String {
    format!("{prefix}-{node_key}")
}

pub struct PositionCache {
    store: Box<dyn PositionStore>,
}

impl Default for PositionCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl PositionCache {
    pub fn new(store: impl PositionStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn get_saved(&self, key: &str) -> Option<SavedPosition> {
        let raw = match self.store.load(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("position cache read for '{key}' failed, using computed layout: {err}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(position) => Some(position),
            Err(err) => {
                warn!("ignoring malformed position cache entry '{key}': {err}");
                None
            }
        }
    }

    pub fn set_saved(&mut self, key: &str, position: SavedPosition) {
        let payload = match serde_json::to_string(&position) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("could not encode position for '{key}': {err}");
                return;
            }
        };
        match self.store.save(key, payload) {
            Ok(()) => debug!("saved position '{key}' -> ({}, {})", position.x, position.y),
            Err(err) => warn!("position cache write for '{key}' dropped: {err}"),
        }
    }
}
