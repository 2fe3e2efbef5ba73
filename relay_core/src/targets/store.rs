//! Key-value persistence for the last selected target.
//!
//! Two scopes exist: one per workspace and one shared by every workspace.
//! [`JsonFileStore`] keeps both in a single JSON document under the platform
//! data directory and replaces it atomically on every write.

use crate::error::StoreError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScope {
    Workspace,
    Global,
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, scope: StoreScope, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, scope: StoreScope, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<(StoreScope, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, scope: StoreScope, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(&(scope, key.to_string())).cloned())
    }

    fn set(&self, scope: StoreScope, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert((scope, key.to_string()), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    global: BTreeMap<String, String>,
    #[serde(default)]
    workspaces: BTreeMap<String, BTreeMap<String, String>>,
}

/// JSON file store. The workspace scope is keyed by the canonical workspace path.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    workspace_key: String,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, workspace: &Path) -> Self {
        let workspace = fs::canonicalize(workspace).unwrap_or_else(|_| workspace.to_path_buf());
        Self {
            path: path.into(),
            workspace_key: workspace.to_string_lossy().into_owned(),
            lock: Mutex::new(()),
        }
    }

    /// `state.json` under the platform data directory.
    pub fn default_location() -> Option<PathBuf> {
        ProjectDirs::from("dev", "Relay", "relay").map(|dirs| dirs.data_dir().join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoreDocument, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(StoreDocument::default()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let mut file = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut file, document)?;
        file.write_all(b"\n")?;
        file.persist(&self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, scope: StoreScope, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let document = self.read()?;
        let value = match scope {
            StoreScope::Global => document.global.get(key).cloned(),
            StoreScope::Workspace => document
                .workspaces
                .get(&self.workspace_key)
                .and_then(|values| values.get(key))
                .cloned(),
        };
        Ok(value)
    }

    fn set(&self, scope: StoreScope, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut document = self.read()?;
        let values = match scope {
            StoreScope::Global => &mut document.global,
            StoreScope::Workspace => document
                .workspaces
                .entry(self.workspace_key.clone())
                .or_default(),
        };
        values.insert(key.to_string(), value.to_string());
        self.write(&document)
    }
}
