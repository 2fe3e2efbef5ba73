//! Collaborators consumed by the launch flow: where the configuration file
//! is, and where the external tool binary is.

use crate::{
    constants::{CONFIG_FILE_HINT_ENV, DEFAULT_TOOL_NAME, WORKSPACE_CONFIG_CANDIDATES},
    error::BinaryError,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Finds at most one configuration file for a workspace.
pub trait ConfigurationResolver: Send + Sync {
    fn resolve(&self, workspace: &Path, launch_env: &HashMap<String, String>) -> Option<PathBuf>;
}

/// Honours the `RELAY_CONFIG_FILE` hint, then the well-known workspace files.
#[derive(Debug, Default, Clone)]
pub struct WorkspaceConfigResolver;

impl ConfigurationResolver for WorkspaceConfigResolver {
    fn resolve(&self, workspace: &Path, launch_env: &HashMap<String, String>) -> Option<PathBuf> {
        if let Some(hint) = launch_env
            .get(CONFIG_FILE_HINT_ENV)
            .filter(|hint| !hint.trim().is_empty())
        {
            let hinted = Path::new(hint);
            let path = if hinted.is_absolute() {
                hinted.to_path_buf()
            } else {
                workspace.join(hinted)
            };
            tracing::debug!("Using configuration from {}: {}", CONFIG_FILE_HINT_ENV, path.display());
            return Some(path);
        }

        let found = WORKSPACE_CONFIG_CANDIDATES
            .iter()
            .map(|candidate| workspace.join(candidate))
            .find(|path| path.is_file());
        if let Some(path) = &found {
            tracing::debug!("Found workspace configuration {}", path.display());
        }
        found
    }
}

/// Supplies the external tool executable.
pub trait BinaryProvider: Send + Sync {
    fn get(&self) -> Result<PathBuf, BinaryError>;
}

/// A binary at a known location.
#[derive(Debug, Clone)]
pub struct FixedBinaryProvider {
    path: PathBuf,
}

impl FixedBinaryProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BinaryProvider for FixedBinaryProvider {
    fn get(&self) -> Result<PathBuf, BinaryError> {
        if self.path.exists() {
            Ok(self.path.clone())
        } else {
            Err(BinaryError::Missing(self.path.clone()))
        }
    }
}

/// A binary looked up on `PATH`.
#[derive(Debug, Clone)]
pub struct PathBinaryProvider {
    name: String,
}

impl PathBinaryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for PathBinaryProvider {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_NAME)
    }
}

impl BinaryProvider for PathBinaryProvider {
    fn get(&self) -> Result<PathBuf, BinaryError> {
        which::which(&self.name).map_err(|e| BinaryError::NotFound {
            name: self.name.clone(),
            reason: e.to_string(),
        })
    }
}
