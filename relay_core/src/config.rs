//! # Relay Settings
//!
//! Tunables for the orchestrator and the auxiliary tool calls. Settings are
//! assembled in layers:
//!
//! 1. Built-in defaults (`RelaySettings::default()`).
//! 2. An optional TOML file (`relay.toml`); missing keys keep their defaults.
//! 3. Environment overrides (`RELAY_EXECUTION_TIMEOUT_SECS`, `RELAY_LOG_LEVEL`,
//!    `RELAY_KILL_ON_TIMEOUT`).
//!
//! Command-line flags of the `relay` binary are applied last by the shell module.
//!
//! ```toml
//! execution_timeout_secs = 120
//! listing_timeout_secs = 30
//! progress_mode = "json"
//! supported_target_types = ["deployment", "rollout", "pod"]
//! log_level = "info"
//! kill_on_timeout = true
//! ```

use crate::constants::{
    DEFAULT_EXECUTION_TIMEOUT, DEFAULT_LISTING_TIMEOUT, DEFAULT_PROGRESS_MODE,
    DEFAULT_TARGET_TYPES, EXECUTION_TIMEOUT_ENV, KILL_ON_TIMEOUT_ENV, LOG_LEVEL_ENV,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Settings shared by the orchestrator, the target listing and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySettings {
    /// Hard limit for one `ext` execution, in seconds.
    pub execution_timeout_secs: u64,
    /// Limit for `ls`, `verify-config` and `--version`, in seconds.
    pub listing_timeout_secs: u64,
    /// Value passed to the tool to force machine-readable progress.
    pub progress_mode: String,
    /// Target types offered for selection, in priority order.
    pub supported_target_types: Vec<String>,
    /// Default tracing level when `RUST_LOG` is not set.
    pub log_level: String,
    /// Kill the external tool when the execution timeout fires.
    pub kill_on_timeout: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            execution_timeout_secs: DEFAULT_EXECUTION_TIMEOUT.as_secs(),
            listing_timeout_secs: DEFAULT_LISTING_TIMEOUT.as_secs(),
            progress_mode: DEFAULT_PROGRESS_MODE.to_string(),
            supported_target_types: DEFAULT_TARGET_TYPES.iter().map(|t| t.to_string()).collect(),
            log_level: "info".to_string(),
            kill_on_timeout: true,
        }
    }
}

impl RelaySettings {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    /// Parse settings from TOML text. Keys not present keep their defaults.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load settings: defaults, then `path` if it exists, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let contents =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                tracing::debug!("Loaded relay settings from {}", path.display());
                Self::from_toml_str(&contents, path)?
            }
            Some(path) => {
                tracing::debug!(
                    "Settings file {} not found, using defaults",
                    path.display()
                );
                Self::default()
            }
            None => Self::default(),
        };
        settings.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(EXECUTION_TIMEOUT_ENV) {
            self.execution_timeout_secs =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    name: EXECUTION_TIMEOUT_ENV.to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup(LOG_LEVEL_ENV)
            && !value.trim().is_empty()
        {
            self.log_level = value.trim().to_string();
        }
        if let Some(value) = lookup(KILL_ON_TIMEOUT_ENV) {
            self.kill_on_timeout = parse_flag(&value).ok_or_else(|| ConfigError::InvalidEnv {
                name: KILL_ON_TIMEOUT_ENV.to_string(),
                value: value.clone(),
            })?;
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
