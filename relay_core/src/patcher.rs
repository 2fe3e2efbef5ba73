//! # Launch Configuration Patcher
//!
//! Applies an [`ExecutionResult`] to the host's launch configuration:
//!
//! 1. Merge the environment: the configuration's own `env`, then the result's
//!    environment, then the caller overlay.
//! 2. Remove the keys the result asks to unset.
//! 3. On macOS, swap in the patched executable when one was produced. The
//!    field that holds the executable depends on the configuration `type`;
//!    terminal-style configurations hold a whole command line instead, which
//!    is rewritten to pipe the command through the patched shell with the
//!    library preload set inline.
//! 4. Mark the configuration as processed.
//!
//! [`prepare_launch`] wires the patcher to the resolver and the orchestrator.

use crate::{
    collaborators::ConfigurationResolver,
    constants::{FALLBACK_SHELL, LIBRARY_PRELOAD_ENV, PROCESSED_SENTINEL_ENV},
    error::ExecutionError,
    orchestrator::{ExecutionRequest, Orchestrator},
    protocol::ExecutionResult,
    targets::UserSelection,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Host-supplied launch configuration: a JSON object with a `type` and an `env` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaunchConfiguration(Map<String, Value>);

impl LaunchConfiguration {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// `None` unless `value` is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn config_type(&self) -> Option<&str> {
        self.get_str("type")
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), Value::String(value.into()));
    }

    /// The `env` map. Non-string values are rendered as JSON; nulls are skipped.
    pub fn env(&self) -> HashMap<String, String> {
        let Some(Value::Object(env)) = self.0.get("env") else {
            return HashMap::new();
        };
        env.iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((key.clone(), s.clone())),
                other => Some((key.clone(), other.to_string())),
            })
            .collect()
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        match self.0.get("env") {
            Some(Value::Object(env)) => env.get(key).and_then(Value::as_str),
            _ => None,
        }
    }

    /// Edit the `env` object in place. A missing or non-object `env` starts empty.
    pub fn edit_env(&mut self, edit: impl FnOnce(&mut Map<String, Value>)) {
        let mut env = match self.0.remove("env") {
            Some(Value::Object(env)) => env,
            _ => Map::new(),
        };
        edit(&mut env);
        self.0.insert("env".to_string(), Value::Object(env));
    }
}

/// Where a configuration type keeps its executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutableField {
    /// A field holding a bare executable path.
    Plain(&'static str),
    /// A field holding a full shell command line.
    CommandLine(&'static str),
}

impl ExecutableField {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutableField::Plain(name) | ExecutableField::CommandLine(name) => name,
        }
    }
}

const EXECUTABLE_FIELDS: &[(&str, ExecutableField)] = &[
    ("node", ExecutableField::Plain("runtimeExecutable")),
    ("pwa-node", ExecutableField::Plain("runtimeExecutable")),
    ("node-terminal", ExecutableField::CommandLine("command")),
    ("python", ExecutableField::Plain("python")),
    ("debugpy", ExecutableField::Plain("python")),
];

const FALLBACK_FIELD: ExecutableField = ExecutableField::Plain("program");

/// Executable field for a configuration type, `program` when the type is unknown.
pub fn executable_field(config_type: Option<&str>) -> ExecutableField {
    config_type
        .and_then(|ty| {
            EXECUTABLE_FIELDS
                .iter()
                .find(|(known, _)| *known == ty)
                .map(|(_, field)| *field)
        })
        .unwrap_or(FALLBACK_FIELD)
}

/// Executable to pass to `ext -e`.
pub fn executable_for(config: &LaunchConfiguration) -> Option<PathBuf> {
    executable_with_shell(config, std::env::var("SHELL").ok().as_deref())
}

fn executable_with_shell(config: &LaunchConfiguration, shell: Option<&str>) -> Option<PathBuf> {
    match executable_field(config.config_type()) {
        ExecutableField::CommandLine(_) => Some(PathBuf::from(
            shell.filter(|s| !s.is_empty()).unwrap_or(FALLBACK_SHELL),
        )),
        ExecutableField::Plain(field) => match config.get_str(field) {
            Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
            _ if field == "runtimeExecutable" => Some(PathBuf::from("node")),
            _ => None,
        },
    }
}

/// True once [`Patcher::patch`] has run on this configuration.
pub fn is_already_processed(config: &LaunchConfiguration) -> bool {
    config.env_value(PROCESSED_SENTINEL_ENV).is_some()
}

/// Quote `value` for a POSIX shell: `foo'bar` becomes `'foo'\''bar'`.
pub fn shell_single_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

fn terminal_command(command: &str, patched_shell: &Path, preload: Option<&str>) -> String {
    let shell = shell_single_quote(&patched_shell.to_string_lossy());
    let echoed = shell_single_quote(command);
    match preload {
        Some(library) => format!(
            "echo {echoed} | {LIBRARY_PRELOAD_ENV}={} {shell}",
            shell_single_quote(library)
        ),
        None => format!("echo {echoed} | {shell}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    MacOs,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else {
            HostOs::Other
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Patcher {
    os: HostOs,
}

impl Default for Patcher {
    fn default() -> Self {
        Self::new(HostOs::current())
    }
}

impl Patcher {
    pub fn new(os: HostOs) -> Self {
        Self { os }
    }

    pub fn patch(
        &self,
        config: &mut LaunchConfiguration,
        result: &ExecutionResult,
        overlay: &HashMap<String, String>,
    ) {
        // Edited in place: entries nobody touches keep their JSON value, null included.
        config.edit_env(|env| {
            for (key, value) in result.environment.iter().chain(overlay) {
                env.insert(key.clone(), Value::String(value.clone()));
            }
            for key in &result.env_keys_to_unset {
                env.remove(key);
            }
        });

        if let Some(patched) = &result.patched_executable_path
            && self.os == HostOs::MacOs
        {
            match executable_field(config.config_type()) {
                ExecutableField::CommandLine(field) => {
                    let command = config.get_str(field).unwrap_or_default().to_string();
                    let rewritten =
                        terminal_command(&command, patched, config.env_value(LIBRARY_PRELOAD_ENV));
                    tracing::debug!("Rewrote '{}' for the patched shell", field);
                    config.set_str(field, rewritten);
                }
                ExecutableField::Plain(field) => {
                    tracing::debug!("Using patched executable {} for '{}'", patched.display(), field);
                    config.set_str(field, patched.to_string_lossy());
                }
            }
        }

        config.edit_env(|env| {
            env.insert(
                PROCESSED_SENTINEL_ENV.to_string(),
                Value::String("true".to_string()),
            );
        });
    }
}

/// Inputs of one [`prepare_launch`] call besides the configuration itself.
#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    pub workspace: PathBuf,
    pub selection: Option<UserSelection>,
    pub env_overlay: HashMap<String, String>,
}

/// Resolve and apply an execution to `config`.
///
/// Already-processed configurations are left untouched. On failure the
/// configuration is not modified.
pub async fn prepare_launch(
    config: &mut LaunchConfiguration,
    context: &LaunchContext,
    resolver: &dyn ConfigurationResolver,
    orchestrator: &Orchestrator,
    patcher: &Patcher,
) -> Result<(), ExecutionError> {
    if is_already_processed(config) {
        tracing::info!("Launch configuration already processed, skipping");
        return Ok(());
    }

    let mut hints = config.env();
    hints.extend(context.env_overlay.iter().map(|(k, v)| (k.clone(), v.clone())));

    let request = ExecutionRequest {
        selection: context.selection.clone(),
        config_file_path: resolver.resolve(&context.workspace, &hints),
        executable_path: executable_for(config),
        env_overlay: context.env_overlay.clone(),
    };
    let result = orchestrator.execute(&request).await?;
    patcher.patch(config, &result, &context.env_overlay);
    Ok(())
}
