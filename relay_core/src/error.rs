//! Error types for the relay core.
//!
//! `ExecutionError` is the terminal failure of one launch attempt. The other
//! enums cover the collaborators it is built from and convert into it where
//! the mapping is unambiguous.

use std::{fmt, path::PathBuf, time::Duration};

/// How a process ended when it did not end cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Non-zero exit code.
    Code(i32),
    /// Terminated by a signal (name such as `SIGKILL`).
    Signal(String),
}

impl fmt::Display for ExitDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitDisposition::Code(code) => write!(f, "exit code {code}"),
            ExitDisposition::Signal(signal) => write!(f, "signal {signal}"),
        }
    }
}

/// Terminal failure of one launch attempt.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Failed to list targets: {0}")]
    ListFailure(#[source] ToolError),

    #[error("Target selection was aborted: {0}")]
    SelectionAborted(String),

    #[error("Failed to start '{}': {reason}", .path.display())]
    SpawnFailure { path: PathBuf, reason: String },

    #[error("{message}")]
    ProtocolError {
        message: String,
        help: Option<String>,
    },

    #[error("Timed out after {}s waiting for the external tool", .after.as_secs())]
    Timeout { after: Duration },

    #[error("External tool exited abnormally ({0})")]
    AbnormalExit(ExitDisposition),
}

impl ExecutionError {
    /// Protocol error without help text.
    pub fn protocol(message: impl Into<String>) -> Self {
        ExecutionError::ProtocolError {
            message: message.into(),
            help: None,
        }
    }

    /// Stable short name, used for the lifecycle `Failed` phase and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::ListFailure(_) => "list_failure",
            ExecutionError::SelectionAborted(_) => "selection_aborted",
            ExecutionError::SpawnFailure { .. } => "spawn_failure",
            ExecutionError::ProtocolError { .. } => "protocol_error",
            ExecutionError::Timeout { .. } => "timeout",
            ExecutionError::AbnormalExit(_) => "abnormal_exit",
        }
    }

    /// Actionable hint reported by the external tool, if any.
    pub fn help(&self) -> Option<&str> {
        match self {
            ExecutionError::ProtocolError { help, .. } => help.as_deref(),
            _ => None,
        }
    }
}

/// Failure of an auxiliary call to the external tool (`ls`, `verify-config`, `--version`).
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Failed to start '{}': {reason}", .path.display())]
    Spawn { path: PathBuf, reason: String },

    #[error("'{command}' timed out after {}s", .after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("'{command}' failed with {status}: {message}")]
    Failed {
        command: String,
        status: ExitDisposition,
        message: String,
    },

    #[error("Could not decode output of '{command}': {reason}")]
    Decode { command: String, reason: String },
}

/// Failure loading [`crate::config::RelaySettings`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },
}

/// Failure reading or writing the persisted key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store contents are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to persist store file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Failure locating the external tool.
#[derive(Debug, thiserror::Error)]
pub enum BinaryError {
    #[error("Could not find '{name}' on PATH: {reason}")]
    NotFound { name: String, reason: String },

    #[error("Configured binary '{}' does not exist", .0.display())]
    Missing(PathBuf),
}

impl From<BinaryError> for ExecutionError {
    fn from(err: BinaryError) -> Self {
        let path = match &err {
            BinaryError::NotFound { name, .. } => PathBuf::from(name),
            BinaryError::Missing(path) => path.clone(),
        };
        ExecutionError::SpawnFailure {
            path,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(ExecutionError::protocol("x").kind(), "protocol_error");
        assert_eq!(
            ExecutionError::Timeout {
                after: Duration::from_secs(120)
            }
            .kind(),
            "timeout"
        );
        assert_eq!(
            ExecutionError::AbnormalExit(ExitDisposition::Code(1)).kind(),
            "abnormal_exit"
        );
    }

    #[test]
    fn test_display_messages() {
        let err = ExecutionError::AbnormalExit(ExitDisposition::Signal("SIGKILL".into()));
        assert_eq!(
            err.to_string(),
            "External tool exited abnormally (signal SIGKILL)"
        );

        let err = ExecutionError::Timeout {
            after: Duration::from_secs(120),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 120s waiting for the external tool"
        );
    }

    #[test]
    fn test_help_only_on_protocol_errors() {
        let err = ExecutionError::ProtocolError {
            message: "bad config".into(),
            help: Some("check the target".into()),
        };
        assert_eq!(err.help(), Some("check the target"));
        assert_eq!(ExecutionError::SelectionAborted("io".into()).help(), None);
    }

    #[test]
    fn test_binary_error_maps_to_spawn_failure() {
        let err: ExecutionError = BinaryError::Missing(PathBuf::from("/nope")).into();
        assert!(matches!(err, ExecutionError::SpawnFailure { path, .. } if path == PathBuf::from("/nope")));
    }
}
