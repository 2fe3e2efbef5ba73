//! Wire types of the control protocol.

use crate::constants::{FINISHED_TASK_TYPE, LAUNCH_TASK_NAME};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashMap, path::PathBuf};

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Action attached to an [`IdeMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IdeAction {
    /// Opens `link` when chosen.
    Link { label: String, link: String },
}

/// Structured message the tool wants shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeMessage {
    pub id: String,
    pub level: NotificationLevel,
    pub text: String,
    #[serde(default)]
    pub actions: Vec<IdeAction>,
}

/// One decoded line of the control protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    /// Generic progress of a named task.
    Progress {
        name: String,
        message: Option<String>,
    },
    Warning {
        text: String,
    },
    Info {
        text: String,
    },
    IdeMessage(IdeMessage),
    /// Completion of the launch task. On success `payload` holds the
    /// [`ExecutionResult`], either as a JSON-encoded string or inline.
    Finished {
        success: bool,
        payload: Value,
    },
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<Value>,
}

impl ProgressMessage {
    /// Classify one protocol line.
    ///
    /// Anything that is a JSON object but carries no recognised `type` is
    /// generic progress. Errors are returned for lines that are not JSON
    /// objects and for `IdeMessage` payloads that do not match their schema.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        // Structs also deserialize from arrays; only objects are messages here.
        let fields: Map<String, Value> = serde_json::from_str(line)?;
        let raw: RawMessage = serde_json::from_value(Value::Object(fields))?;
        let message = raw.message;

        let classified = match raw.kind.as_deref() {
            Some(FINISHED_TASK_TYPE) if raw.name.as_deref() == Some(LAUNCH_TASK_NAME) => {
                ProgressMessage::Finished {
                    success: raw.success.unwrap_or(false),
                    payload: message.unwrap_or(Value::Null),
                }
            }
            Some("Warning") => ProgressMessage::Warning {
                text: message.map(value_to_text).unwrap_or_default(),
            },
            Some("Info") => ProgressMessage::Info {
                text: message.map(value_to_text).unwrap_or_default(),
            },
            Some("IdeMessage") => {
                ProgressMessage::IdeMessage(serde_json::from_value(message.unwrap_or(Value::Null))?)
            }
            _ => ProgressMessage::Progress {
                name: raw.name.unwrap_or_default(),
                message: message.map(value_to_text),
            },
        };
        Ok(classified)
    }

    /// Text for a progress indicator: the task name, then the message if any.
    pub fn progress_text(name: &str, message: Option<&str>) -> String {
        match message {
            Some(message) if !message.is_empty() => format!("{name}: {message}"),
            _ => name.to_string(),
        }
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Result of a successful execution: what to change in the launch configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Variables to add to the launched process environment.
    #[serde(default, deserialize_with = "null_as_default")]
    pub environment: HashMap<String, String>,
    /// Replacement executable produced to work around code-signing restrictions.
    #[serde(rename = "patched_path", default)]
    pub patched_executable_path: Option<PathBuf>,
    /// Variables to remove from the launched process environment.
    #[serde(rename = "env_to_unset", default, deserialize_with = "null_as_default")]
    pub env_keys_to_unset: Vec<String>,
    #[serde(
        rename = "uses_operator",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub uses_remote_operator: Option<bool>,
}

impl ExecutionResult {
    /// Decode the payload of a `Finished` message.
    pub fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        match payload {
            Value::String(encoded) => serde_json::from_str(encoded),
            other => Self::deserialize(other),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_finished_launch_task() {
        let line = json!({
            "name": LAUNCH_TASK_NAME,
            "type": "FinishedTask",
            "success": true,
            "message": "{\"environment\":{\"A\":\"1\"},\"patched_path\":null,\"env_to_unset\":[]}"
        })
        .to_string();

        let msg = ProgressMessage::from_line(&line).unwrap();
        let ProgressMessage::Finished { success, payload } = msg else {
            panic!("expected Finished, got {msg:?}");
        };
        assert!(success);
        let result = ExecutionResult::from_payload(&payload).unwrap();
        assert_eq!(result.environment.get("A").map(String::as_str), Some("1"));
        assert_eq!(result.patched_executable_path, None);
    }

    #[test]
    fn test_finished_subtask_is_progress() {
        let line = r#"{"name":"agent running","type":"FinishedTask","success":true}"#;
        assert_eq!(
            ProgressMessage::from_line(line).unwrap(),
            ProgressMessage::Progress {
                name: "agent running".into(),
                message: None
            }
        );
    }

    #[test]
    fn test_warning_and_info() {
        assert_eq!(
            ProgressMessage::from_line(r#"{"type":"Warning","message":"careful"}"#).unwrap(),
            ProgressMessage::Warning {
                text: "careful".into()
            }
        );
        assert_eq!(
            ProgressMessage::from_line(r#"{"type":"Info","message":"fyi"}"#).unwrap(),
            ProgressMessage::Info { text: "fyi".into() }
        );
    }

    #[test]
    fn test_ide_message() {
        let line = r#"{"type":"IdeMessage","message":{"id":"m1","level":"Warning","text":"heads up","actions":[{"kind":"Link","label":"Docs","link":"https://docs.invalid"}]}}"#;
        let msg = ProgressMessage::from_line(line).unwrap();
        let ProgressMessage::IdeMessage(ide) = msg else {
            panic!("expected IdeMessage");
        };
        assert_eq!(ide.level, NotificationLevel::Warning);
        assert_eq!(ide.actions.len(), 1);
    }

    #[test]
    fn test_malformed_ide_message_is_an_error() {
        assert!(ProgressMessage::from_line(r#"{"type":"IdeMessage","message":"text"}"#).is_err());
    }

    #[test]
    fn test_non_object_lines_are_errors() {
        assert!(ProgressMessage::from_line("plain text").is_err());
        assert!(ProgressMessage::from_line("[1,2]").is_err());
        assert!(ProgressMessage::from_line("[]").is_err());
        assert!(ProgressMessage::from_line("[null]").is_err());
        assert!(ProgressMessage::from_line(r#"["FinishedTask"]"#).is_err());
        assert!(ProgressMessage::from_line("null").is_err());
        assert!(ProgressMessage::from_line("{}").is_ok());
    }

    #[test]
    fn test_progress_text() {
        assert_eq!(ProgressMessage::progress_text("pulling", Some("50%")), "pulling: 50%");
        assert_eq!(ProgressMessage::progress_text("pulling", None), "pulling");
    }

    #[test]
    fn test_execution_result_wire_format() {
        let payload = json!({
            "environment": {"LD_PRELOAD": "/tmp/layer.so", "B": "2"},
            "patched_path": "/tmp/patched/bash",
            "env_to_unset": ["OLD"],
            "uses_operator": true
        });
        let result = ExecutionResult::from_payload(&payload).unwrap();
        assert_eq!(result.env_keys_to_unset, vec!["OLD"]);
        assert_eq!(
            result.patched_executable_path,
            Some(PathBuf::from("/tmp/patched/bash"))
        );
        assert_eq!(result.uses_remote_operator, Some(true));

        let reencoded = serde_json::to_value(&result).unwrap();
        let decoded = ExecutionResult::from_payload(&reencoded).unwrap();
        assert_eq!(decoded.environment, result.environment);
    }

    #[test]
    fn test_execution_result_tolerates_nulls_and_absence() {
        let result = ExecutionResult::from_payload(&json!({
            "environment": null,
            "env_to_unset": null
        }))
        .unwrap();
        assert!(result.environment.is_empty());
        assert!(result.env_keys_to_unset.is_empty());
        assert_eq!(result.uses_remote_operator, None);
    }
}
