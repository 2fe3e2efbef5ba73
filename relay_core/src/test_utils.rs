//! Test helper utilities for relay.
//!
//! Fake external tools, scripted pickers and recording sinks shared by the
//! unit tests and the integration tests under `tests/`. These APIs are
//! intended for test-only code paths.

pub use crate::utils::logging::init_test_logging;

use crate::{
    constants::{FINISHED_TASK_TYPE, LAUNCH_TASK_NAME},
    error::ToolError,
    notifications::{HostEvent, Notification, NotificationError, NotificationSink},
    protocol::ExecutionResult,
    targets::{PickRequest, Picker, PickerError, TargetCatalog, TargetSource},
};
use async_trait::async_trait;
use serde_json::json;
use std::{
    collections::{HashMap, VecDeque},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Write an executable `/bin/sh` script named `relay-agent` into `dir`.
///
/// `body` runs with the tool's arguments in `$@`. Tests that spawn scripts
/// should be `#[serial]`: a script still open for writing in another thread's
/// fork cannot be executed (`ETXTBSY`).
#[cfg(unix)]
pub fn write_fake_tool(dir: &Path, body: &str) -> io::Result<PathBuf> {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("relay-agent");
    {
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "#!/bin/sh")?;
        writeln!(file, "{body}")?;
        file.sync_all()?;
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Shell snippet printing `lines` verbatim to stdout.
pub fn emit_stdout<S: AsRef<str>>(lines: &[S]) -> String {
    format!("cat <<'RELAY_EOF'\n{}\nRELAY_EOF\n", join_lines(lines))
}

/// Shell snippet printing `lines` verbatim to stderr.
pub fn emit_stderr<S: AsRef<str>>(lines: &[S]) -> String {
    format!("cat >&2 <<'RELAY_EOF'\n{}\nRELAY_EOF\n", join_lines(lines))
}

fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n")
}

/// The successful terminating protocol line carrying `result`.
pub fn finished_line(result: &ExecutionResult) -> String {
    let encoded = serde_json::to_string(result).unwrap_or_default();
    json!({
        "name": LAUNCH_TASK_NAME,
        "type": FINISHED_TASK_TYPE,
        "success": true,
        "message": encoded,
    })
    .to_string()
}

/// A generic progress line.
pub fn progress_line(name: &str, message: Option<&str>) -> String {
    json!({ "name": name, "type": "Progress", "message": message }).to_string()
}

/// How a [`ScriptedPicker`] answers one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedAnswer {
    /// Choose the item with this label.
    Label(String),
    /// Choose by position.
    Index(usize),
    Dismiss,
    /// Fail as if the terminal went away.
    Fail,
}

impl ScriptedAnswer {
    pub fn label(label: impl Into<String>) -> Self {
        ScriptedAnswer::Label(label.into())
    }
}

/// Picker answering from a queue and recording every prompt it was shown.
/// Once the queue is empty every prompt is dismissed.
#[derive(Debug, Default)]
pub struct ScriptedPicker {
    answers: Mutex<VecDeque<ScriptedAnswer>>,
    shown: Mutex<Vec<PickRequest>>,
}

impl ScriptedPicker {
    pub fn new(answers: impl IntoIterator<Item = ScriptedAnswer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<PickRequest> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Labels of every prompt, in order.
    pub fn shown_labels(&self) -> Vec<Vec<String>> {
        self.requests()
            .into_iter()
            .map(|request| request.items.into_iter().map(|item| item.label).collect())
            .collect()
    }
}

#[async_trait]
impl Picker for ScriptedPicker {
    async fn pick(&self, request: PickRequest) -> Result<Option<usize>, PickerError> {
        let answer = self
            .answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(ScriptedAnswer::Dismiss);
        let chosen = match &answer {
            ScriptedAnswer::Label(label) => request.items.iter().position(|item| &item.label == label),
            ScriptedAnswer::Index(index) => Some(*index),
            ScriptedAnswer::Dismiss => None,
            ScriptedAnswer::Fail => {
                self.shown.lock().unwrap_or_else(|e| e.into_inner()).push(request);
                return Err(PickerError::Task("scripted failure".to_string()));
            }
        };
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).push(request);
        Ok(chosen)
    }
}

/// Sink that keeps everything it receives.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    events: Mutex<Vec<HostEvent>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Notification(n) => Some(n),
                HostEvent::Progress(_) => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Progress(text) => Some(text),
                HostEvent::Notification(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn show(&self, notification: Notification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(HostEvent::Notification(notification));
        Ok(())
    }

    async fn progress(&self, text: &str) -> Result<(), NotificationError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(HostEvent::Progress(text.to_string()));
        Ok(())
    }
}

/// Target source serving fixed catalogs per namespace and recording calls.
#[derive(Debug, Default)]
pub struct StaticTargetSource {
    catalogs: HashMap<Option<String>, TargetCatalog>,
    calls: Mutex<Vec<Option<String>>>,
}

impl StaticTargetSource {
    /// Serve `catalog` for the initial (namespace-less) listing.
    pub fn new(catalog: TargetCatalog) -> Self {
        Self::default().with_namespace(None, catalog)
    }

    pub fn with_namespace(mut self, namespace: Option<&str>, catalog: TargetCatalog) -> Self {
        self.catalogs.insert(namespace.map(str::to_string), catalog);
        self
    }

    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl TargetSource for StaticTargetSource {
    async fn list(&self, namespace: Option<&str>) -> Result<TargetCatalog, ToolError> {
        let key = namespace.map(str::to_string);
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(key.clone());
        self.catalogs
            .get(&key)
            .cloned()
            .ok_or_else(|| ToolError::Decode {
                command: "ls".to_string(),
                reason: format!("no catalog for namespace {key:?}"),
            })
    }
}
