//! # Execution Orchestrator
//!
//! Owns one end-to-end `ext` run:
//!
//! 1. Resolve what to run against: the request's selection, a target pinned
//!    by the configuration file, or the interactive selection loop.
//! 2. Spawn `<tool> ext [-t <target>] [-f <config>] [-e <executable>]` with
//!    the caller's overlay and the machine-readable progress flag.
//! 3. Consume the control protocol until a successful `Finished` message,
//!    racing the whole run against the execution timeout.
//! 4. Without a result, classify the exit: stderr error sentinel, then exit
//!    code, then signal, then "stream ended without result".
//!
//! Every terminal failure is reported once through the notification sink and
//! moves the lifecycle to `Failed(kind)`.

use crate::{
    config::RelaySettings,
    constants::{EXIT_DRAIN_GRACE, PROGRESS_MODE_ENV, TARGET_NAMESPACE_ENV},
    error::ExecutionError,
    notifications::{NotificationSink, notify, report_failure},
    protocol::{
        ExecutionResult, NotificationLevel, ProgressMessage, ProtocolCodec, find_error_sentinel,
    },
    targets::{TargetSelector, UserSelection},
    tool::{ExternalTool, VerifiedConfig},
    transport::{self, ProcessExit, ProcessHandle},
};
use futures::StreamExt;
use relay_common::LaunchStateMachine;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    io::AsyncReadExt,
    process::{ChildStderr, ChildStdout},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::codec::FramedRead;

/// Everything needed for one launch attempt.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub selection: Option<UserSelection>,
    pub config_file_path: Option<PathBuf>,
    pub executable_path: Option<PathBuf>,
    pub env_overlay: HashMap<String, String>,
}

/// Argument vector for `ext`.
pub fn build_ext_args(
    target: Option<&str>,
    config_file_path: Option<&Path>,
    executable_path: Option<&Path>,
) -> Vec<String> {
    let mut args = vec!["ext".to_string()];
    if let Some(target) = target {
        args.push("-t".to_string());
        args.push(target.to_string());
    }
    if let Some(path) = config_file_path {
        args.push("-f".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    if let Some(path) = executable_path {
        args.push("-e".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    args
}

/// Failure for a run that ended without a successful result.
pub fn classify_exit(exit: &ProcessExit, stderr: &str) -> ExecutionError {
    if let Some(report) = find_error_sentinel(stderr) {
        return ExecutionError::ProtocolError {
            message: report.message,
            help: report.help,
        };
    }
    match exit.disposition() {
        Some(disposition) => ExecutionError::AbnormalExit(disposition),
        None => ExecutionError::protocol("stream ended without result"),
    }
}

pub struct Orchestrator {
    tool: Arc<ExternalTool>,
    notifier: Arc<dyn NotificationSink>,
    selector: Option<Arc<TargetSelector>>,
    settings: RelaySettings,
}

impl Orchestrator {
    pub fn new(
        tool: Arc<ExternalTool>,
        notifier: Arc<dyn NotificationSink>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            tool,
            notifier,
            selector: None,
            settings,
        }
    }

    /// Enable interactive selection when the request carries none.
    pub fn with_selector(mut self, selector: Arc<TargetSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutionError> {
        self.execute_with_lifecycle(request, &LaunchStateMachine::new())
            .await
    }

    /// Like [`Orchestrator::execute`], publishing phases to `lifecycle`.
    pub async fn execute_with_lifecycle(
        &self,
        request: &ExecutionRequest,
        lifecycle: &LaunchStateMachine,
    ) -> Result<ExecutionResult, ExecutionError> {
        let outcome = self.run(request, lifecycle).await;
        match &outcome {
            Ok(result) => {
                advance(lifecycle.transition_to_succeeded());
                tracing::info!(
                    "External tool returned {} environment entries, patched executable: {:?}, uses operator: {:?}",
                    result.environment.len(),
                    result.patched_executable_path,
                    result.uses_remote_operator
                );
            }
            Err(e) => {
                tracing::error!(kind = e.kind(), "Launch failed: {}", e);
                advance(lifecycle.transition_to_failed(e.kind()));
                report_failure(self.notifier.as_ref(), e).await;
            }
        }
        outcome
    }

    async fn run(
        &self,
        request: &ExecutionRequest,
        lifecycle: &LaunchStateMachine,
    ) -> Result<ExecutionResult, ExecutionError> {
        let selection = self.resolve_selection(request, lifecycle).await?;
        let args = build_ext_args(
            selection.path.as_deref(),
            request.config_file_path.as_deref(),
            request.executable_path.as_deref(),
        );
        let env = self.ext_environment(request, &selection);

        advance(lifecycle.transition_to_spawning());
        let mut handle = transport::spawn(self.tool.binary(), &args, &env)?;
        advance(lifecycle.transition_to_streaming());

        let limit = self.settings.execution_timeout();
        let streamed = timeout(limit, self.stream(&mut handle, lifecycle)).await;
        match streamed {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    "No result from the external tool after {}s (pid {:?})",
                    limit.as_secs(),
                    handle.id()
                );
                if self.settings.kill_on_timeout
                    && let Err(e) = handle.start_kill()
                {
                    tracing::warn!("Failed to kill the external tool: {}", e);
                }
                Err(ExecutionError::Timeout { after: limit })
            }
        }
    }

    async fn resolve_selection(
        &self,
        request: &ExecutionRequest,
        lifecycle: &LaunchStateMachine,
    ) -> Result<UserSelection, ExecutionError> {
        if let Some(selection) = &request.selection {
            return Ok(selection.clone());
        }
        if let Some(config) = &request.config_file_path
            && self.has_pinned_target(config).await?
        {
            tracing::info!("Target pinned by {}, skipping selection", config.display());
            return Ok(UserSelection::default());
        }
        let Some(selector) = &self.selector else {
            return Ok(UserSelection::default());
        };

        advance(lifecycle.transition_to_selecting());
        match selector.resolve().await {
            Ok(selection) => Ok(selection),
            Err(ExecutionError::SelectionAborted(reason)) => {
                tracing::warn!("Target selection aborted: {}", reason);
                notify(
                    self.notifier.as_ref(),
                    NotificationLevel::Info,
                    format!("Target selection was interrupted ({reason}), so the process will run targetless."),
                    Vec::new(),
                )
                .await;
                Ok(UserSelection::default())
            }
            Err(e) => Err(e),
        }
    }

    async fn has_pinned_target(&self, config: &Path) -> Result<bool, ExecutionError> {
        match self.tool.verify_config(config).await {
            Ok(VerifiedConfig::Success { config: verified, warnings }) => {
                for warning in warnings {
                    notify(self.notifier.as_ref(), NotificationLevel::Warning, warning, Vec::new())
                        .await;
                }
                Ok(verified.target.path.is_some())
            }
            Ok(VerifiedConfig::Fail { errors }) => Err(ExecutionError::ProtocolError {
                message: format!("Invalid configuration file: {}", errors.join("; ")),
                help: Some(format!("Fix {} and try again.", config.display())),
            }),
            Err(e) => {
                tracing::warn!("Could not verify {}: {}", config.display(), e);
                Ok(false)
            }
        }
    }

    fn ext_environment(
        &self,
        request: &ExecutionRequest,
        selection: &UserSelection,
    ) -> HashMap<String, String> {
        let mut env = request.env_overlay.clone();
        if let Some(namespace) = &selection.namespace {
            env.insert(TARGET_NAMESPACE_ENV.to_string(), namespace.clone());
        }
        env.insert(
            PROGRESS_MODE_ENV.to_string(),
            self.settings.progress_mode.clone(),
        );
        env
    }

    /// Consume stdout until a result or until the tool exits, then classify
    /// the exit if no result came.
    ///
    /// Exit is observed directly rather than through stdout EOF: a helper the
    /// tool leaves behind may inherit its pipes and keep them open.
    async fn stream(
        &self,
        handle: &mut ProcessHandle,
        lifecycle: &LaunchStateMachine,
    ) -> Result<ExecutionResult, ExecutionError> {
        // Drained concurrently so a chatty stderr cannot block the tool.
        let stderr = handle.take_stderr().map(StderrCapture::spawn);
        let mut frames = handle
            .take_stdout()
            .map(|stdout| FramedRead::new(stdout, ProtocolCodec::new()));

        let exit = loop {
            tokio::select! {
                biased;
                frame = next_frame(&mut frames) => match frame {
                    Some(Ok(message)) => {
                        if let Some(result) = self.handle_message(message, lifecycle).await? {
                            return Ok(result);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Failed reading stdout: {}", e);
                        frames = None;
                    }
                    None => {
                        tracing::debug!("stdout closed");
                        frames = None;
                    }
                },
                status = handle.wait() => {
                    break status.map_err(|e| {
                        ExecutionError::protocol(format!("Failed to wait for the external tool: {e}"))
                    })?;
                }
            }
        };
        tracing::debug!("External tool exited: {:?}", exit);

        // Lines written just before exit may still be in the pipe
        if let Some(frames) = frames.as_mut() {
            match timeout(EXIT_DRAIN_GRACE, self.drain(frames, lifecycle)).await {
                Ok(drained) => {
                    if let Some(result) = drained? {
                        return Ok(result);
                    }
                }
                Err(_) => tracing::debug!(
                    "stdout still open {}ms after exit, ignoring the rest",
                    EXIT_DRAIN_GRACE.as_millis()
                ),
            }
        }

        let stderr = match stderr {
            Some(capture) => capture.finish(EXIT_DRAIN_GRACE).await,
            None => String::new(),
        };
        Err(classify_exit(&exit, &stderr))
    }

    /// Consume `frames` to EOF, stopping early on a result.
    async fn drain(
        &self,
        frames: &mut FramedRead<ChildStdout, ProtocolCodec>,
        lifecycle: &LaunchStateMachine,
    ) -> Result<Option<ExecutionResult>, ExecutionError> {
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(message) => {
                    if let Some(result) = self.handle_message(message, lifecycle).await? {
                        return Ok(Some(result));
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed reading stdout: {}", e);
                    break;
                }
            }
        }
        tracing::debug!(
            "stdout drained ({} malformed lines dropped)",
            frames.decoder().dropped_lines()
        );
        Ok(None)
    }

    async fn handle_message(
        &self,
        message: ProgressMessage,
        lifecycle: &LaunchStateMachine,
    ) -> Result<Option<ExecutionResult>, ExecutionError> {
        advance(lifecycle.record_message());
        self.dispatch(message).await
    }

    async fn dispatch(
        &self,
        message: ProgressMessage,
    ) -> Result<Option<ExecutionResult>, ExecutionError> {
        tracing::debug!("Protocol message: {:?}", message);
        match message {
            ProgressMessage::Finished {
                success: true,
                payload,
            } => ExecutionResult::from_payload(&payload)
                .map(Some)
                .map_err(|e| ExecutionError::protocol(format!("Invalid execution result: {e}"))),
            ProgressMessage::Finished { success: false, .. } => {
                tracing::warn!("Launch task finished unsuccessfully, waiting for exit status");
                Ok(None)
            }
            ProgressMessage::Warning { text } => {
                notify(self.notifier.as_ref(), NotificationLevel::Warning, text, Vec::new()).await;
                Ok(None)
            }
            ProgressMessage::Info { text } => {
                notify(self.notifier.as_ref(), NotificationLevel::Info, text, Vec::new()).await;
                Ok(None)
            }
            ProgressMessage::IdeMessage(message) => {
                if let Err(e) = self.notifier.show(message.into()).await {
                    tracing::warn!("Failed to deliver notification: {}", e);
                }
                Ok(None)
            }
            ProgressMessage::Progress { name, message } => {
                let text = ProgressMessage::progress_text(&name, message.as_deref());
                if let Err(e) = self.notifier.progress(&text).await {
                    tracing::debug!("Failed to update progress: {}", e);
                }
                Ok(None)
            }
        }
    }
}

async fn next_frame(
    frames: &mut Option<FramedRead<ChildStdout, ProtocolCodec>>,
) -> Option<std::io::Result<ProgressMessage>> {
    match frames {
        Some(frames) => frames.next().await,
        None => std::future::pending().await,
    }
}

/// stderr collected in the background. Bytes read before [`StderrCapture::finish`]
/// gives up are kept even if the pipe never reaches EOF.
struct StderrCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl StderrCapture {
    fn spawn(mut stderr: ChildStderr) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 4096];
            loop {
                match stderr.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        tracing::debug!("Failed reading stderr: {}", e);
                        break;
                    }
                }
            }
        });
        Self { buffer, task }
    }

    /// Wait up to `grace` for EOF, then return what was read.
    async fn finish(mut self, grace: Duration) -> String {
        if timeout(grace, &mut self.task).await.is_err() {
            tracing::debug!("stderr still open after exit, using what was read");
            self.task.abort();
        }
        let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

fn advance(transition: Result<(), &'static str>) {
    if let Err(e) = transition {
        tracing::debug!("Lifecycle transition skipped: {}", e);
    }
}
