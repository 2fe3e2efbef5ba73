//! Notification surface of the host.
//!
//! The orchestrator and the selection loop never render anything themselves;
//! they push user-facing messages and progress text through a
//! [`NotificationSink`]. Hosts plug in their own sink; the crate ships a
//! logging sink, a channel sink (used by tests and embedding hosts), a no-op
//! sink and a terminal sink used by the `relay` binary.
//!
//! Terminal failures are reported through [`report_failure`], which always
//! attaches the fixed set of support actions.

use crate::error::ExecutionError;
use crate::protocol::{IdeAction, IdeMessage, NotificationLevel};
use async_trait::async_trait;
use dialoguer::console::style;
use tokio::sync::mpsc;

/// Something the user can do from a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAction {
    Link { label: String, link: String },
    OpenLogs,
    FileIssue,
    ContactSupport,
}

impl NotificationAction {
    pub fn label(&self) -> &str {
        match self {
            NotificationAction::Link { label, .. } => label,
            NotificationAction::OpenLogs => "Open logs",
            NotificationAction::FileIssue => "File an issue",
            NotificationAction::ContactSupport => "Contact support",
        }
    }
}

impl From<IdeAction> for NotificationAction {
    fn from(action: IdeAction) -> Self {
        match action {
            IdeAction::Link { label, link } => NotificationAction::Link { label, link },
        }
    }
}

/// Support actions attached to every terminal failure.
pub const SUPPORT_ACTIONS: [NotificationAction; 3] = [
    NotificationAction::OpenLogs,
    NotificationAction::FileIssue,
    NotificationAction::ContactSupport,
];

/// A user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub text: String,
    pub actions: Vec<NotificationAction>,
}

impl From<IdeMessage> for Notification {
    fn from(message: IdeMessage) -> Self {
        Self {
            level: message.level,
            text: message.text,
            actions: message.actions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Everything a sink can receive, as delivered by [`ChannelNotificationSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Notification(Notification),
    Progress(String),
}

/// Errors that can occur when delivering to a sink.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification receiver disconnected")]
    Disconnected,
}

/// Host surface for notifications and the progress indicator.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Show a message with optional actions.
    async fn show(&self, notification: Notification) -> Result<(), NotificationError>;

    /// Update the progress indicator.
    async fn progress(&self, text: &str) -> Result<(), NotificationError> {
        tracing::debug!("progress: {}", text);
        Ok(())
    }
}

/// Show a message, logging (not propagating) delivery failures.
pub async fn notify(
    sink: &dyn NotificationSink,
    level: NotificationLevel,
    text: impl Into<String>,
    actions: Vec<NotificationAction>,
) {
    let notification = Notification {
        level,
        text: text.into(),
        actions,
    };
    if let Err(e) = sink.show(notification).await {
        tracing::warn!("Failed to deliver notification: {}", e);
    }
}

/// Build the single notification shown for a terminal failure.
pub fn failure_notice(err: &ExecutionError) -> Notification {
    let mut text = match err {
        ExecutionError::SpawnFailure { reason, .. } => format!(
            "Failed to start the external tool: {reason}. Check that the binary exists and is executable, then try again."
        ),
        ExecutionError::Timeout { after } => format!(
            "The external tool did not finish within {}s. The remote side may be unreachable.",
            after.as_secs()
        ),
        ExecutionError::ProtocolError { message, .. } => message.clone(),
        ExecutionError::AbnormalExit(disposition) => {
            format!("The external tool exited unexpectedly ({disposition}).")
        }
        ExecutionError::ListFailure(e) => format!("Failed to list targets: {e}"),
        ExecutionError::SelectionAborted(reason) => {
            format!("Target selection was aborted: {reason}")
        }
    };
    if let Some(help) = err.help() {
        text.push('\n');
        text.push_str(help);
    }
    Notification {
        level: NotificationLevel::Error,
        text,
        actions: SUPPORT_ACTIONS.to_vec(),
    }
}

/// Report a terminal failure to the host.
pub async fn report_failure(sink: &dyn NotificationSink, err: &ExecutionError) {
    if let Err(e) = sink.show(failure_notice(err)).await {
        tracing::warn!("Failed to deliver failure notification: {}", e);
    }
}

/// Channel-based sink for embedding hosts and tests.
pub struct ChannelNotificationSink {
    sender: mpsc::UnboundedSender<HostEvent>,
}

impl ChannelNotificationSink {
    pub fn new(sender: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl NotificationSink for ChannelNotificationSink {
    async fn show(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sender
            .send(HostEvent::Notification(notification))
            .map_err(|_| NotificationError::Disconnected)
    }

    async fn progress(&self, text: &str) -> Result<(), NotificationError> {
        self.sender
            .send(HostEvent::Progress(text.to_string()))
            .map_err(|_| NotificationError::Disconnected)
    }
}

/// Create a channel sink together with its receiver.
pub fn channel_notifications() -> (ChannelNotificationSink, mpsc::UnboundedReceiver<HostEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChannelNotificationSink::new(sender), receiver)
}

/// Sink that drops everything.
pub struct NoOpNotificationSink;

#[async_trait]
impl NotificationSink for NoOpNotificationSink {
    async fn show(&self, _notification: Notification) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Sink that writes notifications to the log.
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn show(&self, notification: Notification) -> Result<(), NotificationError> {
        match notification.level {
            NotificationLevel::Info => tracing::info!("{}", notification.text),
            NotificationLevel::Warning => tracing::warn!("{}", notification.text),
            NotificationLevel::Error => tracing::error!("{}", notification.text),
        }
        Ok(())
    }
}

/// Sink that prints to stderr, for the `relay` binary.
pub struct TerminalNotificationSink;

#[async_trait]
impl NotificationSink for TerminalNotificationSink {
    async fn show(&self, notification: Notification) -> Result<(), NotificationError> {
        let prefix = match notification.level {
            NotificationLevel::Info => style("info").cyan(),
            NotificationLevel::Warning => style("warning").yellow(),
            NotificationLevel::Error => style("error").red().bold(),
        };
        eprintln!("{prefix}: {}", notification.text);
        for action in &notification.actions {
            match action {
                NotificationAction::Link { label, link } => eprintln!("  - {label}: {link}"),
                NotificationAction::OpenLogs => match crate::utils::logging::log_directory() {
                    Some(dir) => eprintln!("  - {}: {}", action.label(), dir.display()),
                    None => eprintln!("  - {}", action.label()),
                },
                other => eprintln!("  - {}", other.label()),
            }
        }
        Ok(())
    }

    async fn progress(&self, text: &str) -> Result<(), NotificationError> {
        eprintln!("{}", style(text).dim());
        Ok(())
    }
}
