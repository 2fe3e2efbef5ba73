//! Observable lifecycle for a single launch attempt.
//!
//! One launch moves through `Idle -> Selecting -> Spawning -> Streaming` and
//! ends in either `Succeeded` or `Failed`. The phase is published through a
//! `tokio::sync::watch` channel so a host can render it (or wait for the end of
//! the attempt) without polling.
//!
//! # Example
//!
//! ```rust
//! use relay_common::launch_state::{LaunchPhase, LaunchStateMachine};
//!
//! let sm = LaunchStateMachine::new();
//! sm.transition_to_spawning().unwrap();
//! sm.transition_to_streaming().unwrap();
//! sm.record_message().unwrap();
//! sm.transition_to_succeeded().unwrap();
//! assert_eq!(sm.current(), LaunchPhase::Succeeded);
//! ```

use std::sync::Arc;
use tokio::sync::watch;

/// Phases of one launch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPhase {
    /// Nothing has happened yet.
    Idle,

    /// Waiting on the interactive target selection loop.
    Selecting,

    /// The external tool is being started.
    Spawning,

    /// The external tool is running and its control stream is being consumed.
    /// `messages` counts decoded protocol messages so far.
    Streaming { messages: u64 },

    /// A successful result was received.
    Succeeded,

    /// The attempt failed; `kind` is a short machine-readable failure name.
    Failed { kind: String },
}

impl LaunchPhase {
    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LaunchPhase::Succeeded | LaunchPhase::Failed { .. })
    }

    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            LaunchPhase::Idle => "idle",
            LaunchPhase::Selecting => "selecting",
            LaunchPhase::Spawning => "spawning",
            LaunchPhase::Streaming { .. } => "streaming",
            LaunchPhase::Succeeded => "succeeded",
            LaunchPhase::Failed { .. } => "failed",
        }
    }
}

/// Launch lifecycle backed by a watch channel.
///
/// Cloning is cheap and every clone observes the same phase.
#[derive(Clone)]
pub struct LaunchStateMachine {
    sender: Arc<watch::Sender<LaunchPhase>>,
    // Keeps the channel open while no external subscriber exists
    _receiver: watch::Receiver<LaunchPhase>,
}

impl LaunchStateMachine {
    /// Create a new state machine in the `Idle` phase.
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(LaunchPhase::Idle);
        Self {
            sender: Arc::new(sender),
            _receiver: receiver,
        }
    }

    /// Current phase without blocking.
    pub fn current(&self) -> LaunchPhase {
        self.sender.borrow().clone()
    }

    /// Subscribe to phase changes.
    pub fn subscribe(&self) -> watch::Receiver<LaunchPhase> {
        self.sender.subscribe()
    }

    /// `Idle -> Selecting`
    pub fn transition_to_selecting(&self) -> Result<(), &'static str> {
        self.transition(
            |phase| matches!(phase, LaunchPhase::Idle).then_some(LaunchPhase::Selecting),
            "Can only transition to Selecting from Idle",
        )
    }

    /// `Idle | Selecting -> Spawning`
    pub fn transition_to_spawning(&self) -> Result<(), &'static str> {
        self.transition(
            |phase| {
                matches!(phase, LaunchPhase::Idle | LaunchPhase::Selecting)
                    .then_some(LaunchPhase::Spawning)
            },
            "Can only transition to Spawning from Idle or Selecting",
        )
    }

    /// `Spawning -> Streaming`
    pub fn transition_to_streaming(&self) -> Result<(), &'static str> {
        self.transition(
            |phase| {
                matches!(phase, LaunchPhase::Spawning)
                    .then_some(LaunchPhase::Streaming { messages: 0 })
            },
            "Can only transition to Streaming from Spawning",
        )
    }

    /// `Streaming` self-loop: counts one decoded message.
    pub fn record_message(&self) -> Result<(), &'static str> {
        self.transition(
            |phase| match phase {
                LaunchPhase::Streaming { messages } => Some(LaunchPhase::Streaming {
                    messages: messages + 1,
                }),
                _ => None,
            },
            "Messages can only be recorded while Streaming",
        )
    }

    /// `Streaming -> Succeeded`
    pub fn transition_to_succeeded(&self) -> Result<(), &'static str> {
        self.transition(
            |phase| {
                matches!(phase, LaunchPhase::Streaming { .. }).then_some(LaunchPhase::Succeeded)
            },
            "Can only transition to Succeeded from Streaming",
        )
    }

    /// Any non-terminal phase `-> Failed`
    pub fn transition_to_failed(&self, kind: impl Into<String>) -> Result<(), &'static str> {
        let kind = kind.into();
        self.transition(
            |phase| {
                (!phase.is_terminal()).then(|| LaunchPhase::Failed { kind: kind.clone() })
            },
            "Cannot transition from terminal state",
        )
    }

    /// Wait until the attempt reaches a terminal phase.
    pub async fn wait_for_terminal(&self) -> LaunchPhase {
        let mut rx = self.sender.subscribe();
        loop {
            {
                let phase = rx.borrow_and_update();
                if phase.is_terminal() {
                    return phase.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.current();
            }
        }
    }

    fn transition(
        &self,
        next: impl Fn(&LaunchPhase) -> Option<LaunchPhase>,
        err: &'static str,
    ) -> Result<(), &'static str> {
        let mut transitioned = false;
        self.sender.send_if_modified(|phase| match next(phase) {
            Some(new_phase) => {
                *phase = new_phase;
                transitioned = true;
                true
            }
            None => false,
        });
        if transitioned { Ok(()) } else { Err(err) }
    }
}

impl Default for LaunchStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LaunchStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchStateMachine")
            .field("phase", &self.current())
            .finish()
    }
}
