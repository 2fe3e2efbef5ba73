//! Shared primitives for the relay workspace.
//!
//! - **`launch_state`**: observable lifecycle of one launch attempt.

pub mod launch_state;

pub use launch_state::{LaunchPhase, LaunchStateMachine};
