//! # Control Protocol
//!
//! The external tool reports progress on stdout as newline-delimited JSON and
//! reports fatal errors on stderr with an `Error: <json>` sentinel line.
//!
//! - **`types`**: the closed set of [`ProgressMessage`] kinds and the
//!   [`ExecutionResult`] payload carried by the final message.
//! - **`codec`**: a `tokio_util` decoder that reassembles lines from arbitrary
//!   byte chunks and classifies them. Malformed lines are logged and dropped.
//! - **`sentinel`**: extraction of the error report from buffered stderr.

pub mod codec;
pub mod sentinel;
pub mod types;

pub use codec::ProtocolCodec;
pub use sentinel::{ErrorReport, find_error_sentinel};
pub use types::{ExecutionResult, IdeAction, IdeMessage, NotificationLevel, ProgressMessage};
