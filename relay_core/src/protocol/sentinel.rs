//! Error sentinel on the tool's stderr.
//!
//! On a fatal error the tool writes a line `Error: {"message": "...", "help": "..."}`.
//! stderr is inspected only once the process has exited, so a successful
//! result that was already read from stdout always wins over it.

use crate::constants::ERROR_SENTINEL_PREFIX;
use serde::Deserialize;

/// Error reported by the external tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    #[serde(default)]
    pub help: Option<String>,
}

/// Find the first well-formed error sentinel in buffered stderr output.
pub fn find_error_sentinel(stderr: &str) -> Option<ErrorReport> {
    stderr
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix(ERROR_SENTINEL_PREFIX))
        .find_map(|payload| match serde_json::from_str::<ErrorReport>(payload.trim()) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::debug!("Ignoring non-JSON error line on stderr: {}", e);
                None
            }
        })
}
