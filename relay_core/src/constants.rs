//! # Shared Constants
//!
//! Names and defaults that make up the contract with the external tool, plus
//! the launch-configuration keys the patcher reads and writes. Keeping them in
//! one place keeps the orchestrator, the auxiliary tool calls and the tests in
//! agreement.

use std::time::Duration;

/// Name of the external tool looked up on `PATH` when no binary is given.
pub const DEFAULT_TOOL_NAME: &str = "relay-agent";

/// Hard limit for one `ext` execution.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Limit for the auxiliary calls (`ls`, `verify-config`, `--version`).
pub const DEFAULT_LISTING_TIMEOUT: Duration = Duration::from_secs(30);

/// How long output still buffered in the pipes is read after the external
/// tool exits. Helpers it leaves behind may hold the pipes open indefinitely.
pub const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Supported target types, in fixed priority order.
pub const DEFAULT_TARGET_TYPES: [&str; 3] = ["deployment", "rollout", "pod"];

/// Task name carried by the terminating `FinishedTask` message.
pub const LAUNCH_TASK_NAME: &str = "relay preparing to launch";

/// `type` discriminator of a finished task.
pub const FINISHED_TASK_TYPE: &str = "FinishedTask";

/// Prefix of the error sentinel line on stderr.
pub const ERROR_SENTINEL_PREFIX: &str = "Error: ";

/// Longest stdout line the protocol decoder buffers before discarding it.
pub const MAX_PROTOCOL_LINE_BYTES: usize = 1024 * 1024;

// Environment understood by the external tool

/// Forces machine-readable progress output.
pub const PROGRESS_MODE_ENV: &str = "RELAY_PROGRESS_MODE";

/// Default value for [`PROGRESS_MODE_ENV`].
pub const DEFAULT_PROGRESS_MODE: &str = "json";

/// JSON array of target types `ls` should restrict itself to.
pub const LS_TARGET_TYPES_ENV: &str = "RELAY_LS_TARGET_TYPES";

/// Asks `ls` for the object output with availability and namespaces.
pub const LS_RICH_OUTPUT_ENV: &str = "RELAY_LS_RICH_OUTPUT";

/// Namespace of the selected target, passed to `ext`.
pub const TARGET_NAMESPACE_ENV: &str = "RELAY_TARGET_NAMESPACE";

// Environment read by this crate

/// Launch-environment hint naming the configuration file explicitly.
pub const CONFIG_FILE_HINT_ENV: &str = "RELAY_CONFIG_FILE";

/// Overrides `execution_timeout_secs` in [`crate::config::RelaySettings`].
pub const EXECUTION_TIMEOUT_ENV: &str = "RELAY_EXECUTION_TIMEOUT_SECS";

/// Overrides `log_level` in [`crate::config::RelaySettings`].
pub const LOG_LEVEL_ENV: &str = "RELAY_LOG_LEVEL";

/// Overrides `kill_on_timeout` in [`crate::config::RelaySettings`].
pub const KILL_ON_TIMEOUT_ENV: &str = "RELAY_KILL_ON_TIMEOUT";

/// Workspace-relative configuration files, in lookup order.
pub const WORKSPACE_CONFIG_CANDIDATES: [&str; 3] = [
    ".relay/relay.json",
    ".relay/relay.toml",
    ".relay/relay.yaml",
];

// Launch configuration

/// Env key marking a launch configuration as already patched.
pub const PROCESSED_SENTINEL_ENV: &str = "__RELAY_EXT_INJECTED";

/// Library preload variable honoured by the macOS dynamic loader.
pub const LIBRARY_PRELOAD_ENV: &str = "DYLD_INSERT_LIBRARIES";

/// Shell used for terminal-style configurations when `$SHELL` is unset.
pub const FALLBACK_SHELL: &str = "/bin/zsh";

// Persistence keys for the last selected target

/// Key under which the last selected target path is persisted (both scopes).
pub const LAST_TARGET_KEY: &str = "lastTarget";
