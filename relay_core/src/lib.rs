//! # Relay Core
//!
//! Prepares a host launch configuration so that the launched process runs
//! inside a remote execution context provided by an external tool.
//!
//! One launch flows through three pieces:
//!
//! - **Target selection** ([`targets`]): list what the tool can run against
//!   and let the user pick, with the last choice remembered per workspace.
//! - **Execution** ([`orchestrator`]): spawn `<tool> ext`, decode its
//!   newline-delimited JSON progress ([`protocol`]) under a hard timeout and
//!   produce an [`protocol::ExecutionResult`].
//! - **Patching** ([`patcher`]): apply the result's environment changes and
//!   executable substitution to the launch configuration.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use relay_core::{
//!     collaborators::WorkspaceConfigResolver,
//!     config::RelaySettings,
//!     notifications::LoggingNotificationSink,
//!     orchestrator::Orchestrator,
//!     patcher::{LaunchConfiguration, LaunchContext, Patcher, prepare_launch},
//!     tool::ExternalTool,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = RelaySettings::default();
//! let tool = Arc::new(ExternalTool::new("/usr/local/bin/relay-agent", settings.supported_target_types.clone()));
//! let orchestrator = Orchestrator::new(tool, Arc::new(LoggingNotificationSink), settings);
//!
//! let mut config = LaunchConfiguration::from_value(serde_json::json!({
//!     "type": "node",
//!     "program": "index.js",
//! }))
//! .unwrap();
//! let context = LaunchContext {
//!     workspace: ".".into(),
//!     ..Default::default()
//! };
//! prepare_launch(&mut config, &context, &WorkspaceConfigResolver, &orchestrator, &Patcher::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod config;
pub mod constants;
pub mod error;
pub mod notifications;
pub mod orchestrator;
pub mod patcher;
pub mod protocol;
pub mod shell;
pub mod targets;
pub mod test_utils;
pub mod tool;
pub mod transport;
pub mod utils;

pub use error::ExecutionError;
pub use orchestrator::{ExecutionRequest, Orchestrator};
pub use patcher::{LaunchConfiguration, Patcher};
pub use protocol::ExecutionResult;
