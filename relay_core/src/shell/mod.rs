//! # Shell Module
//!
//! Entry point and CLI logic for the `relay` binary.
//!
//! ## Sub-modules
//!
//! - **`cli`**: argument parsing, settings layering and dispatch
//! - **`commands`**: the `launch`, `targets` and `version` sub-commands

pub mod cli;
pub mod commands;

pub use cli::{Cli, Command, OutputFormat, parse_env_pair, resolve_settings, run};
