//! # Relay CLI
//!
//! Command-line definition and entry point of the `relay` binary.

use super::commands;
use crate::{config::RelaySettings, utils::logging::init_logging};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Relay: run a local process against a remote target through the external tool.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "relay prepares launch configurations for the external tool.

1. Launch: resolve a target, run `ext` and print the patched configuration.
   Example: relay launch --launch-config launch.json --workspace .

2. Targets: list the targets available for selection.
   Example: relay targets --namespace dev

3. Version: print the external tool's version.
   Example: relay version"
)]
pub struct Cli {
    /// Relay settings file (TOML). Defaults to relay.toml in the user config directory
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Path to the external tool. Looked up on PATH when omitted
    #[arg(long, global = true)]
    pub binary: Option<PathBuf>,

    /// Execution timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Leave the external tool running when the execution timeout fires
    #[arg(long, global = true)]
    pub no_kill_on_timeout: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log to stderr instead of file
    #[arg(long, global = true)]
    pub log_to_stderr: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve and patch a launch configuration
    Launch(LaunchArgs),
    /// List selectable targets
    Targets(TargetsArgs),
    /// Print the external tool's version
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct LaunchArgs {
    /// Workspace directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Launch configuration (JSON object). Use `-` for stdin
    #[arg(long)]
    pub launch_config: PathBuf,

    /// Target to run against, skipping selection
    #[arg(long)]
    pub target: Option<String>,

    /// Namespace of --target
    #[arg(long, requires = "target")]
    pub namespace: Option<String>,

    /// Extra environment for the launched process (KEY=VALUE, repeatable)
    #[arg(long = "env", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Never prompt; run targetless unless a target is given or pinned
    #[arg(long)]
    pub no_interactive: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TargetsArgs {
    /// Workspace directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Namespace to list
    #[arg(long)]
    pub namespace: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Output format for `relay targets`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Parse `KEY=VALUE`. The value may contain `=`.
pub fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "Relay", "relay").map(|dirs| dirs.config_dir().join("relay.toml"))
}

/// Settings from file and environment, with command-line flags applied last.
pub fn resolve_settings(cli: &Cli) -> Result<RelaySettings> {
    let path = cli.settings.clone().or_else(default_settings_path);
    let mut settings = RelaySettings::load(path.as_deref()).context("Failed to load relay settings")?;
    if let Some(secs) = cli.timeout {
        settings.execution_timeout_secs = secs;
    }
    if cli.no_kill_on_timeout {
        settings.kill_on_timeout = false;
    }
    if cli.debug {
        settings.log_level = "debug".to_string();
    }
    Ok(settings)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    init_logging(&settings.log_level, !cli.log_to_stderr)?;
    tracing::debug!("Effective settings: {:?}", settings);

    match &cli.command {
        Command::Launch(args) => commands::launch(&cli, args, settings).await,
        Command::Targets(args) => commands::targets(&cli, args, settings).await,
        Command::Version => commands::version(&cli, settings).await,
    }
}
