//! # External Tool Calls
//!
//! The short-lived sub-commands of the external tool: `ls` for the target
//! catalog, `verify-config --ide` for statically pinned targets and
//! `--version`. Each runs to completion under the listing timeout and its
//! stdout is decoded as JSON (or plain text for the version). The long-running
//! `ext` call lives in [`crate::orchestrator`].

use crate::{
    constants::{DEFAULT_LISTING_TIMEOUT, LS_RICH_OUTPUT_ENV, LS_TARGET_TYPES_ENV},
    error::{ExitDisposition, ToolError},
    protocol::find_error_sentinel,
    targets::{TargetCatalog, TargetSource, parse_listing},
    transport::ProcessExit,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};
use tokio::{process::Command, time::timeout};

/// Target pinned by a verified configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VerifiedTarget {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VerifiedSettings {
    #[serde(default)]
    pub target: VerifiedTarget,
}

/// Outcome of `verify-config --ide`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum VerifiedConfig {
    Success {
        #[serde(default)]
        config: VerifiedSettings,
        #[serde(default)]
        warnings: Vec<String>,
    },
    Fail {
        #[serde(default)]
        errors: Vec<String>,
    },
}

impl VerifiedConfig {
    /// The pinned target, if the configuration names one.
    pub fn pinned_target(&self) -> Option<&VerifiedTarget> {
        match self {
            VerifiedConfig::Success { config, .. } if config.target.path.is_some() => {
                Some(&config.target)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ToolVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parse `--version` output such as `relay-agent 3.12.0`.
///
/// The second whitespace-delimited token is the version; a leading `v` and
/// any pre-release or build suffix are ignored, and missing components are zero.
pub fn parse_version(output: &str) -> Option<ToolVersion> {
    let token = output.split_whitespace().nth(1)?;
    let token = token.strip_prefix('v').unwrap_or(token);
    let core = token.split(['-', '+']).next()?;
    let mut parts = core.split('.').map(|part| part.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    Some(ToolVersion {
        major,
        minor,
        patch,
    })
}

/// Handle on the external tool binary.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    binary: PathBuf,
    timeout: Duration,
    target_types: Vec<String>,
}

impl ExternalTool {
    pub fn new(binary: impl Into<PathBuf>, target_types: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_LISTING_TIMEOUT,
            target_types,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn target_types(&self) -> &[String] {
        &self.target_types
    }

    /// `ls [-f <config>] [-n <namespace>]`, restricted to the supported types.
    pub async fn list_targets(
        &self,
        config_path: Option<&Path>,
        namespace: Option<&str>,
    ) -> Result<TargetCatalog, ToolError> {
        let args = list_args(config_path, namespace);
        let types = serde_json::to_string(&self.target_types).map_err(|e| ToolError::Decode {
            command: "ls".to_string(),
            reason: e.to_string(),
        })?;
        let env = HashMap::from([
            (LS_TARGET_TYPES_ENV.to_string(), types),
            (LS_RICH_OUTPUT_ENV.to_string(), "true".to_string()),
        ]);

        let stdout = self.run(&args, &env).await?;
        parse_listing(&stdout).map_err(|e| ToolError::Decode {
            command: "ls".to_string(),
            reason: e.to_string(),
        })
    }

    /// `verify-config --ide <path>`
    pub async fn verify_config(&self, config_path: &Path) -> Result<VerifiedConfig, ToolError> {
        let args = vec![
            "verify-config".to_string(),
            "--ide".to_string(),
            config_path.to_string_lossy().into_owned(),
        ];
        let stdout = self.run(&args, &HashMap::new()).await?;
        serde_json::from_str(stdout.trim()).map_err(|e| ToolError::Decode {
            command: "verify-config".to_string(),
            reason: e.to_string(),
        })
    }

    /// `--version`
    pub async fn version(&self) -> Result<ToolVersion, ToolError> {
        let stdout = self.run(&["--version".to_string()], &HashMap::new()).await?;
        parse_version(&stdout).ok_or_else(|| ToolError::Decode {
            command: "--version".to_string(),
            reason: format!("unrecognised version output '{}'", stdout.trim()),
        })
    }

    async fn run(&self, args: &[String], env: &HashMap<String, String>) -> Result<String, ToolError> {
        let command_name = args.first().cloned().unwrap_or_default();
        tracing::debug!("Running {} {:?}", self.binary.display(), args);

        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .envs(env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::Spawn {
                    path: self.binary.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    command: command_name,
                    after: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = find_error_sentinel(&stderr)
                .map(|report| report.message)
                .unwrap_or_else(|| stderr.trim().to_string());
            let status = ProcessExit::from_status(output.status)
                .disposition()
                .unwrap_or(ExitDisposition::Code(-1));
            tracing::warn!("'{}' failed with {}: {}", command_name, status, message);
            return Err(ToolError::Failed {
                command: command_name,
                status,
                message,
            });
        }

        String::from_utf8(output.stdout).map_err(|e| ToolError::Decode {
            command: command_name,
            reason: e.to_string(),
        })
    }
}

fn list_args(config_path: Option<&Path>, namespace: Option<&str>) -> Vec<String> {
    let mut args = vec!["ls".to_string()];
    if let Some(path) = config_path {
        args.push("-f".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    if let Some(ns) = namespace {
        args.push("-n".to_string());
        args.push(ns.to_string());
    }
    args
}

/// [`TargetSource`] backed by `ls`.
#[derive(Debug, Clone)]
pub struct ToolTargetSource {
    tool: Arc<ExternalTool>,
    config_path: Option<PathBuf>,
}

impl ToolTargetSource {
    pub fn new(tool: Arc<ExternalTool>, config_path: Option<PathBuf>) -> Self {
        Self { tool, config_path }
    }
}

#[async_trait]
impl TargetSource for ToolTargetSource {
    async fn list(&self, namespace: Option<&str>) -> Result<TargetCatalog, ToolError> {
        self.tool
            .list_targets(self.config_path.as_deref(), namespace)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_second_token() {
        assert_eq!(
            parse_version("relay-agent 3.12.1\n"),
            Some(ToolVersion {
                major: 3,
                minor: 12,
                patch: 1
            })
        );
        assert_eq!(
            parse_version("relay-agent v2.0.0-rc.1").map(|v| v.to_string()),
            Some("2.0.0".to_string())
        );
        assert_eq!(parse_version("relay-agent 4").map(|v| v.to_string()), Some("4.0.0".into()));
        assert_eq!(parse_version("3.12.1"), None);
        assert_eq!(parse_version("relay-agent unknown"), None);
    }

    #[test]
    fn test_list_args() {
        assert_eq!(list_args(None, None), ["ls"]);
        assert_eq!(
            list_args(Some(Path::new("/w/.relay/relay.json")), Some("dev")),
            ["ls", "-f", "/w/.relay/relay.json", "-n", "dev"]
        );
    }

    #[test]
    fn test_verified_config_decoding() {
        let pinned: VerifiedConfig = serde_json::from_str(
            r#"{"type":"Success","config":{"target":{"path":"pod/api","namespace":"dev"}},"warnings":[]}"#,
        )
        .unwrap();
        assert_eq!(
            pinned.pinned_target().and_then(|t| t.path.as_deref()),
            Some("pod/api")
        );

        let open: VerifiedConfig =
            serde_json::from_str(r#"{"type":"Success","config":{"target":{}}}"#).unwrap();
        assert!(open.pinned_target().is_none());

        let failed: VerifiedConfig =
            serde_json::from_str(r#"{"type":"Fail","errors":["bad field"]}"#).unwrap();
        assert_eq!(
            failed,
            VerifiedConfig::Fail {
                errors: vec!["bad field".into()]
            }
        );
    }
}
