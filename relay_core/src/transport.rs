//! # Process Transport
//!
//! Starts the external tool and hands back its raw stdout/stderr pipes plus a
//! way to await its exit. The transport never interprets the bytes it moves;
//! decoding belongs to [`crate::protocol`].
//!
//! The child inherits the current process environment with the caller's
//! variables layered on top. stdin is closed. The child is *not* killed when
//! the handle is dropped: after a successful result the tool is expected to
//! wind down on its own. Forced termination is explicit via
//! [`ProcessHandle::start_kill`].

use crate::error::{ExecutionError, ExitDisposition};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Final disposition of a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessExit {
    pub exit_code: Option<i32>,
    pub terminating_signal: Option<String>,
}

impl ProcessExit {
    pub fn from_status(status: ExitStatus) -> Self {
        Self {
            exit_code: status.code(),
            terminating_signal: terminating_signal(&status),
        }
    }

    /// The abnormal part of this exit, if any. A non-zero code takes precedence over a signal.
    pub fn disposition(&self) -> Option<ExitDisposition> {
        match (self.exit_code, &self.terminating_signal) {
            (Some(code), _) if code != 0 => Some(ExitDisposition::Code(code)),
            (_, Some(signal)) => Some(ExitDisposition::Signal(signal.clone())),
            _ => None,
        }
    }
}

/// A running external tool.
#[derive(Debug)]
pub struct ProcessHandle {
    program: PathBuf,
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ProcessHandle {
    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Take the stdout pipe. Returns `None` on the second call.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take the stderr pipe. Returns `None` on the second call.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        self.child.wait().await.map(ProcessExit::from_status)
    }

    /// Ask the OS to terminate the process without waiting for it.
    pub fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

/// Spawn `program` with `args`, layering `env` over the inherited environment.
///
/// Failure to start maps to [`ExecutionError::SpawnFailure`] with the OS error text.
pub fn spawn(
    program: &Path,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<ProcessHandle, ExecutionError> {
    tracing::debug!("Spawning {} {:?}", program.display(), args);

    let mut command = Command::new(program);
    command
        .args(args)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    let mut child = command.spawn().map_err(|e| ExecutionError::SpawnFailure {
        path: program.to_path_buf(),
        reason: e.to_string(),
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tracing::info!(
        "Started {} (pid {:?})",
        program.display(),
        child.id()
    );

    Ok(ProcessHandle {
        program: program.to_path_buf(),
        child,
        stdout,
        stderr,
    })
}

#[cfg(unix)]
fn terminating_signal(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(signal_name)
}

#[cfg(not(unix))]
fn terminating_signal(_status: &ExitStatus) -> Option<String> {
    None
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map(|signal| signal.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {signal}"))
}
