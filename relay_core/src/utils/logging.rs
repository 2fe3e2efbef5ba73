//! # Logging Initialization
//!
//! Centralised setup of the `tracing` subscriber used by the library and the
//! `relay` binary.
//!
//! - **Environment filter**: `RUST_LOG` wins; otherwise `<level>,relay_core=debug`.
//! - **File logging (default)**: a daily rolling file in the platform cache
//!   directory, written through a non-blocking appender without ANSI colours.
//!   This is the file the "Open logs" support action points at.
//! - **Stderr logging**: with colours, when file logging is disabled or the
//!   cache directory cannot be written.
//!
//! Initialisation happens at most once per process.

use anyhow::Result;
use directories::ProjectDirs;
use std::{
    io::stderr,
    path::{Path, PathBuf},
    sync::Once,
};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

const LOG_FILE_PREFIX: &str = "relay.log";

/// Initialize verbose logging for tests.
pub fn init_test_logging() {
    let _ = init_logging("trace", false);
}

/// Directory holding the rolling log files, if the platform provides one.
pub fn log_directory() -> Option<PathBuf> {
    ProjectDirs::from("dev", "Relay", "relay").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Initializes the logging system.
///
/// Logs go to a daily rolling file when `log_to_file` is set and the cache
/// directory is writable, and to stderr otherwise.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},relay_core=debug")));

        if log_to_file
            && let Some(log_dir) = log_directory()
            && can_write(&log_dir)
        {
            // rolling::daily panics on unwritable directories, hence the write check above
            let file_appender = std::panic::catch_unwind(|| {
                tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX)
            });

            if let Ok(file_appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .init();
                // Leaked so buffered lines are flushed on exit.
                Box::leak(Box::new(guard));
                return;
            }
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .init();
    });

    Ok(())
}

fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }

    let marker = dir.join(".relay_log_write_check");
    match std::fs::write(&marker, "ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&marker);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        assert!(init_logging("debug", false).is_ok());
        assert!(init_logging("info", true).is_ok());
    }

    #[test]
    fn test_can_write_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(can_write(&dir.path().join("nested")));
    }
}
