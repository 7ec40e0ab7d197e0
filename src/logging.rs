//! Tracing configuration and log routing.
//!
//! Runs log to stdout using a compact formatter and to a file. When `FILING_INDEXER_LOG_FILE` is
//! set, logs are appended to that path; otherwise they go to `logs/filing-indexer.log`. File
//! output goes through a non-blocking writer whose guard lives for the whole process.
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "FILING_INDEXER_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "filing-indexer.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the stdout and file subscribers.
///
/// `RUST_LOG` controls filtering (default `info`). Only the first call installs anything, so
/// tests and embedding callers may invoke it freely.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = file_writer().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
}

/// Path the file layer appends to, honouring the override variable when it is non-empty.
fn log_file_path(override_path: Option<String>) -> PathBuf {
    override_path
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE))
}

/// Open the log file and wrap it in a non-blocking writer.
///
/// Returns `None` (after reporting on stderr) when the directory or file cannot be created; the
/// run then logs to stdout only.
fn file_writer() -> Option<NonBlocking> {
    let path = log_file_path(std::env::var(LOG_FILE_VAR).ok());

    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty())
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create log directory {}: {err}", parent.display());
        return None;
    }

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_defaults_under_logs_dir() {
        assert_eq!(
            log_file_path(None),
            PathBuf::from("logs").join("filing-indexer.log")
        );
        assert_eq!(log_file_path(Some("  ".into())), log_file_path(None));
    }

    #[test]
    fn log_path_override_is_used_verbatim() {
        assert_eq!(
            log_file_path(Some("/var/log/indexer.log".into())),
            PathBuf::from("/var/log/indexer.log")
        );
    }
}
