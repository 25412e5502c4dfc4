//! Tracing configuration and log routing.
//!
//! Diagnostics go to stderr so that stdout carries only the rendered outline or answer. A file
//! copy is appended to `RUSTY_DIGEST_LOG_FILE` when set, otherwise to `logs/rusty-digest.log`.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "RUSTY_DIGEST_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "rusty-digest.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for stderr and file logging.
///
/// Respects `RUST_LOG` for filtering and falls back to `default_level` when it is unset.
pub fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    if let Some(writer) = configure_file_writer() {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}

/// Non-blocking writer for the log file, or `None` when it cannot be opened.
fn configure_file_writer() -> Option<NonBlocking> {
    let (non_blocking, guard) = match std::env::var(LOG_FILE_VAR) {
        Ok(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| eprintln!("Failed to open log file {path}: {err}"))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        Err(_) => {
            if let Err(err) = std::fs::create_dir_all(DEFAULT_LOG_DIR) {
                eprintln!("Failed to create {DEFAULT_LOG_DIR} directory: {err}");
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::never(
                DEFAULT_LOG_DIR,
                DEFAULT_LOG_FILE,
            ))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
