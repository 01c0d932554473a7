//! Logging setup: console plus a daily-rotated JSON file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. Keep the returned guard alive for the
/// whole process or buffered file logs are lost.
pub fn init(log_dir: &Path) -> WorkerGuard {
    // Create log directory if it doesn't exist
    std::fs::create_dir_all(log_dir).unwrap_or_else(|e| {
        eprintln!("Warning: Could not create log directory {:?}: {}", log_dir, e);
    });

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "tenantdb-registry.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tenantdb_registry=debug")),
        )
        // Console output
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        // File output with JSON format for easy parsing
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking),
        )
        .init();

    guard
}
