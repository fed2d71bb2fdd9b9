//! # Logging Setup
//!
//! Structured logging with a console layer and a daily-rotating JSON
//! file layer. The filter honours `RUST_LOG` and falls back to `info`.

use std::env;

use anyhow::Result;
use tracing::info;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, prelude::*, EnvFilter};

/// Initialize logging for a monitor process.
///
/// Returns the worker guard for the non-blocking file writer; the
/// caller must keep it alive for the duration of the program or file
/// output stops flushing.
pub fn setup_logging(process_name: &str) -> Result<WorkerGuard> {
    // Get log level from environment variable or use default
    let log_level: String = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    // Get log directory from environment variable or use default
    let log_dir: String = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());

    // Create log directory if it doesn't exist
    std::fs::create_dir_all(&log_dir)?;

    // Configure file appender for rotating log files daily
    let file_appender = rolling::daily(&log_dir, process_name);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    // Create console layer for stdout
    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    // Create JSON-formatted file layer
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    // Create environment filter from log level
    let env_filter: EnvFilter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log_level))?;

    // Combine all layers
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized with level: {}", log_level);
    Ok(guard)
}
