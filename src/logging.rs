//! # Logging
//!
//! Console logging via `tracing-subscriber`, plus an optional daily rolling
//! log file via `tracing-appender`.

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// File name prefix for rolling log files
const LOG_FILE_PREFIX: &str = "gps-relay.log";

/// Default level from config; unknown names fall back to INFO
pub fn default_level(config: &LoggingConfig) -> Level {
    config.level.parse().unwrap_or(Level::INFO)
}

/// Filter for the subscriber
///
/// A non-empty, valid `RUST_LOG` replaces the configured level entirely;
/// otherwise everything at the configured level and above is enabled.
pub fn env_filter(config: &LoggingConfig, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(default_level(config).into()))
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer and must live until exit.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = env_filter(config, rust_log.as_deref());

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}
