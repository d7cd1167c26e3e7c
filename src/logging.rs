//! Tracing setup for the `onboard` binary
//!
//! Logs go to stderr unless `logging.to_file` is set, in which case each run
//! writes `<state>/logs/onboard-<timestamp>.log` and stderr stays clean for
//! command output.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Keeps the file writer alive; drop it last so buffered lines are flushed
pub struct LoggingHandle {
    pub _guard: Option<WorkerGuard>,
    /// Set when logging to a file
    pub log_file_path: Option<PathBuf>,
}

/// Filter directive: `--debug` wins over the configured level
pub fn log_level(config: &Config, debug_override: bool) -> String {
    if debug_override {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    }
}

pub fn log_file_name(started: DateTime<Utc>) -> String {
    format!("onboard-{}.log", started.format("%Y%m%dT%H%M%SZ"))
}

/// Install the global subscriber. `RUST_LOG` overrides the computed level.
pub fn init_logging(config: &Config, debug_override: bool) -> Result<LoggingHandle> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(config, debug_override)));

    let (writer, guard, log_file_path) = if config.logging.to_file {
        let logs_dir = config.logs_path();
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create log directory: {}", logs_dir.display()))?;

        let file_name = log_file_name(Utc::now());
        let (non_blocking, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(&logs_dir, &file_name));
        (
            BoxMakeWriter::new(non_blocking),
            Some(guard),
            Some(logs_dir.join(file_name)),
        )
    } else {
        (BoxMakeWriter::new(std::io::stderr), None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(log_file_path.is_none())
                .with_writer(writer),
        )
        .init();

    Ok(LoggingHandle {
        _guard: guard,
        log_file_path,
    })
}
