//! File logging for mixlite hosts
//!
//! Writes to `$XDG_STATE_HOME/mixlite/mixlite.log.<date>`. mixlite's own
//! targets log at the configured level; dependencies (reqwest, hyper,
//! rusqlite) are held at `warn` so request plumbing does not drown the
//! delivery trail. `RUST_LOG` replaces the whole filter.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_PREFIX: &str = "mixlite.log";

/// Keeps the non-blocking writer alive; dropping it flushes pending lines.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Install the global subscriber with a daily-rotating file layer.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(&config.level)?)
            .map_err(|e| Error::Config(format!("invalid log filter: {}", e)))?,
    };

    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {}", e)))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        max_files = config.max_files,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Filter directives for a configured level name such as `debug`.
pub fn filter_directives(level: &str) -> Result<String> {
    let level: Level = level
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("unknown log level '{}'", level)))?;
    let level = level.as_str().to_ascii_lowercase();
    Ok(format!("warn,mixlite={level},mixlite_core={level}"))
}
