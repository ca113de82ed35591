//! Tracing subscriber setup

use anyhow::Context;
use keel_host::config::{LogFormat, LoggingSection};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log file name prefix inside the logging directory
pub const LOG_FILE_PREFIX: &str = "keel.log";

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// flushes the file writer and must be held until exit.
pub fn init(logging: &LoggingSection, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let pretty = (logging.format == LogFormat::Pretty)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let json = (logging.format == LogFormat::Json)
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));

    let (file, guard) = match &logging.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory {}", directory.display())
            })?;
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
