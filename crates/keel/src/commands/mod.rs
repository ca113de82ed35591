//! Command implementations for the keel CLI

pub mod list;
pub mod run;
pub mod scan;

pub use list::run_list;
pub use run::run_host;
pub use scan::run_scan;

use anyhow::{Context, Result};
use keel_host::config::{CONFIG_FILE, HostConfig};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

/// Configuration plus the logging guard that must outlive the command
pub struct Session {
    pub config: HostConfig,
    _guard: Option<WorkerGuard>,
}

/// Load configuration and initialize logging
///
/// An explicit path must exist; without one, `./keel.toml` is used when
/// present and defaults otherwise.
pub fn start_session(config: Option<PathBuf>, verbose: bool) -> Result<Session> {
    let config = match config {
        Some(path) => HostConfig::load(&path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None if Path::new(CONFIG_FILE).exists() => HostConfig::load(Path::new(CONFIG_FILE))
            .context("Failed to load ./keel.toml")?,
        None => HostConfig::default(),
    };

    let guard = keel::logging::init(&config.logging, verbose)?;
    Ok(Session {
        config,
        _guard: guard,
    })
}
