//! Scan command: show what an extension declares

use super::start_session;
use anyhow::{Context, Result};
use keel_host::catalog::{DirectorySource, ModuleSource};
use keel_host::scanner::scan;
use std::path::PathBuf;
use std::process::ExitCode;

/// Print the classified descriptors of one extension as JSON
pub fn run_scan(config: Option<PathBuf>, verbose: bool, extension: String) -> Result<ExitCode> {
    let session = start_session(config, verbose)?;
    let catalog = DirectorySource::new(&session.config.host.extensions_dir).load()?;

    let result = scan(&catalog, &extension)?;
    let json = serde_json::to_string_pretty(&result).context("Failed to serialize scan result")?;
    println!("{}", json);
    Ok(ExitCode::SUCCESS)
}
