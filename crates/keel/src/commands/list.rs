//! List command: installed extensions and their authorization

use super::start_session;
use anyhow::Result;
use keel_host::catalog::{DirectorySource, ModuleSource};
use keel_host::policy::PolicyStore;
use std::path::PathBuf;
use std::process::ExitCode;

pub fn run_list(config: Option<PathBuf>, verbose: bool) -> Result<ExitCode> {
    let session = start_session(config, verbose)?;
    let config = &session.config;
    let catalog = DirectorySource::new(&config.host.extensions_dir).load()?;

    if catalog.is_empty() {
        println!(
            "No extensions installed in {}",
            config.host.extensions_dir.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!("Installed extensions:");
    for name in catalog.names() {
        let Some(module) = catalog.resolve(&name) else {
            continue;
        };
        let manifest = &module.manifest;
        let status = if config.policy.is_authorized(&name) {
            "authorized"
        } else {
            "not authorized"
        };
        println!(
            "  {} v{} [{}]",
            name,
            manifest.version.as_deref().unwrap_or("unknown"),
            status
        );
        if let Some(desc) = &manifest.description {
            println!("    {}", desc);
        }
    }
    Ok(ExitCode::SUCCESS)
}
