//! Run command: boot the host and drive it from stdin
//!
//! Each stdin line names one lifecycle event. Lines naming a menu
//! (`menu <id>`) print the bound handler. End of input is a shutdown.

use super::start_session;
use anyhow::{Context, Result};
use keel::adapters::{
    DeferredExit, JsonFileStore, LoggingMenus, MenuEventTable, StdinApplication, ThreadLocale,
};
use keel::surface::{MENU_RELOAD, host_surface};
use keel_host::catalog::DirectorySource;
use keel_host::host::{ExtensionHost, HostServices};
use keel_host::lifecycle::{EventOutcome, ExitStatus, HostEvent, LifecycleCoordinator};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// Run the host until shutdown
pub fn run_host(config: Option<PathBuf>, verbose: bool) -> Result<ExitCode> {
    let session = start_session(config, verbose)?;
    let config = &session.config;

    let store = JsonFileStore::open(&config.store.path)?;
    let dispatcher = Arc::new(MenuEventTable::new());
    let application = Arc::new(StdinApplication::new());
    let exit = Arc::new(DeferredExit::new());

    let services = HostServices {
        policy: Arc::new(config.policy.clone()),
        persistence: Arc::new(store),
        dispatcher: dispatcher.clone(),
        menus: Arc::new(LoggingMenus),
    };
    let host = ExtensionHost::new(
        Arc::new(DirectorySource::new(&config.host.extensions_dir)),
        host_surface(),
        services,
        config.context_config(),
    )
    .with_requested(config.host.extensions.clone());

    let mut coordinator =
        LifecycleCoordinator::new(host, Arc::new(ThreadLocale::new()), application.clone())
            .with_terminator(exit.clone());
    let report = coordinator.boot().context("Failed to boot extension host")?;
    info!(
        "Host {} running with {} extensions",
        config.host.application_name,
        report.launched.len()
    );

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read lifecycle events from stdin")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event = if let Some(menu_id) = line.strip_prefix("menu ") {
            let menu_id = menu_id.trim();
            match dispatcher.handler_for(menu_id) {
                Some(handler) => println!("{} -> {}", menu_id, handler),
                None => println!("{} -> (unbound)", menu_id),
            }
            if menu_id != MENU_RELOAD {
                continue;
            }
            HostEvent::ContextChanged
        } else {
            match line.parse::<HostEvent>() {
                Ok(event) => event,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            }
        };

        match coordinator.on_event(event) {
            EventOutcome::Continue => {}
            EventOutcome::Shutdown => break,
            EventOutcome::Terminated(status) => return Ok(exit_code(status)),
        }
        if application.should_exit() {
            break;
        }
    }

    if !application.should_exit() {
        info!("Input closed, shutting down");
        if let EventOutcome::Terminated(status) = coordinator.on_event(HostEvent::ShutDown) {
            return Ok(exit_code(status));
        }
    }
    Ok(exit.status().map(exit_code).unwrap_or(ExitCode::SUCCESS))
}

fn exit_code(status: ExitStatus) -> ExitCode {
    ExitCode::from(status.code() as u8)
}
