//! Boot sequence and load pass
//!
//! A load pass takes the requested extension identifiers through the
//! permission filter, then scans, registers and launches each authorized
//! extension in turn. Scanning and registration run to completion on the
//! caller's thread before the extension is launched.

use crate::catalog::{ModuleCatalog, ModuleSource};
use crate::error::{HostError, Result};
use crate::isolation::{ContextConfig, LaunchedExtension, launch};
use crate::lifecycle::LifecycleState;
use crate::policy::{PolicyStore, filter_authorized};
use crate::registrar::{Persistence, RegistrationReport, register_all};
use crate::scanner;
use crate::startup::{
    HostSurface, MenuBuilder, MenuEventDispatcher, StartupReport, process_host_startup,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Collaborators the host consumes
#[derive(Clone)]
pub struct HostServices {
    pub policy: Arc<dyn PolicyStore>,
    pub persistence: Arc<dyn Persistence>,
    pub dispatcher: Arc<dyn MenuEventDispatcher>,
    pub menus: Arc<dyn MenuBuilder>,
}

/// What one boot did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    pub startup: StartupReport,
    /// Identifiers that passed the permission filter, in request order
    pub authorized: Vec<String>,
    /// Identifiers launched into their own context
    pub launched: Vec<String>,
    /// Authorized identifiers with no loaded module
    pub not_found: Vec<String>,
    /// Registration outcome per extension
    pub registrations: Vec<(String, RegistrationReport)>,
    /// Launches that failed or were rejected, with the reason
    pub launch_failures: Vec<(String, String)>,
}

/// Drives the boot sequence over a module source
pub struct ExtensionHost {
    source: Arc<dyn ModuleSource>,
    surface: HostSurface,
    services: HostServices,
    context: ContextConfig,
    requested: Vec<String>,
}

impl ExtensionHost {
    pub fn new(
        source: Arc<dyn ModuleSource>,
        surface: HostSurface,
        services: HostServices,
        context: ContextConfig,
    ) -> Self {
        Self {
            source,
            surface,
            services,
            context,
            requested: Vec::new(),
        }
    }

    /// Restrict boots to these identifiers; empty means every loaded module
    pub fn with_requested(mut self, requested: Vec<String>) -> Self {
        self.requested = requested;
        self
    }

    pub fn context_config(&self) -> &ContextConfig {
        &self.context
    }

    /// Load the catalog, process host startup markers, then run a load pass
    pub fn boot(&self, state: LifecycleState) -> Result<(Vec<LaunchedExtension>, BootReport)> {
        let catalog = self.source.load()?;
        let startup = process_host_startup(
            &self.surface,
            self.services.dispatcher.as_ref(),
            self.services.menus.as_ref(),
        );

        let requested = if self.requested.is_empty() {
            catalog.names()
        } else {
            self.requested.clone()
        };

        let (launched, mut report) = self.load_extensions(&catalog, &requested, state);
        report.startup = startup;
        Ok((launched, report))
    }

    /// Authorize, scan, register and launch the requested extensions
    pub fn load_extensions(
        &self,
        catalog: &ModuleCatalog,
        requested: &[String],
        state: LifecycleState,
    ) -> (Vec<LaunchedExtension>, BootReport) {
        let mut report = BootReport {
            authorized: filter_authorized(self.services.policy.as_ref(), requested),
            ..Default::default()
        };
        let mut launched = Vec::new();

        for extension in report.authorized.clone() {
            info!("Configuring extension: {}", extension);

            let Some(module) = catalog.resolve(&extension) else {
                error!(
                    "Skipping extension {}: {}",
                    extension,
                    HostError::ModuleNotFound(extension.clone())
                );
                report.not_found.push(extension);
                continue;
            };
            let scan = scanner::scan_module(&module);

            let registration = register_all(
                self.services.persistence.as_ref(),
                module.blobs.as_ref(),
                &scan,
            );
            report.registrations.push((extension.clone(), registration));

            if !state.accepts_launches() {
                let e = HostError::LaunchRejected {
                    extension: extension.clone(),
                    state,
                };
                warn!("{}", e);
                report.launch_failures.push((extension, e.to_string()));
                continue;
            }

            match launch(&module, &self.context) {
                Ok(running) => {
                    report.launched.push(extension);
                    launched.push(running);
                }
                Err(e) => {
                    error!("Failed to launch extension {}: {}", extension, e);
                    report.launch_failures.push((extension, e.to_string()));
                }
            }
        }

        info!(
            "Load pass finished: {} launched, {} not found, {} launch failures",
            report.launched.len(),
            report.not_found.len(),
            report.launch_failures.len()
        );
        (launched, report)
    }
}
