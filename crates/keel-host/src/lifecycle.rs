//! Lifecycle event coordinator
//!
//! Reacts to host lifecycle events by shutting the extension host down,
//! reconfiguring locale, or rebooting it. The coordinator is the only owner
//! of the launched extensions and of the lifecycle state.
//!
//! Every transition touching extension state destroys whole contexts rather
//! than unloading extensions piecemeal. Failures while shutting down or
//! rebooting are fatal and terminate the process with a distinct status.

use crate::error::{HostError, Result};
use crate::host::{BootReport, ExtensionHost};
use crate::isolation::LaunchedExtension;
use anyhow::{Context, anyhow};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::Thread;
use tracing::{debug, error, info};

/// Process-wide lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Running,
    ShuttingDown,
    Rebooting,
}

impl LifecycleState {
    /// Whether new extension launches are accepted
    pub fn accepts_launches(self) -> bool {
        matches!(self, Self::Running | Self::Rebooting)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::ShuttingDown => "shutting down",
            Self::Rebooting => "rebooting",
        })
    }
}

/// Lifecycle event delivered by the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostEvent {
    Terminate,
    LocaleChanged,
    ContextChanged,
    ShutDown,
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Terminate => "terminate",
            Self::LocaleChanged => "locale-changed",
            Self::ContextChanged => "context-changed",
            Self::ShutDown => "shutdown",
        })
    }
}

impl FromStr for HostEvent {
    type Err = HostError;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "terminate" => Ok(Self::Terminate),
            "locale-changed" => Ok(Self::LocaleChanged),
            "context-changed" => Ok(Self::ContextChanged),
            "shutdown" | "shut-down" => Ok(Self::ShutDown),
            _ => Err(HostError::Config(format!(
                "Unknown lifecycle event: {}",
                value.trim()
            ))),
        }
    }
}

/// Fatal exit statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// A reboot step failed
    RebootFailure,
    /// Any other failure while handling an event
    EventHandlerFailure,
}

impl ExitStatus {
    pub const fn code(self) -> i32 {
        match self {
            Self::RebootFailure => 10,
            Self::EventHandlerFailure => 20,
        }
    }
}

/// Result of delivering one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The host keeps running
    Continue,
    /// The host shut down; the UI loop was asked to exit
    Shutdown,
    /// A fatal failure; the process was asked to terminate
    Terminated(ExitStatus),
}

/// Optional collaborator managing extensions from the outside
pub trait ExtensionManager: Send + Sync {
    fn shutdown_all_extensions(&self) -> anyhow::Result<()>;
    fn configure_extensions_locale(&self) -> anyhow::Result<()>;
}

/// Localization collaborator
pub trait LocaleService: Send + Sync {
    fn configure_execution_unit_locale(&self, unit: &Thread) -> anyhow::Result<()>;
}

/// Host application owning the UI loop
pub trait HostApplication: Send + Sync {
    fn exit_ui_loop(&self) -> anyhow::Result<()>;
}

/// Process termination
pub trait Terminator: Send + Sync {
    fn terminate(&self, status: ExitStatus);
}

/// Terminates the current process with the status code
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, status: ExitStatus) {
        std::process::exit(status.code());
    }
}

/// Owns lifecycle state and launched extensions, and handles host events
pub struct LifecycleCoordinator {
    host: ExtensionHost,
    state: LifecycleState,
    launched: Vec<LaunchedExtension>,
    manager: Option<Arc<dyn ExtensionManager>>,
    locale: Arc<dyn LocaleService>,
    application: Arc<dyn HostApplication>,
    terminator: Arc<dyn Terminator>,
}

impl LifecycleCoordinator {
    pub fn new(
        host: ExtensionHost,
        locale: Arc<dyn LocaleService>,
        application: Arc<dyn HostApplication>,
    ) -> Self {
        Self {
            host,
            state: LifecycleState::Running,
            launched: Vec::new(),
            manager: None,
            locale,
            application,
            terminator: Arc::new(ProcessTerminator),
        }
    }

    pub fn with_extension_manager(mut self, manager: Arc<dyn ExtensionManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Identifiers of the extensions currently launched
    pub fn launched_extensions(&self) -> Vec<&str> {
        self.launched.iter().map(|l| l.extension()).collect()
    }

    /// Run the boot sequence and keep the launched extensions
    pub fn boot(&mut self) -> Result<BootReport> {
        info!("Booting extension host ({})", self.state);
        let (launched, report) = self.host.boot(self.state)?;
        self.launched.extend(launched);
        Ok(report)
    }

    /// Handle one lifecycle event on the calling thread
    ///
    /// Fatal failures are reported to the terminator before returning.
    pub fn on_event(&mut self, event: HostEvent) -> EventOutcome {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.handle_event(event))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                error!(
                    fatal = true,
                    "Panic while handling {}: {}",
                    event,
                    panic_message(payload.as_ref())
                );
                EventOutcome::Terminated(ExitStatus::EventHandlerFailure)
            }
        };

        if let EventOutcome::Terminated(status) = outcome {
            error!(
                "Terminating with status {} after {} failed",
                status.code(),
                event
            );
            self.terminator.terminate(status);
        }
        outcome
    }

    fn handle_event(&mut self, event: HostEvent) -> EventOutcome {
        debug!("Received lifecycle event {} while {}", event, self.state);

        match event {
            HostEvent::Terminate | HostEvent::ShutDown => match guarded(|| self.shutdown()) {
                Ok(()) => EventOutcome::Shutdown,
                Err(e) => {
                    error!("Failed to shut down: {:#}", e);
                    EventOutcome::Terminated(ExitStatus::EventHandlerFailure)
                }
            },
            _ if self.state == LifecycleState::ShuttingDown => {
                debug!("Ignoring {} after shutdown", event);
                EventOutcome::Shutdown
            }
            HostEvent::LocaleChanged => {
                if let Err(e) = guarded(|| self.configure_locale()) {
                    error!("Failed to apply locale change: {:#}", e);
                }
                EventOutcome::Continue
            }
            HostEvent::ContextChanged => match guarded(|| self.reboot()) {
                Ok(()) => EventOutcome::Continue,
                Err(e) => {
                    error!(fatal = true, "Failed to reboot extension host: {:#}", e);
                    EventOutcome::Terminated(ExitStatus::RebootFailure)
                }
            },
        }
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        info!("Shutting down extension host");
        self.state = LifecycleState::ShuttingDown;
        self.shutdown_extensions()?;
        self.application
            .exit_ui_loop()
            .context("Failed to exit host UI loop")
    }

    fn configure_locale(&mut self) -> anyhow::Result<()> {
        if let Some(manager) = &self.manager {
            manager
                .configure_extensions_locale()
                .context("Failed to configure extensions locale")?;
        }
        self.locale
            .configure_execution_unit_locale(&std::thread::current())
            .context("Failed to configure execution unit locale")
    }

    fn reboot(&mut self) -> anyhow::Result<()> {
        info!("Restarting extension host v{}", env!("CARGO_PKG_VERSION"));
        self.state = LifecycleState::Rebooting;
        self.shutdown_extensions()?;

        let (launched, report) = self.host.boot(self.state)?;
        self.launched = launched;
        self.state = LifecycleState::Running;
        info!(
            "Extension host restarted with {} extensions",
            report.launched.len()
        );
        Ok(())
    }

    /// Ask the manager to stop extensions, then destroy every context
    fn shutdown_extensions(&mut self) -> anyhow::Result<()> {
        if let Some(manager) = &self.manager {
            manager
                .shutdown_all_extensions()
                .context("Failed to shut down extensions")?;
        }

        for launched in self.launched.drain(..) {
            let extension = launched.extension().to_string();
            let outcome = launched.teardown();
            debug!("Extension {} torn down: {:?}", extension, outcome);
        }
        Ok(())
    }
}

fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
