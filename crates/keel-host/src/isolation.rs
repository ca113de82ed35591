//! Extension isolator
//!
//! Each launched extension gets its own [`IsolatedContext`]: a dedicated
//! tokio runtime with its own worker threads. Everything the extension spawns
//! lives on that runtime, so destroying the context tears all of it down as a
//! unit.
//!
//! Launching is fire-and-forget for the caller, but the returned
//! [`LaunchHandle`] is kept by the lifecycle coordinator so a teardown can
//! join or abort the launch before the runtime is destroyed.
//!
//! Context operations block the calling thread and must not be invoked from
//! inside an async runtime.

use crate::catalog::LoadedModule;
use crate::error::{HostError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Body of an extension, run inside its isolated context
#[async_trait]
pub trait EntryPoint: Send + Sync {
    async fn run(&self, ctx: ExtensionContext) -> anyhow::Result<()>;
}

/// Settings applied to every isolated context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Application name the extension runs under
    pub application_name: String,
    /// Base path for the extension's working directory
    pub base_path: PathBuf,
    /// Worker threads of the context runtime
    pub worker_threads: usize,
    /// How long a teardown waits for the extension to stop
    pub shutdown_grace: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            application_name: "keel".to_string(),
            base_path: PathBuf::from("."),
            worker_threads: 1,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// What an extension sees of its context
#[derive(Debug, Clone)]
pub struct ExtensionContext {
    extension: String,
    application_name: String,
    base_path: PathBuf,
    shutdown: watch::Receiver<bool>,
}

impl ExtensionContext {
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Whether the host has asked this context to stop
    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Wait until the host asks this context to stop
    pub async fn shutdown_requested(&mut self) {
        // A dropped sender means the context is gone, which is a stop as well.
        let _ = self.shutdown.wait_for(|stop| *stop).await;
    }
}

/// Handle to a launched extension
#[derive(Debug)]
pub struct LaunchHandle {
    extension: String,
    join: JoinHandle<anyhow::Result<()>>,
}

impl LaunchHandle {
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the launch at its next await point
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// How a launched extension ended during teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// Entry point returned successfully
    Completed,
    /// Entry point returned an error
    Failed(String),
    /// Entry point panicked
    Panicked,
    /// Entry point ignored the stop request and was aborted
    Aborted,
}

/// Destroyable boundary owning one extension's runtime
pub struct IsolatedContext {
    name: String,
    config: ContextConfig,
    runtime: Runtime,
    shutdown: watch::Sender<bool>,
}

impl IsolatedContext {
    /// Create a context with its own runtime
    pub fn create(name: &str, config: &ContextConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(format!("{}-{}", config.application_name, name))
            .enable_all()
            .build()
            .map_err(|source| HostError::ContextCreation {
                name: name.to_string(),
                source,
            })?;
        let (shutdown, _) = watch::channel(false);

        debug!("Created isolated context '{}'", name);
        Ok(Self {
            name: name.to_string(),
            config: config.clone(),
            runtime,
            shutdown,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start an entry point on the context runtime and return immediately
    pub fn run(&self, extension: &str, entry: Arc<dyn EntryPoint>) -> LaunchHandle {
        let ctx = ExtensionContext {
            extension: extension.to_string(),
            application_name: self.config.application_name.clone(),
            base_path: self.config.base_path.clone(),
            shutdown: self.shutdown.subscribe(),
        };

        let name = extension.to_string();
        let join = self.runtime.spawn(async move {
            info!("Extension started: {}", name);
            entry.run(ctx).await
        });

        LaunchHandle {
            extension: extension.to_string(),
            join,
        }
    }

    /// Stop the launch, then destroy the runtime and everything on it
    pub fn destroy(self, mut handle: LaunchHandle) -> TeardownOutcome {
        self.shutdown.send_replace(true);

        let grace = self.config.shutdown_grace;
        let joined = self
            .runtime
            .block_on(async { tokio::time::timeout(grace, &mut handle.join).await });

        let outcome = match joined {
            Ok(Ok(Ok(()))) => TeardownOutcome::Completed,
            Ok(Ok(Err(e))) => {
                warn!("Extension {} failed: {:#}", handle.extension, e);
                TeardownOutcome::Failed(e.to_string())
            }
            Ok(Err(e)) if e.is_panic() => {
                warn!("Extension {} panicked", handle.extension);
                TeardownOutcome::Panicked
            }
            Ok(Err(_)) => TeardownOutcome::Aborted,
            Err(_) => {
                warn!(
                    "Extension {} did not stop within {:?}, aborting",
                    handle.extension, grace
                );
                handle.abort();
                TeardownOutcome::Aborted
            }
        };

        self.runtime.shutdown_timeout(grace);
        info!("Destroyed isolated context '{}'", self.name);
        outcome
    }
}

/// An extension running in its own context
pub struct LaunchedExtension {
    context: IsolatedContext,
    handle: LaunchHandle,
}

impl LaunchedExtension {
    pub fn extension(&self) -> &str {
        self.handle.extension()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Tear the extension down, destroying its context
    pub fn teardown(self) -> TeardownOutcome {
        self.context.destroy(self.handle)
    }
}

/// Launch a module in a new isolated context
pub fn launch(module: &LoadedModule, config: &ContextConfig) -> Result<LaunchedExtension> {
    let entry = module
        .entry
        .clone()
        .ok_or_else(|| HostError::EntryPointNotFound(module.name().to_string()))?;

    let context = IsolatedContext::create(module.name(), config)?;
    let handle = context.run(module.name(), entry);
    Ok(LaunchedExtension { context, handle })
}
