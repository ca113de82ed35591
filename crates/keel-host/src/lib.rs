//! Keel Host - Extension host for line-of-business applications
//!
//! This crate provides the extension host which handles:
//! - Authorization of requested extensions against a policy store
//! - Scanning extension manifests for resource and permission markers
//! - Registering business-object resources idempotently
//! - Processing the host's own menu and menu-event markers at startup
//! - Launching each extension in its own destroyable runtime context
//! - Reacting to shutdown, locale and context-change lifecycle events

pub mod catalog;
pub mod config;
pub mod error;
pub mod host;
pub mod isolation;
pub mod lifecycle;
pub mod manifest;
pub mod objects;
pub mod policy;
pub mod process;
pub mod registrar;
pub mod scanner;
pub mod startup;

pub use catalog::{
    BlobStore, DirectoryBlobStore, DirectorySource, LoadedModule, MemoryBlobStore, ModuleCatalog,
    ModuleSource, StaticSource,
};
pub use config::HostConfig;
pub use error::{HostError, Result};
pub use host::{BootReport, ExtensionHost, HostServices};
pub use isolation::{ContextConfig, EntryPoint, ExtensionContext, LaunchedExtension};
pub use lifecycle::{
    EventOutcome, ExitStatus, ExtensionManager, HostApplication, HostEvent, LifecycleCoordinator,
    LifecycleState, LocaleService, Terminator,
};
pub use manifest::{DeclaredMethod, DeclaredType, ExtensionManifest, Marker};
pub use objects::{BusinessObject, ResourceKind};
pub use policy::{AllowList, PolicyStore};
pub use process::ProcessEntry;
pub use registrar::{Persistence, RegistrationReport};
pub use scanner::{ScanResult, scan};
pub use startup::{HostSurface, MenuBuilder, MenuEventDispatcher};
