//! Error types for the extension host

use crate::lifecycle::LifecycleState;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors that can occur while loading, registering or running extensions
#[derive(Debug, Error)]
pub enum HostError {
    /// The extension is not among the currently loaded modules
    #[error("Extension module not found: {0}")]
    ModuleNotFound(String),

    /// A resource blob could not be opened from the module's blob store
    #[error("Failed to open resource '{resource}': {source}")]
    BlobOpen {
        resource: String,
        #[source]
        source: std::io::Error,
    },

    /// A resource blob could not be deserialized into its schema type
    #[error("Failed to decode resource '{resource}': {message}")]
    BlobDecode { resource: String, message: String },

    /// Blob names must stay inside the module's resource store
    #[error("Invalid resource name: {0}")]
    InvalidBlobName(String),

    /// The persistence collaborator rejected an object
    #[error("Failed to persist {kind} '{key}': {source}")]
    Persistence {
        kind: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Isolated execution context could not be created
    #[error("Failed to create execution context '{name}': {source}")]
    ContextCreation {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The module declares no entry point to launch
    #[error("Entry point not found for extension: {0}")]
    EntryPointNotFound(String),

    /// Launches are only accepted while the host is running or rebooting
    #[error("Launch of '{extension}' rejected while host is {state}")]
    LaunchRejected {
        extension: String,
        state: LifecycleState,
    },

    /// Manifest errors
    #[error("Invalid manifest in {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
