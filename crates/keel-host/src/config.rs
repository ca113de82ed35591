//! Configuration
//!
//! Handles loading of the `keel.toml` host configuration.

use crate::error::{HostError, Result};
use crate::isolation::ContextConfig;
use crate::policy::AllowList;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name
pub const CONFIG_FILE: &str = "keel.toml";

/// Root configuration from keel.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostConfig {
    /// Host and isolation settings
    #[serde(default)]
    pub host: HostSection,

    /// Authorization policy
    #[serde(default)]
    pub policy: AllowList,

    /// Resource store
    #[serde(default)]
    pub store: StoreSection,

    /// Logging
    #[serde(default)]
    pub logging: LoggingSection,
}

/// [host] section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostSection {
    /// Application name extensions run under
    #[serde(default = "default_application_name")]
    pub application_name: String,
    /// Base path for extension working directories
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    /// Directory holding one sub-directory per extension module
    #[serde(default = "default_extensions_dir")]
    pub extensions_dir: PathBuf,
    /// Requested extensions; empty means every installed module
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Worker threads per isolated context
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Grace period for extensions to stop on teardown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_application_name() -> String {
    "keel".to_string()
}

fn default_base_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_extensions_dir() -> PathBuf {
    PathBuf::from("extensions")
}

fn default_worker_threads() -> usize {
    1
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            base_path: default_base_path(),
            extensions_dir: default_extensions_dir(),
            extensions: Vec::new(),
            worker_threads: default_worker_threads(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// [store] section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreSection {
    /// JSON file holding persisted resources and permissions
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("keel-store.json")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// [logging] section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingSection {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Write daily-rolling log files here in addition to stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            directory: None,
        }
    }
}

impl HostConfig {
    /// Load configuration from a file path
    ///
    /// Relative paths in the file resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HostError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: HostConfig = toml::from_str(&content)?;
        config.validate()?;

        let root = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(root);
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.host.application_name.trim().is_empty() {
            return Err(HostError::Config(
                "host.application-name must not be empty".to_string(),
            ));
        }
        if self.host.worker_threads == 0 {
            return Err(HostError::Config(
                "host.worker-threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, root: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        resolve(&mut self.host.base_path);
        resolve(&mut self.host.extensions_dir);
        resolve(&mut self.store.path);
        if let Some(dir) = self.logging.directory.as_mut() {
            resolve(dir);
        }
    }

    /// Settings for every isolated context
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            application_name: self.host.application_name.clone(),
            base_path: self.host.base_path.clone(),
            worker_threads: self.host.worker_threads,
            shutdown_grace: Duration::from_millis(self.host.shutdown_grace_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyStore;

    #[test]
    fn test_load_toml() -> anyhow::Result<()> {
        let toml_content = r#"
[host]
application-name = "erp-addons"
extensions-dir = "addons"
extensions = ["sales", "stock"]
shutdown-grace-ms = 250

[policy]
authorized = ["sales"]

[logging]
level = "debug"
format = "json"
directory = "logs"
"#;
        let dir = tempfile::tempdir()?;
        let file_path = dir.path().join(CONFIG_FILE);
        std::fs::write(&file_path, toml_content)?;

        let config = HostConfig::load(&file_path)?;
        assert_eq!(config.host.application_name, "erp-addons");
        assert_eq!(config.host.extensions, vec!["sales", "stock"]);
        assert_eq!(config.host.extensions_dir, dir.path().join("addons"));
        assert_eq!(config.store.path, dir.path().join("keel-store.json"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.directory, Some(dir.path().join("logs")));
        assert!(config.policy.is_authorized("sales"));
        assert!(!config.policy.is_authorized("stock"));

        let context = config.context_config();
        assert_eq!(context.shutdown_grace, Duration::from_millis(250));
        assert_eq!(context.worker_threads, 1);
        Ok(())
    }

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file_path = dir.path().join(CONFIG_FILE);
        std::fs::write(&file_path, "")?;

        let config = HostConfig::load(&file_path)?;
        assert_eq!(config.host.application_name, "keel");
        assert!(config.host.extensions.is_empty());
        assert!(!config.policy.allow_all);
        assert_eq!(config.logging.level, "info");
        Ok(())
    }

    #[test]
    fn test_rejects_zero_workers() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file_path = dir.path().join(CONFIG_FILE);
        std::fs::write(&file_path, "[host]\nworker-threads = 0\n")?;

        assert!(matches!(
            HostConfig::load(&file_path),
            Err(HostError::Config(_))
        ));
        Ok(())
    }
}
