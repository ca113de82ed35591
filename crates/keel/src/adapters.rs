//! Collaborator adapters for the command-line host
//!
//! These back the host's collaborator traits with a JSON file, the log, and
//! process state.

use anyhow::{Context, Result};
use keel_host::lifecycle::{ExitStatus, HostApplication, LocaleService, Terminator};
use keel_host::manifest::PermissionMarker;
use keel_host::objects::BusinessObject;
use keel_host::registrar::Persistence;
use keel_host::scanner::PermissionDescriptor;
use keel_host::startup::{MenuBuilder, MenuDescriptor, MenuEventDescriptor, MenuEventDispatcher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::Thread;
use tracing::{debug, error, info};

/// On-disk layout of the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoreData {
    /// Business objects keyed by `<kind>:<key>`
    #[serde(default)]
    objects: BTreeMap<String, BusinessObject>,
    /// Permission entries keyed by id
    #[serde(default)]
    permissions: BTreeMap<String, PermissionMarker>,
}

/// Persistence over a single JSON file
///
/// The whole store is rewritten after every change; unchanged writes are
/// skipped.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    /// Open the store, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse store {}", path.display()))?
        } else {
            StoreData::default()
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored object for a kind and key
    pub fn get(&self, kind: &str, key: &str) -> Option<BusinessObject> {
        self.lock().objects.get(&format!("{}:{}", kind, key)).cloned()
    }

    /// Stored permission entry
    pub fn permission(&self, id: &str) -> Option<PermissionMarker> {
        self.lock().permissions.get(id).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreData> {
        // A panic mid-update leaves the map itself consistent.
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply a change and persist it
    ///
    /// Memory is only updated after the file has been replaced.
    fn update(&self, change: impl FnOnce(&mut StoreData) -> bool) -> Result<()> {
        let mut data = self.lock();
        let mut next = data.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.write(&next)?;
        *data = next;
        Ok(())
    }

    fn write(&self, data: &StoreData) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).context("Failed to create store directory")?;

        let content = serde_json::to_string_pretty(data).context("Failed to serialize store")?;
        let mut file = tempfile::NamedTempFile::new_in(dir)
            .context("Failed to create temporary store file")?;
        file.write_all(content.as_bytes())
            .context("Failed to write temporary store file")?;
        file.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write store {}", self.path.display()))?;
        Ok(())
    }
}

fn object_key(object: &BusinessObject) -> String {
    format!("{}:{}", object.kind(), object.key())
}

impl Persistence for JsonFileStore {
    fn save_if_absent(&self, object: &BusinessObject) -> Result<()> {
        let key = object_key(object);
        self.update(|data| {
            if data.objects.contains_key(&key) {
                debug!("Already present, keeping: {}", key);
                return false;
            }
            data.objects.insert(key, object.clone());
            true
        })
    }

    fn update_or_save_if_absent(&self, object: &BusinessObject) -> Result<()> {
        let key = object_key(object);
        self.update(|data| {
            if data.objects.get(&key) == Some(object) {
                return false;
            }
            data.objects.insert(key, object.clone());
            true
        })
    }

    fn update_or_save_permission_if_absent(&self, descriptor: &PermissionDescriptor) -> Result<()> {
        let permission = &descriptor.permission;
        self.update(|data| {
            if data.permissions.get(&permission.id) == Some(permission) {
                return false;
            }
            data.permissions
                .insert(permission.id.clone(), permission.clone());
            true
        })
    }
}

/// UI collaborator that logs the menu batch
#[derive(Debug, Default)]
pub struct LoggingMenus;

impl MenuBuilder for LoggingMenus {
    fn process_menus(&self, menus: Vec<MenuDescriptor>) -> Result<()> {
        for descriptor in &menus {
            let menu = &descriptor.menu;
            info!(
                menu = %menu.id,
                parent = menu.parent_id.as_deref().unwrap_or("-"),
                "Menu '{}' from {}", menu.title, descriptor.origin_type
            );
        }
        Ok(())
    }
}

/// Dispatcher keeping menu-event bindings in a table
#[derive(Debug, Default)]
pub struct MenuEventTable {
    bindings: Mutex<BTreeMap<String, MenuEventDescriptor>>,
}

impl MenuEventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler bound to a menu identifier
    pub fn handler_for(&self, menu_id: &str) -> Option<String> {
        self.bindings
            .lock()
            .ok()?
            .get(menu_id)
            .and_then(|d| d.handler().map(str::to_string))
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MenuEventDispatcher for MenuEventTable {
    fn register_menu_event(&self, descriptor: MenuEventDescriptor) -> Result<()> {
        let mut bindings = self
            .bindings
            .lock()
            .map_err(|_| anyhow::anyhow!("Menu event table poisoned"))?;
        debug!(
            "Binding menu event {} to {:?}",
            descriptor.event.menu_id,
            descriptor.handler()
        );
        bindings.insert(descriptor.event.menu_id.clone(), descriptor);
        Ok(())
    }
}

/// Locale collaborator reading the process locale from the environment
#[derive(Debug, Default)]
pub struct ThreadLocale {
    current: Mutex<Option<String>>,
}

impl ThreadLocale {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locale applied by the last reconfiguration
    pub fn current(&self) -> Option<String> {
        self.current.lock().ok()?.clone()
    }
}

/// Locale from `LC_ALL`, then `LANG`, else `C`
pub fn environment_locale() -> String {
    ["LC_ALL", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| "C".to_string())
}

impl LocaleService for ThreadLocale {
    fn configure_execution_unit_locale(&self, unit: &Thread) -> Result<()> {
        let locale = environment_locale();
        info!(
            "Locale {} applied to thread {}",
            locale,
            unit.name().unwrap_or("unnamed")
        );
        *self
            .current
            .lock()
            .map_err(|_| anyhow::anyhow!("Locale state poisoned"))? = Some(locale);
        Ok(())
    }
}

/// UI loop stand-in: the stdin event loop polls this flag
#[derive(Debug, Default)]
pub struct StdinApplication {
    exit: AtomicBool,
}

impl StdinApplication {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_exit(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }
}

impl HostApplication for StdinApplication {
    fn exit_ui_loop(&self) -> Result<()> {
        self.exit.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Terminator that records the fatal status instead of exiting
///
/// The run loop reads the status back and returns it from `main`, so
/// destructors run and buffered logs are flushed.
#[derive(Debug, Default)]
pub struct DeferredExit {
    status: Mutex<Option<ExitStatus>>,
}

impl DeferredExit {
    pub fn new() -> Self {
        Self::default()
    }

    /// First fatal status recorded, if any
    pub fn status(&self) -> Option<ExitStatus> {
        *self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Terminator for DeferredExit {
    fn terminate(&self, status: ExitStatus) {
        error!("Host requested exit with status {}", status.code());
        let mut recorded = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        recorded.get_or_insert(status);
    }
}
