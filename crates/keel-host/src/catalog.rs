//! Module catalog
//!
//! The catalog is the set of currently loaded modules an extension identifier
//! can resolve to. A [`ModuleSource`] produces a fresh catalog on every boot.

use crate::error::{HostError, Result};
use crate::isolation::EntryPoint;
use crate::manifest::ExtensionManifest;
use crate::process::ProcessEntry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Manifest file name inside a module directory
pub const MANIFEST_FILE: &str = "extension.toml";

/// Blob directory inside a module directory
pub const RESOURCES_DIR: &str = "resources";

/// Embedded store holding a module's resource blobs
pub trait BlobStore: Send + Sync {
    /// Open a blob for reading; the reader is released when dropped
    fn open(&self, name: &str) -> Result<Box<dyn Read + Send>>;
}

/// Blob store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Arc<[u8]>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a blob
    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        self.blobs.insert(name.into(), Arc::from(bytes));
    }

    /// Builder-style variant of [`insert`](Self::insert)
    pub fn with_blob(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl BlobStore for MemoryBlobStore {
    fn open(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let bytes = self.blobs.get(name).ok_or_else(|| HostError::BlobOpen {
            resource: name.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such blob"),
        })?;
        Ok(Box::new(Cursor::new(bytes.clone())))
    }
}

/// Blob store backed by a module's `resources/` directory
#[derive(Debug, Clone)]
pub struct DirectoryBlobStore {
    root: PathBuf,
}

impl DirectoryBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a blob name to a path under the store root
    ///
    /// Returns an error for absolute names or names climbing out of the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(HostError::InvalidBlobName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for DirectoryBlobStore {
    fn open(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.resolve(name)?;
        let file = std::fs::File::open(&path).map_err(|source| HostError::BlobOpen {
            resource: name.to_string(),
            source,
        })?;
        Ok(Box::new(file))
    }
}

/// A module available for scanning and launch
pub struct LoadedModule {
    /// Declared capabilities
    pub manifest: ExtensionManifest,
    /// Embedded resource blobs
    pub blobs: Arc<dyn BlobStore>,
    /// Entry point run inside the isolated context
    pub entry: Option<Arc<dyn EntryPoint>>,
}

impl LoadedModule {
    pub fn new(manifest: ExtensionManifest, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            manifest,
            blobs,
            entry: None,
        }
    }

    pub fn with_entry(mut self, entry: Arc<dyn EntryPoint>) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.manifest.name)
            .field("types", &self.manifest.types.len())
            .field("has_entry", &self.entry.is_some())
            .finish()
    }
}

/// Currently loaded modules by extension identifier
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, Arc<LoadedModule>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, replacing any module with the same name
    pub fn insert(&mut self, module: LoadedModule) {
        self.modules
            .insert(module.name().to_string(), Arc::new(module));
    }

    pub fn with_module(mut self, module: LoadedModule) -> Self {
        self.insert(module);
        self
    }

    /// Resolve an extension identifier to its module
    pub fn resolve(&self, extension: &str) -> Option<Arc<LoadedModule>> {
        self.modules.get(extension).cloned()
    }

    /// Names of every module, sorted
    pub fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Producer of the module catalog, consulted on every boot
pub trait ModuleSource: Send + Sync {
    fn load(&self) -> Result<ModuleCatalog>;
}

/// Catalog registered in code
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    catalog: ModuleCatalog,
}

impl StaticSource {
    pub fn new(catalog: ModuleCatalog) -> Self {
        Self { catalog }
    }
}

impl ModuleSource for StaticSource {
    fn load(&self) -> Result<ModuleCatalog> {
        Ok(self.catalog.clone())
    }
}

/// Catalog read from a directory of module directories
///
/// Each module lives in `<dir>/<name>/` with an `extension.toml` manifest and
/// an optional `resources/` blob directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load_module(&self, module_dir: &Path) -> Result<Option<LoadedModule>> {
        let manifest_path = module_dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            warn!("Skipping {:?}: no {} found", module_dir, MANIFEST_FILE);
            return Ok(None);
        }

        let content = std::fs::read_to_string(&manifest_path)?;
        let manifest =
            ExtensionManifest::from_toml_str(&content).map_err(|message| HostError::Manifest {
                path: manifest_path.clone(),
                message,
            })?;

        if module_dir.file_name().and_then(|n| n.to_str()) != Some(manifest.name.as_str()) {
            warn!(
                "Module directory {:?} declares name '{}'",
                module_dir, manifest.name
            );
        }

        let blobs = Arc::new(DirectoryBlobStore::new(module_dir.join(RESOURCES_DIR)));
        let entry = manifest.entry.as_ref().map(|declared| {
            let program = module_dir.join(&declared.program);
            Arc::new(ProcessEntry::new(program, declared.args.clone())) as Arc<dyn EntryPoint>
        });

        debug!("Loaded module manifest: {}", manifest.name);
        Ok(Some(LoadedModule {
            manifest,
            blobs,
            entry,
        }))
    }
}

impl ModuleSource for DirectorySource {
    fn load(&self) -> Result<ModuleCatalog> {
        if !self.dir.is_dir() {
            return Err(HostError::Config(format!(
                "Extensions directory not found: {:?}",
                self.dir
            )));
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        entries.sort();

        let mut catalog = ModuleCatalog::new();
        for module_dir in entries {
            match self.load_module(&module_dir) {
                Ok(Some(module)) => catalog.insert(module),
                Ok(None) => {}
                Err(e) => error!("Skipping module {:?}: {}", module_dir, e),
            }
        }

        info!(
            "Loaded {} extension modules from {:?}",
            catalog.len(),
            self.dir
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn read_all(store: &dyn BlobStore, name: &str) -> String {
        let mut content = String::new();
        store.open(name).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryBlobStore::new().with_blob("a.json", "{}");
        assert_eq!(read_all(&store, "a.json"), "{}");
        assert!(matches!(
            store.open("missing.json"),
            Err(HostError::BlobOpen { .. })
        ));
    }

    #[test]
    fn test_directory_store_rejects_escaping_names() {
        let store = DirectoryBlobStore::new("/tmp/keel-resources");
        assert!(matches!(
            store.resolve("../secret"),
            Err(HostError::InvalidBlobName(_))
        ));
        assert!(matches!(
            store.resolve("/etc/passwd"),
            Err(HostError::InvalidBlobName(_))
        ));
        assert_eq!(
            store.resolve("tables/a.json").unwrap(),
            PathBuf::from("/tmp/keel-resources/tables/a.json")
        );
    }

    #[test]
    fn test_directory_source() {
        let temp = tempdir().unwrap();
        let sales = temp.path().join("sales");
        std::fs::create_dir_all(sales.join(RESOURCES_DIR)).unwrap();
        std::fs::write(
            sales.join(MANIFEST_FILE),
            "name = \"sales\"\n[entry]\nprogram = \"run.sh\"\n",
        )
        .unwrap();
        std::fs::write(sales.join(RESOURCES_DIR).join("t.json"), "{\"a\":1}").unwrap();
        // no manifest: skipped
        std::fs::create_dir_all(temp.path().join("scratch")).unwrap();

        let catalog = DirectorySource::new(temp.path()).load().unwrap();
        assert_eq!(catalog.names(), vec!["sales".to_string()]);

        let module = catalog.resolve("sales").unwrap();
        assert!(module.entry.is_some());
        assert_eq!(read_all(module.blobs.as_ref(), "t.json"), "{\"a\":1}");
    }

    #[test]
    fn test_directory_source_skips_invalid_manifest() {
        let temp = tempdir().unwrap();
        for (name, manifest) in [("bad", "name = 42"), ("good", "name = \"good\"")] {
            let dir = temp.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
        }

        let catalog = DirectorySource::new(temp.path()).load().unwrap();
        assert_eq!(catalog.names(), vec!["good".to_string()]);
        assert!(catalog.resolve("bad").is_none());
    }

    #[test]
    fn test_load_module_reports_invalid_manifest() {
        let temp = tempdir().unwrap();
        let broken = temp.path().join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join(MANIFEST_FILE), "name = 42").unwrap();

        let err = DirectorySource::new(temp.path())
            .load_module(&broken)
            .unwrap_err();
        assert!(matches!(err, HostError::Manifest { .. }));
    }

    #[test]
    fn test_directory_source_missing_dir() {
        let temp = tempdir().unwrap();
        let err = DirectorySource::new(temp.path().join("nope"))
            .load()
            .unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }
}
