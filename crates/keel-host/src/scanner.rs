//! Metadata scanner
//!
//! Reads an extension module's manifest and classifies the markers on its
//! declared types into resource and permission descriptors. Scanning is
//! read-only; payloads are only opened later by the registrar.

use crate::catalog::{LoadedModule, ModuleCatalog};
use crate::error::{HostError, Result};
use crate::manifest::{ExtensionManifest, Marker, PermissionMarker};
use crate::objects::ResourceKind;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Classified resource marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    /// Extension that declared the resource
    pub extension: String,
    /// Declared type carrying the marker
    pub owner_type: String,
    pub kind: ResourceKind,
    /// Name of the embedded blob
    pub resource: String,
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' on {}::{}",
            self.kind, self.resource, self.extension, self.owner_type
        )
    }
}

/// Classified permission marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDescriptor {
    pub extension: String,
    pub owner_type: String,
    pub permission: PermissionMarker,
}

impl fmt::Display for PermissionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "permission '{}' on {}::{}",
            self.permission.id, self.extension, self.owner_type
        )
    }
}

/// Everything a scan found in one extension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub resources: Vec<ResourceDescriptor>,
    pub permissions: Vec<PermissionDescriptor>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.permissions.is_empty()
    }
}

/// Resolve an extension in the catalog and classify its markers
pub fn scan(catalog: &ModuleCatalog, extension: &str) -> Result<ScanResult> {
    let module = catalog
        .resolve(extension)
        .ok_or_else(|| HostError::ModuleNotFound(extension.to_string()))?;
    Ok(scan_module(&module))
}

/// Classify the markers of an already resolved module
pub fn scan_module(module: &LoadedModule) -> ScanResult {
    classify(&module.manifest)
}

/// Classify type-level markers of a manifest
///
/// Markers of unrecognized kinds, and menu markers, are ignored.
pub fn classify(manifest: &ExtensionManifest) -> ScanResult {
    let mut result = ScanResult::default();

    for ty in &manifest.types {
        for marker in &ty.markers {
            debug!("Processing marker {:?} on {}", marker, ty.name);
            match marker {
                Marker::Resource(resource) => match ResourceKind::parse(&resource.kind) {
                    Some(kind) => result.resources.push(ResourceDescriptor {
                        extension: manifest.name.clone(),
                        owner_type: ty.name.clone(),
                        kind,
                        resource: resource.resource.clone(),
                    }),
                    None => debug!(
                        "Ignoring resource '{}' of unknown kind '{}' on {}",
                        resource.resource, resource.kind, ty.name
                    ),
                },
                Marker::Permission(permission) => {
                    result.permissions.push(PermissionDescriptor {
                        extension: manifest.name.clone(),
                        owner_type: ty.name.clone(),
                        permission: permission.clone(),
                    })
                }
                Marker::Menu(_) | Marker::MenuEvent(_) | Marker::Unknown => {}
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryBlobStore;
    use crate::manifest::{DeclaredMethod, DeclaredType, MenuMarker, ResourceMarker};
    use std::sync::Arc;

    fn manifest() -> ExtensionManifest {
        ExtensionManifest::new("inventory")
            .with_type(
                DeclaredType::new("Setup")
                    .with_marker(Marker::Resource(ResourceMarker::new("UserTable", "t.json")))
                    .with_marker(Marker::Resource(ResourceMarker::new("report", "r.json")))
                    .with_marker(Marker::Permission(PermissionMarker::new("INV", "Inventory")))
                    .with_marker(Marker::Unknown),
            )
            .with_type(
                DeclaredType::new("Forms")
                    .with_marker(Marker::Menu(MenuMarker::new("inv.menu", "Inventory")))
                    .with_marker(Marker::Resource(ResourceMarker::new("udo", "udo.json")))
                    .with_method(DeclaredMethod::new("open").with_marker(Marker::Resource(
                        ResourceMarker::new("user-field", "method-level.json"),
                    ))),
            )
    }

    #[test]
    fn test_classify_by_kind() {
        let result = classify(&manifest());

        let kinds: Vec<_> = result.resources.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![ResourceKind::UserTable, ResourceKind::Udo]);
        assert_eq!(result.resources[1].owner_type, "Forms");
        assert_eq!(result.permissions.len(), 1);
        assert_eq!(result.permissions[0].permission.id, "INV");
    }

    #[test]
    fn test_scan_resolves_module() {
        let catalog = ModuleCatalog::new().with_module(LoadedModule::new(
            manifest(),
            Arc::new(MemoryBlobStore::new()),
        ));

        let result = scan(&catalog, "inventory").unwrap();
        assert_eq!(result.resources.len(), 2);

        let err = scan(&catalog, "billing").unwrap_err();
        assert!(matches!(err, HostError::ModuleNotFound(ref name) if name == "billing"));
    }

    #[test]
    fn test_scan_module_matches_catalog_scan() {
        let module = LoadedModule::new(manifest(), Arc::new(MemoryBlobStore::new()));
        let direct = scan_module(&module);
        let catalog = ModuleCatalog::new().with_module(module);

        let resolved = scan(&catalog, "inventory").unwrap();
        assert_eq!(direct.resources.len(), resolved.resources.len());
        assert_eq!(direct.permissions.len(), resolved.permissions.len());
        assert_eq!(direct.resources[0].resource, resolved.resources[0].resource);
    }

    #[test]
    fn test_descriptor_display() {
        let result = classify(&manifest());
        assert_eq!(
            result.resources[0].to_string(),
            "user-table 't.json' on inventory::Setup"
        );
    }
}
