//! Declared-capability manifests
//!
//! Every loadable module publishes a manifest listing its declared types and
//! the markers attached to each type and method. Scanning a module means
//! reading its manifest; nothing is discovered by inspecting code.

use serde::{Deserialize, Serialize};

/// Manifest published by one loadable module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionManifest {
    /// Module name, equal to the extension identifier
    pub name: String,
    /// Version
    #[serde(default)]
    pub version: Option<String>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// External program launched as the extension body
    #[serde(default)]
    pub entry: Option<EntrySpec>,
    /// Declared types and their markers
    #[serde(default)]
    pub types: Vec<DeclaredType>,
}

impl ExtensionManifest {
    /// Create an empty manifest for a module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            entry: None,
            types: Vec::new(),
        }
    }

    /// Parse a manifest from TOML source
    pub fn from_toml_str(source: &str) -> Result<Self, String> {
        let manifest: ExtensionManifest = toml::from_str(source).map_err(|e| e.to_string())?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check declaration-level invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("manifest name must not be empty".to_string());
        }
        if let Some(ty) = self.types.iter().find(|t| t.name.trim().is_empty()) {
            return Err(format!(
                "declared type with empty name ({} markers)",
                ty.markers.len()
            ));
        }
        if let Some(entry) = &self.entry {
            if entry.program.trim().is_empty() {
                return Err("entry program must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Add a declared type
    pub fn with_type(mut self, ty: DeclaredType) -> Self {
        self.types.push(ty);
        self
    }

    /// Set the external entry program
    pub fn with_entry(mut self, entry: EntrySpec) -> Self {
        self.entry = Some(entry);
        self
    }
}

/// External program used as an extension entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySpec {
    /// Program path, relative paths resolve against the module directory
    pub program: String,
    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,
}

/// A declared type and the markers attached to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredType {
    pub name: String,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub methods: Vec<DeclaredMethod>,
}

impl DeclaredType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markers: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn with_method(mut self, method: DeclaredMethod) -> Self {
        self.methods.push(method);
        self
    }
}

/// A method on a declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredMethod {
    pub name: String,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

impl DeclaredMethod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markers: Vec::new(),
        }
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }
}

/// Declarative marker attached to a type or method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "marker", rename_all = "kebab-case")]
pub enum Marker {
    /// Persisted artifact backed by an embedded blob
    Resource(ResourceMarker),
    /// Permission entry to ensure in the policy store
    Permission(PermissionMarker),
    /// UI menu entry
    Menu(MenuMarker),
    /// Binding from a menu identifier to a handler
    MenuEvent(MenuEventMarker),
    /// Any marker this host does not understand
    #[serde(other)]
    Unknown,
}

/// Resource marker as written in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMarker {
    /// Resource kind, parsed during classification
    pub kind: String,
    /// Name of the embedded blob
    pub resource: String,
}

impl ResourceMarker {
    pub fn new(kind: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            resource: resource.into(),
        }
    }
}

/// Access level granted by a permission entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionLevel {
    #[default]
    Full,
    ReadOnly,
    None,
}

/// Permission marker carrying the entry's identifying fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionMarker {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub form_type: Option<String>,
    #[serde(default)]
    pub level: PermissionLevel,
}

impl PermissionMarker {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            form_type: None,
            level: PermissionLevel::Full,
        }
    }
}

/// Kind of menu entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MenuItemKind {
    #[default]
    String,
    Popup,
    Separator,
}

/// Menu marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuMarker {
    /// Unique menu identifier
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default)]
    pub item: MenuItemKind,
    #[serde(default)]
    pub image: Option<String>,
}

impl MenuMarker {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            parent_id: None,
            position: None,
            item: MenuItemKind::String,
            image: None,
        }
    }
}

/// Menu event marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEventMarker {
    pub menu_id: String,
    /// Handler selector; the annotated method is used when absent
    #[serde(default)]
    pub handler: Option<String>,
}

impl MenuEventMarker {
    pub fn new(menu_id: impl Into<String>) -> Self {
        Self {
            menu_id: menu_id.into(),
            handler: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALES_MANIFEST: &str = r#"
name = "sales"
version = "1.2.0"

[entry]
program = "bin/sales"
args = ["--quiet"]

[[types]]
name = "SalesSetup"

[[types.markers]]
marker = "resource"
kind = "user-table"
resource = "tables/sales.json"

[[types.markers]]
marker = "permission"
id = "SALES"
name = "Sales module"
level = "read-only"

[[types.markers]]
marker = "telemetry"
"#;

    #[test]
    fn test_parse_toml_manifest() {
        let manifest = ExtensionManifest::from_toml_str(SALES_MANIFEST).unwrap();
        assert_eq!(manifest.name, "sales");
        assert_eq!(manifest.entry.as_ref().unwrap().args, vec!["--quiet"]);

        let markers = &manifest.types[0].markers;
        assert_eq!(markers.len(), 3);
        assert_eq!(
            markers[0],
            Marker::Resource(ResourceMarker::new("user-table", "tables/sales.json"))
        );
        match &markers[1] {
            Marker::Permission(p) => assert_eq!(p.level, PermissionLevel::ReadOnly),
            other => panic!("unexpected marker {:?}", other),
        }
        assert_eq!(markers[2], Marker::Unknown);
    }

    #[test]
    fn test_rejects_empty_name() {
        let err = ExtensionManifest::from_toml_str("name = \"  \"").unwrap_err();
        assert!(err.contains("name"));
    }

    #[test]
    fn test_marker_serde_tag() {
        let json = serde_json::to_value(Marker::MenuEvent(MenuEventMarker::new("m.1"))).unwrap();
        assert_eq!(json["marker"], "menu-event");
        assert_eq!(json["menu_id"], "m.1");
    }
}
