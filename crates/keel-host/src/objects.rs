//! Schema-typed resource payloads
//!
//! Each resource kind has one schema. Blobs are JSON or TOML documents,
//! selected by the blob name's extension, and are decoded into these types
//! before being handed to the persistence collaborator.

use crate::error::{HostError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Kind tag of a resource descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    UserField,
    UserTable,
    Udo,
    FormattedSearch,
    QueryCategories,
    UserQueries,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::UserField,
        ResourceKind::UserTable,
        ResourceKind::Udo,
        ResourceKind::FormattedSearch,
        ResourceKind::QueryCategories,
        ResourceKind::UserQueries,
    ];

    /// Stable string used in manifests and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserField => "user-field",
            Self::UserTable => "user-table",
            Self::Udo => "udo",
            Self::FormattedSearch => "formatted-search",
            Self::QueryCategories => "query-categories",
            Self::UserQueries => "user-queries",
        }
    }

    /// Parse a manifest kind string
    ///
    /// Accepts the kebab-case form and the PascalCase form (`UserField`, `UDO`).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|kind| {
            kind.as_str() == value || kind.pascal_name().eq_ignore_ascii_case(value)
        })
    }

    fn pascal_name(self) -> &'static str {
        match self {
            Self::UserField => "UserField",
            Self::UserTable => "UserTable",
            Self::Udo => "UDO",
            Self::FormattedSearch => "FormattedSearch",
            Self::QueryCategories => "QueryCategories",
            Self::UserQueries => "UserQueries",
        }
    }

    /// Persistence operation used for this kind
    pub fn operation(self) -> PersistenceOp {
        match self {
            Self::UserField | Self::UserTable => PersistenceOp::SaveIfAbsent,
            Self::Udo | Self::FormattedSearch | Self::QueryCategories | Self::UserQueries => {
                PersistenceOp::UpdateOrSaveIfAbsent
            }
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Idempotent persistence operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceOp {
    /// Create the object only when no object with the same key exists
    SaveIfAbsent,
    /// Create the object, or replace the stored object with the same key
    UpdateOrSaveIfAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Alpha,
    Numeric,
    Float,
    Date,
    Memo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidValue {
    pub value: String,
    pub description: String,
}

/// User-defined field on a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserField {
    pub table: String,
    pub name: String,
    pub description: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub valid_values: Vec<ValidValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableType {
    #[default]
    NoObject,
    MasterData,
    MasterDataLines,
    Document,
    DocumentLines,
}

/// User-defined table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTable {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub table_type: TableType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UdoObjectType {
    MasterData,
    Document,
}

/// User-defined object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Udo {
    pub code: String,
    pub name: String,
    pub object_type: UdoObjectType,
    pub table: String,
    #[serde(default)]
    pub child_tables: Vec<String>,
    #[serde(default)]
    pub can_find: bool,
    #[serde(default)]
    pub can_delete: bool,
    #[serde(default)]
    pub can_cancel: bool,
    #[serde(default)]
    pub find_columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchAction {
    Query,
    Values,
}

/// Formatted search bound to a form item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedSearch {
    pub form_id: String,
    pub item_id: String,
    #[serde(default)]
    pub column_id: Option<String>,
    pub action: SearchAction,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub field_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCategory {
    pub name: String,
    #[serde(default)]
    pub permissions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCategories {
    pub categories: Vec<QueryCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuery {
    pub category: String,
    pub name: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQueries {
    pub queries: Vec<UserQuery>,
}

/// Decoded resource payload handed to persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "object", rename_all = "kebab-case")]
pub enum BusinessObject {
    UserField(UserField),
    UserTable(UserTable),
    Udo(Udo),
    FormattedSearch(FormattedSearch),
    QueryCategories(QueryCategories),
    UserQueries(UserQueries),
}

impl BusinessObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::UserField(_) => ResourceKind::UserField,
            Self::UserTable(_) => ResourceKind::UserTable,
            Self::Udo(_) => ResourceKind::Udo,
            Self::FormattedSearch(_) => ResourceKind::FormattedSearch,
            Self::QueryCategories(_) => ResourceKind::QueryCategories,
            Self::UserQueries(_) => ResourceKind::UserQueries,
        }
    }

    /// Identity of the object within its kind
    pub fn key(&self) -> String {
        match self {
            Self::UserField(f) => format!("{}.{}", f.table, f.name),
            Self::UserTable(t) => t.name.clone(),
            Self::Udo(u) => u.code.clone(),
            Self::FormattedSearch(s) => match &s.column_id {
                Some(column) => format!("{}/{}/{}", s.form_id, s.item_id, column),
                None => format!("{}/{}", s.form_id, s.item_id),
            },
            Self::QueryCategories(c) => c
                .categories
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(","),
            Self::UserQueries(q) => q
                .queries
                .iter()
                .map(|q| format!("{}/{}", q.category, q.name))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Check required fields a well-formed document must carry
    pub fn validate(&self) -> std::result::Result<(), String> {
        fn required(field: &str, value: &str) -> std::result::Result<(), String> {
            if value.trim().is_empty() {
                Err(format!("{field} must not be empty"))
            } else {
                Ok(())
            }
        }

        match self {
            Self::UserField(f) => {
                required("table", &f.table)?;
                required("name", &f.name)
            }
            Self::UserTable(t) => required("name", &t.name),
            Self::Udo(u) => {
                required("code", &u.code)?;
                required("table", &u.table)
            }
            Self::FormattedSearch(s) => {
                required("form_id", &s.form_id)?;
                required("item_id", &s.item_id)?;
                if s.action == SearchAction::Query && s.query.is_none() {
                    return Err("query action requires a query".to_string());
                }
                Ok(())
            }
            Self::QueryCategories(c) => {
                if c.categories.is_empty() {
                    return Err("categories must not be empty".to_string());
                }
                c.categories.iter().try_for_each(|c| required("name", &c.name))
            }
            Self::UserQueries(q) => {
                if q.queries.is_empty() {
                    return Err("queries must not be empty".to_string());
                }
                q.queries.iter().try_for_each(|q| {
                    required("category", &q.category)?;
                    required("name", &q.name)
                })
            }
        }
    }
}

/// Document format of a resource blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobFormat {
    Json,
    Toml,
}

impl BlobFormat {
    /// Select the format from the blob name; anything but `.toml` is JSON
    pub fn from_name(name: &str) -> Self {
        match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Decode a blob into a schema type
pub fn decode<T: DeserializeOwned>(resource: &str, mut reader: impl Read) -> Result<T> {
    let decode_error = |message: String| HostError::BlobDecode {
        resource: resource.to_string(),
        message,
    };

    match BlobFormat::from_name(resource) {
        BlobFormat::Json => serde_json::from_reader(reader).map_err(|e| decode_error(e.to_string())),
        BlobFormat::Toml => {
            let mut content = String::new();
            reader
                .read_to_string(&mut content)
                .map_err(|e| decode_error(e.to_string()))?;
            toml::from_str(&content).map_err(|e| decode_error(e.to_string()))
        }
    }
}

/// Decode a blob into the business object for `kind`
pub fn decode_object(kind: ResourceKind, resource: &str, reader: impl Read) -> Result<BusinessObject> {
    let object = match kind {
        ResourceKind::UserField => BusinessObject::UserField(decode(resource, reader)?),
        ResourceKind::UserTable => BusinessObject::UserTable(decode(resource, reader)?),
        ResourceKind::Udo => BusinessObject::Udo(decode(resource, reader)?),
        ResourceKind::FormattedSearch => BusinessObject::FormattedSearch(decode(resource, reader)?),
        ResourceKind::QueryCategories => BusinessObject::QueryCategories(decode(resource, reader)?),
        ResourceKind::UserQueries => BusinessObject::UserQueries(decode(resource, reader)?),
    };

    object.validate().map_err(|message| HostError::BlobDecode {
        resource: resource.to_string(),
        message,
    })?;
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!(ResourceKind::parse("udo"), Some(ResourceKind::Udo));
        assert_eq!(ResourceKind::parse("UDO"), Some(ResourceKind::Udo));
        assert_eq!(ResourceKind::parse("UserTable"), Some(ResourceKind::UserTable));
        assert_eq!(
            ResourceKind::parse("query-categories"),
            Some(ResourceKind::QueryCategories)
        );
        assert_eq!(ResourceKind::parse("Report"), None);
    }

    #[test]
    fn test_kind_operation_table() {
        assert_eq!(ResourceKind::UserField.operation(), PersistenceOp::SaveIfAbsent);
        assert_eq!(ResourceKind::UserTable.operation(), PersistenceOp::SaveIfAbsent);
        for kind in [
            ResourceKind::Udo,
            ResourceKind::FormattedSearch,
            ResourceKind::QueryCategories,
            ResourceKind::UserQueries,
        ] {
            assert_eq!(kind.operation(), PersistenceOp::UpdateOrSaveIfAbsent);
        }
    }

    #[test]
    fn test_decode_json_user_field() {
        let json = r#"{
            "table": "OCRD",
            "name": "Rating",
            "description": "Customer rating",
            "field_type": "numeric",
            "size": 2,
            "valid_values": [{"value": "1", "description": "Low"}]
        }"#;
        let object = decode_object(ResourceKind::UserField, "rating.json", json.as_bytes()).unwrap();
        assert_eq!(object.kind(), ResourceKind::UserField);
        assert_eq!(object.key(), "OCRD.Rating");
    }

    #[test]
    fn test_decode_toml_udo() {
        let source = r#"
code = "SALES_PLAN"
name = "Sales plan"
object_type = "document"
table = "SALES_PLAN"
child_tables = ["SALES_PLAN_LINES"]
can_find = true
"#;
        let object = decode_object(ResourceKind::Udo, "udo/plan.toml", source.as_bytes()).unwrap();
        match object {
            BusinessObject::Udo(udo) => {
                assert_eq!(udo.child_tables, vec!["SALES_PLAN_LINES"]);
                assert!(udo.can_find);
                assert!(!udo.can_delete);
            }
            other => panic!("unexpected object {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let err = decode_object(ResourceKind::Udo, "udo.json", "{\"code\": ".as_bytes()).unwrap_err();
        assert!(matches!(err, HostError::BlobDecode { ref resource, .. } if resource == "udo.json"));

        let empty_name = r#"{"name": " ", "description": "x"}"#;
        let err =
            decode_object(ResourceKind::UserTable, "t.json", empty_name.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("name must not be empty"));
    }

    #[test]
    fn test_formatted_search_key() {
        let search = BusinessObject::FormattedSearch(FormattedSearch {
            form_id: "139".into(),
            item_id: "38".into(),
            column_id: Some("1".into()),
            action: SearchAction::Query,
            query: Some("Item lookup".into()),
            refresh: false,
            field_id: None,
        });
        assert_eq!(search.key(), "139/38/1");
        assert!(search.validate().is_ok());
    }
}
