//! Resource registrar
//!
//! Turns classified descriptors into idempotent persistence calls. Each
//! descriptor is its own unit of work: a failure is logged with the
//! descriptor's identity and the remaining descriptors are still processed.

use crate::catalog::BlobStore;
use crate::error::{HostError, Result};
use crate::objects::{BusinessObject, PersistenceOp, decode_object};
use crate::scanner::{PermissionDescriptor, ResourceDescriptor, ScanResult};
use tracing::{debug, error, info};

/// Persistence capability consumed by the registrar
///
/// Implementations must be idempotent: applying an operation twice with the
/// same object leaves the store as applying it once.
pub trait Persistence: Send + Sync {
    /// Store the object unless one with the same kind and key exists
    fn save_if_absent(&self, object: &BusinessObject) -> anyhow::Result<()>;

    /// Store the object, replacing one with the same kind and key
    fn update_or_save_if_absent(&self, object: &BusinessObject) -> anyhow::Result<()>;

    /// Ensure the permission entry exists with the given fields
    fn update_or_save_permission_if_absent(
        &self,
        permission: &PermissionDescriptor,
    ) -> anyhow::Result<()>;
}

/// One descriptor that could not be registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationFailure {
    pub descriptor: String,
    pub error: String,
}

/// Outcome of registering one extension's descriptors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    pub registered: Vec<String>,
    pub failed: Vec<RegistrationFailure>,
}

impl RegistrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Register one resource descriptor
///
/// The blob reader is dropped as soon as decoding finishes, whatever the
/// outcome.
pub fn register_resource(
    persistence: &dyn Persistence,
    blobs: &dyn BlobStore,
    descriptor: &ResourceDescriptor,
) -> Result<BusinessObject> {
    let object = {
        let reader = blobs.open(&descriptor.resource)?;
        decode_object(descriptor.kind, &descriptor.resource, reader)?
    };

    let persisted = match descriptor.kind.operation() {
        PersistenceOp::SaveIfAbsent => persistence.save_if_absent(&object),
        PersistenceOp::UpdateOrSaveIfAbsent => persistence.update_or_save_if_absent(&object),
    };
    persisted.map_err(|source| HostError::Persistence {
        kind: descriptor.kind.to_string(),
        key: object.key(),
        source,
    })?;

    debug!("Registered {} as '{}'", descriptor, object.key());
    Ok(object)
}

/// Register one permission descriptor
pub fn register_permission(
    persistence: &dyn Persistence,
    descriptor: &PermissionDescriptor,
) -> Result<()> {
    persistence
        .update_or_save_permission_if_absent(descriptor)
        .map_err(|source| HostError::Persistence {
            kind: "permission".to_string(),
            key: descriptor.permission.id.clone(),
            source,
        })
}

/// Register everything a scan found, tolerating per-descriptor failures
pub fn register_all(
    persistence: &dyn Persistence,
    blobs: &dyn BlobStore,
    scan: &ScanResult,
) -> RegistrationReport {
    let mut report = RegistrationReport::default();

    for descriptor in &scan.resources {
        match register_resource(persistence, blobs, descriptor) {
            Ok(_) => report.registered.push(descriptor.to_string()),
            Err(e) => {
                error!(
                    extension = %descriptor.extension,
                    kind = %descriptor.kind,
                    resource = %descriptor.resource,
                    "Failed to register {}: {}", descriptor, e
                );
                report.failed.push(RegistrationFailure {
                    descriptor: descriptor.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    for descriptor in &scan.permissions {
        match register_permission(persistence, descriptor) {
            Ok(()) => report.registered.push(descriptor.to_string()),
            Err(e) => {
                error!(
                    extension = %descriptor.extension,
                    permission = %descriptor.permission.id,
                    "Failed to register {}: {}", descriptor, e
                );
                report.failed.push(RegistrationFailure {
                    descriptor: descriptor.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "Registration finished: {} registered, {} failed",
        report.registered.len(),
        report.failed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryBlobStore;
    use crate::manifest::PermissionMarker;
    use crate::objects::ResourceKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CallLog {
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    impl Persistence for CallLog {
        fn save_if_absent(&self, object: &BusinessObject) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(("save", object.key()));
            Ok(())
        }

        fn update_or_save_if_absent(&self, object: &BusinessObject) -> anyhow::Result<()> {
            if object.key() == "REJECTED" {
                anyhow::bail!("locked by another session");
            }
            self.calls.lock().unwrap().push(("update", object.key()));
            Ok(())
        }

        fn update_or_save_permission_if_absent(
            &self,
            permission: &PermissionDescriptor,
        ) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(("permission", permission.permission.id.clone()));
            Ok(())
        }
    }

    fn descriptor(kind: ResourceKind, resource: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            extension: "x".into(),
            owner_type: "Setup".into(),
            kind,
            resource: resource.into(),
        }
    }

    #[test]
    fn test_dispatches_operation_by_kind() {
        let blobs = MemoryBlobStore::new()
            .with_blob("t.json", r#"{"name": "PLAN", "description": "Plans"}"#)
            .with_blob(
                "c.json",
                r#"{"categories": [{"name": "Sales", "permissions": "YYYY"}]}"#,
            );
        let persistence = CallLog::default();

        register_resource(&persistence, &blobs, &descriptor(ResourceKind::UserTable, "t.json"))
            .unwrap();
        register_resource(
            &persistence,
            &blobs,
            &descriptor(ResourceKind::QueryCategories, "c.json"),
        )
        .unwrap();

        assert_eq!(
            *persistence.calls.lock().unwrap(),
            vec![("save", "PLAN".to_string()), ("update", "Sales".to_string())]
        );
    }

    #[test]
    fn test_partial_failure_is_isolated() {
        let blobs = MemoryBlobStore::new()
            .with_blob("t.json", r#"{"name": "PLAN", "description": "Plans"}"#)
            .with_blob("bad-udo.json", "<udo/>")
            .with_blob(
                "rejected.json",
                r#"{"code": "REJECTED", "name": "n", "object_type": "document", "table": "T"}"#,
            );
        let scan = ScanResult {
            resources: vec![
                descriptor(ResourceKind::Udo, "bad-udo.json"),
                descriptor(ResourceKind::Udo, "missing.json"),
                descriptor(ResourceKind::Udo, "rejected.json"),
                descriptor(ResourceKind::UserTable, "t.json"),
            ],
            permissions: vec![PermissionDescriptor {
                extension: "x".into(),
                owner_type: "Setup".into(),
                permission: PermissionMarker::new("X_PERM", "X"),
            }],
        };
        let persistence = CallLog::default();

        let report = register_all(&persistence, &blobs, &scan);

        assert_eq!(report.failed.len(), 3);
        assert!(report.failed[2].error.contains("REJECTED"));
        assert_eq!(report.registered.len(), 2);
        assert_eq!(
            *persistence.calls.lock().unwrap(),
            vec![
                ("save", "PLAN".to_string()),
                ("permission", "X_PERM".to_string())
            ]
        );
    }
}
