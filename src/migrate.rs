//! Schema reconciliation for the external store.
//!
//! The store cannot add fields to a live collection, so a drift between the
//! expected and live field sets is resolved by export, drop, recreate, and
//! re-import. Exported objects are also snapshotted to disk before the drop
//! so a failed re-import never loses data. Records predating a new field get
//! that field's typed default on the way back in.

use crate::error::{IndexerError, MigrationError, StoreError};
use crate::store::{StoredObject, VectorIndex};
use crate::types::RecordKind;
use serde_json::json;
use std::path::Path;

/// What `ensure_schema` did per collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionAction {
    /// Collection existed with all expected fields
    UpToDate,
    /// Collection did not exist and was created fresh
    Created,
    /// Collection was rebuilt; counts are (reimported, failed)
    Migrated { reimported: usize, failed: usize },
}

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub actions: Vec<(String, CollectionAction)>,
}

impl MigrationReport {
    pub fn migrated_any(&self) -> bool {
        self.actions
            .iter()
            .any(|(_, a)| matches!(a, CollectionAction::Migrated { .. }))
    }
}

/// Bring every collection's live schema up to the expected field set.
///
/// Missing collections are created; collections missing fields are rebuilt
/// through export and re-import. `force` rebuilds even collections whose
/// field set already matches. Connection-level store errors abort;
/// per-record re-import failures are counted and reported.
pub async fn ensure_schema(
    index: &dyn VectorIndex,
    snapshot_dir: &Path,
    force: bool,
) -> Result<MigrationReport, IndexerError> {
    let mut report = MigrationReport::default();

    for kind in RecordKind::ALL {
        let expected = kind.schema();
        let collection = kind.collection();

        let action = match index.collection_fields(collection).await? {
            None => {
                index.create_collection(&expected).await?;
                tracing::info!("Created collection {}", collection);
                CollectionAction::Created
            }
            Some(live) => {
                let live_names: Vec<&str> = live.field_names();
                let missing: Vec<&str> = expected
                    .field_names()
                    .into_iter()
                    .filter(|name| !live_names.contains(name))
                    .collect();

                if missing.is_empty() && !force {
                    CollectionAction::UpToDate
                } else {
                    tracing::warn!(
                        "Collection {} {} rebuilding",
                        collection,
                        if missing.is_empty() {
                            "rebuild forced,".to_string()
                        } else {
                            format!("is missing fields {missing:?},")
                        }
                    );
                    migrate_collection(index, kind, snapshot_dir).await?
                }
            }
        };
        report.actions.push((collection.to_string(), action));
    }

    Ok(report)
}

async fn migrate_collection(
    index: &dyn VectorIndex,
    kind: RecordKind,
    snapshot_dir: &Path,
) -> Result<CollectionAction, IndexerError> {
    let collection = kind.collection();
    let expected = kind.schema();

    let exported =
        index
            .export_all(collection)
            .await
            .map_err(|e| MigrationError::ExportFailed {
                collection: collection.to_string(),
                reason: e.to_string(),
            })?;
    write_snapshot(snapshot_dir, collection, &exported)?;

    index.delete_collection(collection).await.map_err(|e| {
        MigrationError::RecreateFailed {
            collection: collection.to_string(),
            reason: e.to_string(),
        }
    })?;
    index.create_collection(&expected).await.map_err(|e| {
        MigrationError::RecreateFailed {
            collection: collection.to_string(),
            reason: e.to_string(),
        }
    })?;

    let mut reimported = 0;
    let mut failed = 0;
    for object in &exported {
        let mut properties = object.properties.clone();
        for field in &expected.fields {
            properties
                .entry(field.name.clone())
                .or_insert_with(|| field.data_type.default_value());
        }
        match index.insert(collection, &object.id, &properties).await {
            Ok(()) => reimported += 1,
            Err(StoreError::ConnectionFailed(reason)) => {
                return Err(StoreError::ConnectionFailed(reason).into());
            }
            Err(e) => {
                failed += 1;
                tracing::error!("Re-import of {} into {} failed: {}", object.id, collection, e);
            }
        }
    }

    tracing::info!(
        "Rebuilt collection {}: {} re-imported, {} failed of {} exported",
        collection,
        reimported,
        failed,
        exported.len()
    );
    Ok(CollectionAction::Migrated { reimported, failed })
}

/// Write the pre-drop export to a timestamped JSON file
fn write_snapshot(
    snapshot_dir: &Path,
    collection: &str,
    objects: &[StoredObject],
) -> Result<(), MigrationError> {
    std::fs::create_dir_all(snapshot_dir)
        .map_err(|e| MigrationError::SnapshotFailed(e.to_string()))?;

    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let path = snapshot_dir.join(format!("{collection}-{stamp}.json"));

    let entries: Vec<_> = objects
        .iter()
        .map(|o| json!({ "id": o.id, "properties": o.properties }))
        .collect();
    let body = serde_json::to_string_pretty(&entries)
        .map_err(|e| MigrationError::SnapshotFailed(e.to_string()))?;
    std::fs::write(&path, body).map_err(|e| MigrationError::SnapshotFailed(e.to_string()))?;

    tracing::debug!("Wrote {} objects to snapshot {}", objects.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryIndex;
    use crate::types::{CollectionSchema, FieldSpec, FieldType};
    use serde_json::{Map, Value};

    fn old_schema(kind: RecordKind) -> CollectionSchema {
        // The expected schema minus one field, simulating drift
        let mut schema = kind.schema();
        schema.fields.pop();
        schema
    }

    fn object(id: &str, content: &str) -> StoredObject {
        let mut properties = Map::new();
        properties.insert("content".into(), Value::String(content.to_string()));
        properties.insert("sourcePath".into(), Value::String("a.rs".to_string()));
        properties.insert("project".into(), Value::String("demo".to_string()));
        StoredObject {
            id: id.to_string(),
            properties,
        }
    }

    #[tokio::test]
    async fn test_fresh_store_creates_all_collections() {
        let index = MemoryIndex::new();
        let dir = tempfile::tempdir().unwrap();

        let report = ensure_schema(&index, dir.path(), false).await.unwrap();
        assert_eq!(report.actions.len(), RecordKind::ALL.len());
        assert!(report
            .actions
            .iter()
            .all(|(_, a)| *a == CollectionAction::Created));
        assert!(!report.migrated_any());

        let collections = index.list_collections().await.unwrap();
        assert!(collections.contains(&"CodeChunk".to_string()));
        assert!(collections.contains(&"ConversationMemory".to_string()));
    }

    #[tokio::test]
    async fn test_up_to_date_store_is_untouched() {
        let index = MemoryIndex::new();
        let dir = tempfile::tempdir().unwrap();
        ensure_schema(&index, dir.path(), false).await.unwrap();

        let report = ensure_schema(&index, dir.path(), false).await.unwrap();
        assert!(report
            .actions
            .iter()
            .all(|(_, a)| *a == CollectionAction::UpToDate));
    }

    #[tokio::test]
    async fn test_drifted_collection_is_rebuilt_with_defaults() {
        let index = MemoryIndex::new();
        let dir = tempfile::tempdir().unwrap();

        index
            .create_collection(&old_schema(RecordKind::CodeChunk))
            .await
            .unwrap();
        for i in 0..5 {
            index
                .insert("CodeChunk", &format!("id-{i}"), &object(&format!("id-{i}"), "fn x()").properties)
                .await
                .unwrap();
        }

        let report = ensure_schema(&index, dir.path(), false).await.unwrap();
        let (_, action) = report
            .actions
            .iter()
            .find(|(c, _)| c == "CodeChunk")
            .unwrap();
        assert_eq!(
            *action,
            CollectionAction::Migrated {
                reimported: 5,
                failed: 0
            }
        );

        // All records survive and carry the new field's typed default
        assert_eq!(index.count("CodeChunk").await.unwrap(), 5);
        let objects = index.export_all("CodeChunk").await.unwrap();
        for object in &objects {
            assert_eq!(object.properties["complexity"], serde_json::json!(0));
            assert_eq!(object.properties["content"], serde_json::json!("fn x()"));
        }

        // A snapshot was written before the drop
        let snapshots: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn test_reimport_failures_are_counted_not_fatal() {
        let index = MemoryIndex::new();
        let dir = tempfile::tempdir().unwrap();

        index
            .create_collection(&old_schema(RecordKind::DocChunk))
            .await
            .unwrap();
        index
            .insert("DocChunk", "keep", &object("keep", "alpha").properties)
            .await
            .unwrap();
        index
            .insert("DocChunk", "drop", &object("drop", "beta").properties)
            .await
            .unwrap();
        index.poison("drop");

        let report = ensure_schema(&index, dir.path(), false).await.unwrap();
        let (_, action) = report
            .actions
            .iter()
            .find(|(c, _)| c == "DocChunk")
            .unwrap();
        assert_eq!(
            *action,
            CollectionAction::Migrated {
                reimported: 1,
                failed: 1
            }
        );
        assert_eq!(index.count("DocChunk").await.unwrap(), 1);
    }
}
