//! In-memory [`VectorIndex`] used by tests.
//!
//! Mirrors the store's observable semantics: upsert-by-id, text-equality
//! filters, and a crude lexical search so ranking code has scores to work
//! with. Individual ids can be poisoned to exercise partial batch failures.

use super::{BatchOutcome, StoredObject, VectorIndex};
use crate::error::StoreError;
use crate::types::{CollectionSchema, RankedHit};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

struct Collection {
    schema: CollectionSchema,
    objects: BTreeMap<String, Map<String, Value>>,
}

#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
    poisoned_ids: RwLock<HashSet<String>>,
    failing_batch_collections: RwLock<HashSet<String>>,
    severed: RwLock<bool>,
    ready: RwLock<bool>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(true),
            ..Default::default()
        }
    }

    /// Make inserts of `id` fail, for partial-batch tests
    pub fn poison(&self, id: &str) {
        self.poisoned_ids.write().unwrap().insert(id.to_string());
    }

    /// Make every batch insert into `collection` fail wholesale
    pub fn fail_batches(&self, collection: &str) {
        self.failing_batch_collections
            .write()
            .unwrap()
            .insert(collection.to_string());
    }

    /// Make batch inserts fail as a lost connection
    pub fn sever(&self) {
        *self.severed.write().unwrap() = true;
    }

    pub fn set_ready(&self, ready: bool) {
        *self.ready.write().unwrap() = ready;
    }

    fn is_poisoned(&self, id: &str) -> bool {
        self.poisoned_ids.read().unwrap().contains(id)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn is_ready(&self) -> Result<bool, StoreError> {
        Ok(*self.ready.read().unwrap())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.collections.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn collection_fields(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionSchema>, StoreError> {
        Ok(self
            .collections
            .read()
            .unwrap()
            .get(collection)
            .map(|c| c.schema.clone()))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(&schema.class) {
            return Err(StoreError::CollectionCreationFailed {
                collection: schema.class.clone(),
                reason: "already exists".to_string(),
            });
        }
        collections.insert(
            schema.class.clone(),
            Collection {
                schema: schema.clone(),
                objects: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.collections.write().unwrap().remove(collection);
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        id: &str,
        properties: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        if self.is_poisoned(id) {
            return Err(StoreError::InsertFailed(format!("poisoned id {id}")));
        }
        let mut collections = self.collections.write().unwrap();
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        entry.objects.insert(id.to_string(), properties.clone());
        Ok(())
    }

    async fn insert_batch(
        &self,
        collection: &str,
        objects: &[StoredObject],
    ) -> Result<BatchOutcome, StoreError> {
        if *self.severed.read().unwrap() {
            return Err(StoreError::ConnectionFailed("connection severed".to_string()));
        }
        if self
            .failing_batch_collections
            .read()
            .unwrap()
            .contains(collection)
        {
            return Err(StoreError::InsertFailed(format!(
                "batch insert into {collection} rejected"
            )));
        }
        let mut outcome = BatchOutcome::default();
        let mut collections = self.collections.write().unwrap();
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        for object in objects {
            if self.poisoned_ids.read().unwrap().contains(&object.id) {
                outcome.failed += 1;
                outcome.errors.push(format!("{}: poisoned", object.id));
                continue;
            }
            entry
                .objects
                .insert(object.id.clone(), object.properties.clone());
            outcome.succeeded += 1;
        }
        Ok(outcome)
    }

    async fn delete_where(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().unwrap();
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = entry.objects.len();
        entry
            .objects
            .retain(|_, props| props.get(field).and_then(|v| v.as_str()) != Some(value));
        Ok((before - entry.objects.len()) as u64)
    }

    async fn exists_where(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .is_some_and(|entry| {
                entry
                    .objects
                    .values()
                    .any(|props| props.get(field).and_then(|v| v.as_str()) == Some(value))
            }))
    }

    async fn export_all(&self, collection: &str) -> Result<Vec<StoredObject>, StoreError> {
        let collections = self.collections.read().unwrap();
        let entry = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(entry
            .objects
            .iter()
            .map(|(id, props)| StoredObject {
                id: id.clone(),
                properties: props.clone(),
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .map(|c| c.objects.len() as u64)
            .unwrap_or(0))
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        _alpha: f32,
        project: Option<&str>,
    ) -> Result<Vec<RankedHit>, StoreError> {
        let collections = self.collections.read().unwrap();
        let Some(entry) = collections.get(collection) else {
            return Ok(vec![]);
        };

        let mut hits: Vec<RankedHit> = entry
            .objects
            .values()
            .filter(|props| {
                project.is_none_or(|p| props.get("project").and_then(|v| v.as_str()) == Some(p))
            })
            .filter_map(|props| {
                let content = props.get("content").and_then(|v| v.as_str())?;
                let score = lexical_score(query, content);
                if score > 0.0 {
                    Some(RankedHit {
                        score,
                        collection: collection.to_string(),
                        properties: props.clone(),
                    })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Fraction of query tokens found in the content, case-insensitive
fn lexical_score(query: &str, content: &str) -> f32 {
    let content = content.to_lowercase();
    let tokens: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let matched = tokens.iter().filter(|t| content.contains(t.as_str())).count();
    matched as f32 / tokens.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldSpec, FieldType};
    use serde_json::json;

    fn schema(class: &str) -> CollectionSchema {
        CollectionSchema {
            class: class.to_string(),
            fields: vec![
                FieldSpec::new("content", FieldType::Text),
                FieldSpec::new("project", FieldType::Text),
            ],
        }
    }

    fn props(content: &str, project: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("content".into(), json!(content));
        map.insert("project".into(), json!(project));
        map
    }

    #[tokio::test]
    async fn test_insert_is_upsert() {
        let index = MemoryIndex::new();
        index.create_collection(&schema("Test")).await.unwrap();

        index.insert("Test", "id-1", &props("old", "p")).await.unwrap();
        index.insert("Test", "id-1", &props("new", "p")).await.unwrap();

        assert_eq!(index.count("Test").await.unwrap(), 1);
        let objects = index.export_all("Test").await.unwrap();
        assert_eq!(objects[0].properties["content"], json!("new"));
    }

    #[tokio::test]
    async fn test_delete_where_scoped_by_value() {
        let index = MemoryIndex::new();
        index.create_collection(&schema("Test")).await.unwrap();
        index.insert("Test", "a", &props("x", "one")).await.unwrap();
        index.insert("Test", "b", &props("y", "one")).await.unwrap();
        index.insert("Test", "c", &props("z", "two")).await.unwrap();

        let deleted = index.delete_where("Test", "project", "one").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(index.count("Test").await.unwrap(), 1);
        assert!(index.exists_where("Test", "project", "two").await.unwrap());
        assert!(!index.exists_where("Test", "project", "one").await.unwrap());
    }

    #[tokio::test]
    async fn test_poisoned_batch_reports_partial_failure() {
        let index = MemoryIndex::new();
        index.create_collection(&schema("Test")).await.unwrap();
        index.poison("bad");

        let objects = vec![
            StoredObject {
                id: "good".to_string(),
                properties: props("fine", "p"),
            },
            StoredObject {
                id: "bad".to_string(),
                properties: props("nope", "p"),
            },
        ];
        let outcome = index.insert_batch("Test", &objects).await.unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(index.count("Test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_filters_by_project_and_ranks() {
        let index = MemoryIndex::new();
        index.create_collection(&schema("Test")).await.unwrap();
        index
            .insert("Test", "a", &props("parse config file", "one"))
            .await
            .unwrap();
        index
            .insert("Test", "b", &props("parse something else", "one"))
            .await
            .unwrap();
        index
            .insert("Test", "c", &props("parse config file", "two"))
            .await
            .unwrap();

        let hits = index
            .search("Test", "parse config", 10, 0.7, Some("one"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].properties["content"], json!("parse config file"));
    }

    #[tokio::test]
    async fn test_create_existing_collection_fails() {
        let index = MemoryIndex::new();
        index.create_collection(&schema("Test")).await.unwrap();
        let err = index.create_collection(&schema("Test")).await.unwrap_err();
        assert!(matches!(err, StoreError::CollectionCreationFailed { .. }));
    }
}
