//! Vector index abstraction.
//!
//! [`VectorIndex`] is the seam between the pipeline and the external store.
//! The Weaviate-backed implementation speaks REST and GraphQL; the in-memory
//! implementation backs tests and keeps the pipeline honest about using only
//! trait-level operations.

mod memory;
mod weaviate;

pub use memory::MemoryIndex;
pub use weaviate::WeaviateIndex;

use crate::error::StoreError;
use crate::types::{CollectionSchema, RankedHit};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// An object as stored: deterministic id plus flat property map
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub id: String,
    pub properties: Map<String, Value>,
}

/// Per-flush accounting for batch inserts
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    pub fn merge(&mut self, other: BatchOutcome) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

/// Operations the external vector store must provide.
///
/// Inserts are upserts: writing an existing id replaces the object. Batch
/// inserts report per-object outcomes rather than failing wholesale;
/// connection-level failures are the only errors that abort a call.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Readiness probe; false means reachable but not serving
    async fn is_ready(&self) -> Result<bool, StoreError>;

    /// Names of all collections currently defined
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Live schema of one collection, None if it does not exist
    async fn collection_fields(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionSchema>, StoreError>;

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError>;

    /// Drop a collection and all its objects. Missing collections are fine.
    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Upsert a single object
    async fn insert(
        &self,
        collection: &str,
        id: &str,
        properties: &Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Upsert a batch; per-object failures are reported, not raised
    async fn insert_batch(
        &self,
        collection: &str,
        objects: &[StoredObject],
    ) -> Result<BatchOutcome, StoreError>;

    /// Delete every object whose text `field` equals `value`; returns the
    /// number deleted
    async fn delete_where(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<u64, StoreError>;

    /// Whether any object has text `field` equal to `value`
    async fn exists_where(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError>;

    /// Full export of a collection, used by migration
    async fn export_all(&self, collection: &str) -> Result<Vec<StoredObject>, StoreError>;

    async fn count(&self, collection: &str) -> Result<u64, StoreError>;

    /// Hybrid search scoped to an optional project, scores in [0, 1]
    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        alpha: f32,
        project: Option<&str>,
    ) -> Result<Vec<RankedHit>, StoreError>;
}
