//! Weaviate-backed [`VectorIndex`] over REST and GraphQL.
//!
//! Schema and object operations use the `/v1` REST surface; queries go
//! through `/v1/graphql` with hybrid search. The store handles embedding on
//! its side, so objects are plain property maps keyed by deterministic ids.

use super::{BatchOutcome, StoredObject, VectorIndex};
use crate::error::StoreError;
use crate::types::{CollectionSchema, FieldSpec, FieldType, RankedHit};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Page size for full-collection exports
const EXPORT_PAGE_SIZE: usize = 500;

pub struct WeaviateIndex {
    client: reqwest::Client,
    base_url: String,
}

impl WeaviateIndex {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn graphql(&self, query: String) -> Result<Value, StoreError> {
        let response = self
            .client
            .post(self.url("/v1/graphql"))
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(connection_error)?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        if let Some(errors) = body.get("errors").and_then(|e| e.as_array())
            && !errors.is_empty()
        {
            return Err(StoreError::QueryFailed(
                errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                    .collect::<Vec<_>>()
                    .join("; "),
            ));
        }
        Ok(body)
    }

    /// Field names to select for a collection, read from the live schema
    async fn selection_fields(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let schema = self
            .collection_fields(collection)
            .await?
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(schema.fields.into_iter().map(|f| f.name).collect())
    }

    fn where_clause(field: &str, value: &str) -> String {
        format!(
            r#"where: {{ path: ["{}"], operator: Equal, valueText: "{}" }}"#,
            field,
            escape_gql(value)
        )
    }
}

#[async_trait]
impl VectorIndex for WeaviateIndex {
    async fn is_ready(&self) -> Result<bool, StoreError> {
        let response = self
            .client
            .get(self.url("/v1/.well-known/ready"))
            .send()
            .await
            .map_err(connection_error)?;
        Ok(response.status().is_success())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .client
            .get(self.url("/v1/schema"))
            .send()
            .await
            .map_err(connection_error)?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        Ok(body
            .get("classes")
            .and_then(|c| c.as_array())
            .map(|classes| {
                classes
                    .iter()
                    .filter_map(|c| c.get("class").and_then(|n| n.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn collection_fields(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionSchema>, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/schema/{collection}")))
            .send()
            .await
            .map_err(connection_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::QueryFailed(format!(
                "schema fetch for '{}' returned {}",
                collection,
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        let fields = body
            .get("properties")
            .and_then(|p| p.as_array())
            .map(|props| {
                props
                    .iter()
                    .filter_map(|p| {
                        let name = p.get("name")?.as_str()?;
                        let wire = p.get("dataType")?.as_array()?.first()?.as_str()?;
                        Some(FieldSpec {
                            name: name.to_string(),
                            data_type: FieldType::from_wire(wire)?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(CollectionSchema {
            class: collection.to_string(),
            fields,
        }))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        let properties: Vec<Value> = schema
            .fields
            .iter()
            .map(|f| json!({ "name": f.name, "dataType": [f.data_type.wire_name()] }))
            .collect();

        let response = self
            .client
            .post(self.url("/v1/schema"))
            .json(&json!({ "class": schema.class, "properties": properties }))
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(StoreError::CollectionCreationFailed {
                collection: schema.class.clone(),
                reason: format!("{status}: {detail}"),
            });
        }
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.url(&format!("/v1/schema/{collection}")))
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(StoreError::DeleteFailed(format!(
                "dropping '{}' returned {}",
                collection,
                response.status()
            )));
        }
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        id: &str,
        properties: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let object = json!({ "class": collection, "id": id, "properties": properties });

        let response = self
            .client
            .post(self.url("/v1/objects"))
            .json(&object)
            .send()
            .await
            .map_err(connection_error)?;

        // Deterministic ids collide on re-index; replace in place
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let response = self
                .client
                .put(self.url(&format!("/v1/objects/{collection}/{id}")))
                .json(&object)
                .send()
                .await
                .map_err(connection_error)?;
            if !response.status().is_success() {
                return Err(StoreError::InsertFailed(format!(
                    "replace of {id} returned {}",
                    response.status()
                )));
            }
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(StoreError::InsertFailed(format!(
                "insert of {id} returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn insert_batch(
        &self,
        collection: &str,
        objects: &[StoredObject],
    ) -> Result<BatchOutcome, StoreError> {
        if objects.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let payload: Vec<Value> = objects
            .iter()
            .map(|o| json!({ "class": collection, "id": o.id, "properties": o.properties }))
            .collect();

        let response = self
            .client
            .post(self.url("/v1/batch/objects"))
            .json(&json!({ "objects": payload }))
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() {
            return Err(StoreError::InsertFailed(format!(
                "batch insert returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        let mut outcome = BatchOutcome::default();
        let results = body.as_array().cloned().unwrap_or_default();
        if results.is_empty() {
            // Some deployments return an empty body on full success
            outcome.succeeded = objects.len();
            return Ok(outcome);
        }
        for (idx, result) in results.iter().enumerate() {
            let errors = result
                .pointer("/result/errors/error")
                .and_then(|e| e.as_array());
            match errors {
                Some(errs) if !errs.is_empty() => {
                    outcome.failed += 1;
                    let id = objects.get(idx).map(|o| o.id.as_str()).unwrap_or("?");
                    let message = errs
                        .iter()
                        .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                        .collect::<Vec<_>>()
                        .join("; ");
                    outcome.errors.push(format!("{id}: {message}"));
                }
                _ => outcome.succeeded += 1,
            }
        }
        // A short response still means the remainder was accepted
        outcome.succeeded += objects.len().saturating_sub(results.len());
        Ok(outcome)
    }

    async fn delete_where(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<u64, StoreError> {
        let body = json!({
            "match": {
                "class": collection,
                "where": {
                    "path": [field],
                    "operator": "Equal",
                    "valueText": value,
                }
            },
            "output": "minimal"
        });

        let response = self
            .client
            .delete(self.url("/v1/batch/objects"))
            .json(&body)
            .send()
            .await
            .map_err(connection_error)?;

        if !response.status().is_success() {
            return Err(StoreError::DeleteFailed(format!(
                "batch delete on '{}' returned {}",
                collection,
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        Ok(body
            .pointer("/results/successful")
            .and_then(|v| v.as_u64())
            .unwrap_or(0))
    }

    async fn exists_where(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let query = format!(
            r#"{{ Get {{ {collection}(limit: 1, {}) {{ _additional {{ id }} }} }} }}"#,
            Self::where_clause(field, value)
        );
        let body = self.graphql(query).await?;
        let hits = body
            .pointer(&format!("/data/Get/{collection}"))
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        Ok(hits > 0)
    }

    async fn export_all(&self, collection: &str) -> Result<Vec<StoredObject>, StoreError> {
        let fields = self.selection_fields(collection).await?;
        let selection = fields.join(" ");

        let mut objects = Vec::new();
        let mut offset = 0;
        loop {
            let query = format!(
                r#"{{ Get {{ {collection}(limit: {EXPORT_PAGE_SIZE}, offset: {offset}) {{ {selection} _additional {{ id }} }} }} }}"#
            );
            let body = self.graphql(query).await?;
            let page = body
                .pointer(&format!("/data/Get/{collection}"))
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let page_len = page.len();

            for item in page {
                let Value::Object(mut map) = item else {
                    continue;
                };
                let id = map
                    .remove("_additional")
                    .and_then(|a| a.get("id").and_then(|i| i.as_str()).map(String::from))
                    .ok_or_else(|| {
                        StoreError::InvalidResponse("object without _additional.id".to_string())
                    })?;
                objects.push(StoredObject {
                    id,
                    properties: map,
                });
            }

            if page_len < EXPORT_PAGE_SIZE {
                break;
            }
            offset += EXPORT_PAGE_SIZE;
        }
        Ok(objects)
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let query = format!(r#"{{ Aggregate {{ {collection} {{ meta {{ count }} }} }} }}"#);
        let body = self.graphql(query).await?;
        body.pointer(&format!("/data/Aggregate/{collection}/0/meta/count"))
            .and_then(|v| v.as_u64())
            .ok_or_else(|| StoreError::InvalidResponse("missing aggregate count".to_string()))
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        alpha: f32,
        project: Option<&str>,
    ) -> Result<Vec<RankedHit>, StoreError> {
        let fields = self.selection_fields(collection).await?;
        let selection = fields.join(" ");

        let filter = project
            .map(|p| format!(", {}", Self::where_clause("project", p)))
            .unwrap_or_default();
        let gql = format!(
            r#"{{ Get {{ {collection}(hybrid: {{ query: "{}", alpha: {alpha} }}, limit: {limit}{filter}) {{ {selection} _additional {{ score }} }} }} }}"#,
            escape_gql(query)
        );

        let body = self.graphql(gql).await?;
        let hits = body
            .pointer(&format!("/data/Get/{collection}"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut ranked = Vec::with_capacity(hits.len());
        for hit in hits {
            let Value::Object(mut map) = hit else {
                continue;
            };
            let score = map
                .remove("_additional")
                .and_then(|a| a.get("score").cloned())
                .and_then(parse_score)
                .unwrap_or(0.0);
            ranked.push(RankedHit {
                score,
                collection: collection.to_string(),
                properties: map,
            });
        }
        Ok(ranked)
    }
}

fn connection_error(e: reqwest::Error) -> StoreError {
    StoreError::ConnectionFailed(e.to_string())
}

/// Hybrid scores arrive as JSON strings in `_additional`
fn parse_score(value: Value) -> Option<f32> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        _ => None,
    }
}

fn escape_gql(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}
