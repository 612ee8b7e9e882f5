//! Ingestion pipeline: project source trees into the vector index.
//!
//! Per-project ingestion is clear-then-insert: all code, type, and document
//! records owned by the project are deleted first, then the tree is walked,
//! extracted, and flushed in batches. Delivery is at-least-once; a batch that
//! partially fails leaves its successful records in place and the failures
//! are re-attempted on the next run. Conversation memories are ingested
//! one at a time and deduplicated by session id instead of being cleared.

use crate::config::IndexingConfig;
use crate::error::{IndexerError, RegistryError, StoreError};
use crate::extract::{DOC_EXTENSIONS, SOURCE_EXTENSIONS, extract_file};
use crate::glob_utils::{compile_patterns, matches_any_matcher, matches_any_pattern};
use crate::registry::DISCOVERY_DENYLIST;
use crate::store::{BatchOutcome, StoredObject, VectorIndex};
use crate::types::{Project, Record, RecordKind, RecordPayload};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use walkdir::WalkDir;

/// Record kinds cleared and refilled by a project ingest. ConversationMemory
/// is excluded: memories belong to sessions, not to source trees.
const PROJECT_KINDS: [RecordKind; 3] = [
    RecordKind::CodeChunk,
    RecordKind::TypeDefinition,
    RecordKind::DocChunk,
];

/// Outcome of one project ingest
#[derive(Debug, Default, Clone)]
pub struct IngestReport {
    pub project: String,
    pub files_seen: usize,
    pub files_skipped: usize,
    pub records_extracted: usize,
    pub inserted: usize,
    pub failed: usize,
    pub deleted: u64,
    pub errors: Vec<String>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errors.is_empty()
    }
}

/// What happened to a session memory offered for ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Inserted,
    AlreadyIndexed,
}

pub struct Pipeline {
    index: Arc<dyn VectorIndex>,
    config: IndexingConfig,
}

impl Pipeline {
    pub fn new(index: Arc<dyn VectorIndex>, config: IndexingConfig) -> Self {
        Self { index, config }
    }

    /// Re-index one project from scratch.
    ///
    /// A missing or unreadable root skips the project before anything is
    /// cleared, so a vanished checkout keeps its existing records.
    /// Extraction failures skip the file and continue; store connection
    /// failures abort the run.
    pub async fn ingest_project(
        &self,
        project: &Project,
        global_exclude: &[String],
    ) -> Result<IngestReport, IndexerError> {
        if std::fs::read_dir(&project.root_path).is_err() {
            tracing::warn!(
                "Skipping project '{}': root {} is missing or unreadable",
                project.name,
                project.root_path.display()
            );
            return Err(RegistryError::UnreadableRoot(
                project.root_path.display().to_string(),
            )
            .into());
        }

        let mut report = IngestReport {
            project: project.name.clone(),
            ..Default::default()
        };

        for kind in PROJECT_KINDS {
            report.deleted += self
                .index
                .delete_where(kind.collection(), "project", &project.name)
                .await?;
        }
        tracing::info!(
            "Cleared {} stale records for project '{}'",
            report.deleted,
            project.name
        );

        let mut exclude = global_exclude.to_vec();
        exclude.extend(project.exclude_patterns.iter().cloned());
        let exclude_matchers = compile_patterns(&exclude);

        let mut buffers: HashMap<RecordKind, Vec<StoredObject>> = HashMap::new();
        let mut outcome = BatchOutcome::default();

        for entry in WalkDir::new(&project.root_path)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && (name.starts_with('.') || DISCOVERY_DENYLIST.contains(&name.as_ref())))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_lowercase();
            if !SOURCE_EXTENSIONS.contains(&extension.as_str())
                && !DOC_EXTENSIONS.contains(&extension.as_str())
            {
                continue;
            }

            let relative = path
                .strip_prefix(&project.root_path)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            if matches_any_matcher(&relative, &exclude_matchers) {
                continue;
            }
            if !project.include_patterns.is_empty()
                && !matches_any_pattern(&relative, &project.include_patterns)
            {
                continue;
            }

            report.files_seen += 1;
            if entry
                .metadata()
                .map(|m| m.len() as usize > self.config.max_file_size)
                .unwrap_or(true)
            {
                report.files_skipped += 1;
                tracing::debug!("Skipping oversized or unreadable file {}", relative);
                continue;
            }

            let records = match extract_file(
                path,
                &project.root_path,
                &project.name,
                self.config.max_chunk_chars,
            ) {
                Ok(records) => records,
                Err(e) => {
                    report.files_skipped += 1;
                    report.errors.push(format!("{relative}: {e}"));
                    tracing::warn!("Extraction failed for {}: {}", relative, e);
                    continue;
                }
            };

            report.records_extracted += records.len();
            for record in records {
                let kind = record.kind();
                let buffer = buffers.entry(kind).or_default();
                buffer.push(StoredObject {
                    id: record.id(),
                    properties: record.to_properties(),
                });
                if buffer.len() >= self.config.batch_size {
                    let batch = std::mem::take(buffer);
                    outcome.merge(self.flush(kind, batch).await?);
                }
            }
        }

        for kind in PROJECT_KINDS {
            if let Some(buffer) = buffers.remove(&kind)
                && !buffer.is_empty()
            {
                outcome.merge(self.flush(kind, buffer).await?);
            }
        }

        report.inserted = outcome.succeeded;
        report.failed = outcome.failed;
        report.errors.extend(outcome.errors);

        tracing::info!(
            "Ingested project '{}': {} records from {} files ({} failed, {} skipped)",
            project.name,
            report.inserted,
            report.files_seen,
            report.failed,
            report.files_skipped
        );
        Ok(report)
    }

    /// Ingest several projects with bounded concurrency
    pub async fn ingest_all(
        self: &Arc<Self>,
        projects: &[Project],
        global_exclude: &[String],
    ) -> Vec<(String, Result<IngestReport, IndexerError>)> {
        let concurrency = self.config.ingest_concurrency.max(1);
        futures::stream::iter(projects.iter().cloned())
            .map(|project| {
                let pipeline = Arc::clone(self);
                let exclude = global_exclude.to_vec();
                async move {
                    let result = pipeline.ingest_project(&project, &exclude).await;
                    (project.name, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    /// Ingest one conversation memory, skipping sessions already present.
    ///
    /// The existence check makes repeated offers of the same session cheap;
    /// the deterministic id makes the rare duplicate insert harmless.
    pub async fn ingest_session(&self, record: &Record) -> Result<SessionOutcome, IndexerError> {
        let RecordPayload::ConversationMemory { session_id, .. } = &record.payload else {
            return Err(IndexerError::other(
                "ingest_session requires a conversation memory record",
            ));
        };

        let collection = RecordKind::ConversationMemory.collection();
        if self
            .index
            .exists_where(collection, "sessionId", session_id)
            .await?
        {
            tracing::debug!("Session {} already indexed, skipping", session_id);
            return Ok(SessionOutcome::AlreadyIndexed);
        }

        self.index
            .insert(collection, &record.id(), &record.to_properties())
            .await?;
        tracing::info!("Indexed session memory {}", session_id);
        Ok(SessionOutcome::Inserted)
    }

    /// Flush one batch. A rejected batch is counted as failed and the run
    /// continues; only a lost store connection aborts.
    async fn flush(
        &self,
        kind: RecordKind,
        batch: Vec<StoredObject>,
    ) -> Result<BatchOutcome, StoreError> {
        match self.index.insert_batch(kind.collection(), &batch).await {
            Ok(outcome) => {
                if outcome.failed > 0 {
                    tracing::warn!(
                        "Flush of {} {} records: {} failed",
                        batch.len(),
                        kind.collection(),
                        outcome.failed
                    );
                } else {
                    tracing::debug!("Flushed {} {} records", batch.len(), kind.collection());
                }
                Ok(outcome)
            }
            Err(e @ StoreError::ConnectionFailed(_)) => Err(e),
            Err(e) => {
                tracing::warn!(
                    "Batch of {} {} records skipped: {}",
                    batch.len(),
                    kind.collection(),
                    e
                );
                Ok(BatchOutcome {
                    succeeded: 0,
                    failed: batch.len(),
                    errors: vec![format!("{} batch: {e}", kind.collection())],
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::ensure_schema;
    use crate::store::MemoryIndex;
    use crate::types::LanguageKind;
    use std::fs;
    use std::path::Path;

    fn touch(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    async fn ready_pipeline(index: Arc<MemoryIndex>) -> Pipeline {
        let snapshots = tempfile::tempdir().unwrap();
        ensure_schema(index.as_ref(), snapshots.path(), false).await.unwrap();
        Pipeline::new(index, IndexingConfig::default())
    }

    fn project(name: &str, root: &Path) -> Project {
        Project {
            name: name.to_string(),
            root_path: root.to_path_buf(),
            language_kind: LanguageKind::Rust,
            include_patterns: vec![],
            exclude_patterns: vec![],
            priority: 1,
            file_count: 0,
        }
    }

    #[tokio::test]
    async fn test_ingest_extracts_code_and_docs() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            &dir.path().join("src/lib.rs"),
            "pub fn alpha() {\n    beta();\n}\n\nfn beta() {}\n",
        );
        touch(&dir.path().join("README.md"), "# Readme\n\nSome intro text.");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = ready_pipeline(Arc::clone(&index)).await;
        let report = pipeline
            .ingest_project(&project("demo", dir.path()), &[])
            .await
            .unwrap();

        assert_eq!(report.files_seen, 2);
        assert_eq!(report.inserted, 3);
        assert!(report.is_clean());
        assert_eq!(index.count("CodeChunk").await.unwrap(), 2);
        assert_eq!(index.count("DocChunk").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("main.rs"), "fn main() {}\n");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = ready_pipeline(Arc::clone(&index)).await;
        let proj = project("demo", dir.path());

        pipeline.ingest_project(&proj, &[]).await.unwrap();
        let first = index.count("CodeChunk").await.unwrap();
        let report = pipeline.ingest_project(&proj, &[]).await.unwrap();

        assert_eq!(index.count("CodeChunk").await.unwrap(), first);
        assert_eq!(report.deleted, first);
    }

    #[tokio::test]
    async fn test_vanished_root_skips_without_clearing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("checkout");
        touch(&root.join("a.rs"), "fn a() {}\n");
        touch(&root.join("b.rs"), "fn b() {}\n");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = ready_pipeline(Arc::clone(&index)).await;
        let proj = project("demo", &root);

        pipeline.ingest_project(&proj, &[]).await.unwrap();
        assert_eq!(index.count("CodeChunk").await.unwrap(), 2);

        // The checkout disappears between runs; its records must survive
        fs::remove_dir_all(&root).unwrap();
        let err = pipeline.ingest_project(&proj, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Registry(crate::error::RegistryError::UnreadableRoot(_))
        ));
        assert_eq!(index.count("CodeChunk").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rejected_batch_is_counted_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("one.rs"), "fn one() {}\n");
        touch(&dir.path().join("README.md"), "# Readme\n\nSome intro text.");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = ready_pipeline(Arc::clone(&index)).await;
        index.fail_batches("CodeChunk");

        let report = pipeline
            .ingest_project(&project("demo", dir.path()), &[])
            .await
            .unwrap();

        // The code batch failed wholesale but the doc batch went through
        assert_eq!(report.failed, 1);
        assert_eq!(report.inserted, 1);
        assert!(!report.errors.is_empty());
        assert_eq!(index.count("CodeChunk").await.unwrap(), 0);
        assert_eq!(index.count("DocChunk").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lost_connection_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("one.rs"), "fn one() {}\n");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = ready_pipeline(Arc::clone(&index)).await;
        index.sever();

        let err = pipeline
            .ingest_project(&project("demo", dir.path()), &[])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_clear_is_scoped_to_project() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        touch(&dir_a.path().join("a.rs"), "fn from_a() {}\n");
        touch(&dir_b.path().join("b.rs"), "fn from_b() {}\n");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = ready_pipeline(Arc::clone(&index)).await;

        pipeline
            .ingest_project(&project("alpha", dir_a.path()), &[])
            .await
            .unwrap();
        pipeline
            .ingest_project(&project("beta", dir_b.path()), &[])
            .await
            .unwrap();
        // Re-ingesting alpha must not touch beta's records
        pipeline
            .ingest_project(&project("alpha", dir_a.path()), &[])
            .await
            .unwrap();

        assert!(
            index
                .exists_where("CodeChunk", "project", "beta")
                .await
                .unwrap()
        );
        assert!(
            index
                .exists_where("CodeChunk", "project", "alpha")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_exclude_patterns_and_denylist() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("keep.rs"), "fn keep() {}\n");
        touch(&dir.path().join("generated/skip.rs"), "fn skip() {}\n");
        touch(&dir.path().join("node_modules/dep/x.js"), "function x() {}\n");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = ready_pipeline(Arc::clone(&index)).await;
        let report = pipeline
            .ingest_project(
                &project("demo", dir.path()),
                &["generated/**".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(report.files_seen, 1);
        assert_eq!(index.count("CodeChunk").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_partial_batch_failure_keeps_successes() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("one.rs"), "fn one() {}\n");
        touch(&dir.path().join("two.rs"), "fn two() {}\n");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = ready_pipeline(Arc::clone(&index)).await;

        // Poison one record's deterministic id
        let poisoned = Record {
            project: "demo".to_string(),
            source_path: "two.rs".to_string(),
            content: String::new(),
            payload: RecordPayload::CodeChunk {
                name: "two".to_string(),
                chunk_type: "function".to_string(),
                line_start: 1,
                line_end: 1,
                signature: String::new(),
                exported: false,
                is_async: false,
                imports: vec![],
                exports: vec![],
                used_types: vec![],
                complexity: 1,
            },
        };
        index.poison(&poisoned.id());

        let report = pipeline
            .ingest_project(&project("demo", dir.path()), &[])
            .await
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.is_clean());
        assert!(
            index
                .exists_where("CodeChunk", "sourcePath", "one.rs")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_session_ingest_is_once_per_session() {
        let index = Arc::new(MemoryIndex::new());
        let pipeline = ready_pipeline(Arc::clone(&index)).await;

        let memory = Record {
            project: "sessions".to_string(),
            source_path: "2025/sess-9.jsonl".to_string(),
            content: "worked on the parser".to_string(),
            payload: RecordPayload::ConversationMemory {
                session_id: "sess-9".to_string(),
                summary: "worked on the parser".to_string(),
                topics: vec!["parser".to_string()],
                timestamp: "2025-06-01T10:00:00Z".to_string(),
                agent_type: "main".to_string(),
                model: "m1".to_string(),
                cost: 0.42,
                input_tokens: 100,
                output_tokens: 50,
                parent_session_id: None,
            },
        };

        assert_eq!(
            pipeline.ingest_session(&memory).await.unwrap(),
            SessionOutcome::Inserted
        );
        assert_eq!(
            pipeline.ingest_session(&memory).await.unwrap(),
            SessionOutcome::AlreadyIndexed
        );
        assert_eq!(index.count("ConversationMemory").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_memory_record_rejected_by_session_ingest() {
        let index = Arc::new(MemoryIndex::new());
        let pipeline = ready_pipeline(index).await;

        let record = Record {
            project: "demo".to_string(),
            source_path: "a.md".to_string(),
            content: "text".to_string(),
            payload: RecordPayload::DocChunk {
                title: "a".to_string(),
                section: String::new(),
                chunk_index: 0,
            },
        };
        assert!(pipeline.ingest_session(&record).await.is_err());
    }

    #[tokio::test]
    async fn test_ingest_all_runs_every_project() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        touch(&dir_a.path().join("a.rs"), "fn a() {}\n");
        touch(&dir_b.path().join("b.rs"), "fn b() {}\n");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = Arc::new(ready_pipeline(Arc::clone(&index)).await);

        let results = pipeline
            .ingest_all(
                &[project("alpha", dir_a.path()), project("beta", dir_b.path())],
                &[],
            )
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(index.count("CodeChunk").await.unwrap(), 2);
    }
}
