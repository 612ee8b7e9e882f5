//! Command-line interface.
//!
//! Thin orchestration over the library: each subcommand wires config,
//! registry, store, and pipeline together and prints a human-readable
//! summary. All real behavior lives in the library modules.

use crate::config::{Config, ProjectsManifest};
use crate::daemon::{self, Daemon};
use crate::error::{IndexerError, RegistryError, StoreError};
use crate::migrate::{CollectionAction, ensure_schema};
use crate::paths::PlatformPaths;
use crate::pipeline::Pipeline;
use crate::ranker::{self, RankerParams};
use crate::registry;
use crate::store::{VectorIndex, WeaviateIndex};
use crate::types::{RankedHit, RecordKind};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "project-indexer", version, about = "Index source trees into a vector store")]
pub struct Cli {
    /// Path to a config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory holding the projects to manage
    #[arg(long, global = true, env = "PROJECT_INDEXER_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover projects under the root and persist the manifest
    Discover,

    /// Index one project, or every registered project
    Index {
        /// Project name from the manifest
        #[arg(long, conflicts_with = "all")]
        project: Option<String>,

        /// Index all registered projects
        #[arg(long)]
        all: bool,
    },

    /// Watch registered projects in the foreground with a short debounce
    Watch,

    /// Background daemon lifecycle
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },

    /// Search the index and apply the gap cutoff
    Search {
        query: String,

        /// Restrict to one project
        #[arg(long)]
        project: Option<String>,

        /// Restrict to one record kind; every kind is searched by default
        #[arg(long, value_enum)]
        kind: Option<SearchKind>,

        /// Scale the gap threshold by the score spread
        #[arg(long)]
        adaptive: bool,
    },

    /// Reconcile store collections with the expected schema
    Migrate {
        /// Rebuild collections even when their field sets already match
        #[arg(long)]
        force: bool,
    },

    /// Per-collection record counts
    Stats,
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Run the daemon with the long debounce window
    Start,
    /// Ask a running daemon to shut down
    Stop,
    /// Show liveness and recent log lines
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchKind {
    Code,
    Types,
    Docs,
    Memory,
}

impl SearchKind {
    fn record_kind(self) -> RecordKind {
        match self {
            SearchKind::Code => RecordKind::CodeChunk,
            SearchKind::Types => RecordKind::TypeDefinition,
            SearchKind::Docs => RecordKind::DocChunk,
            SearchKind::Memory => RecordKind::ConversationMemory,
        }
    }
}

pub async fn run() -> Result<(), IndexerError> {
    let cli = Cli::parse();
    init_tracing(&cli.command)?;

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default()?,
    };
    config.apply_env_overrides();
    config.validate()?;

    let manifest_path = PlatformPaths::default_manifest_path();

    match cli.command {
        Command::Discover => {
            let root = require_root(cli.root)?;
            let manifest = registry::discover_and_persist(
                &root,
                config.indexing.min_file_count,
                &manifest_path,
            )?;
            println!("Discovered {} projects:", manifest.projects.len());
            for project in &manifest.projects {
                println!(
                    "  {:<24} {:?} ({} files)",
                    project.name, project.language_kind, project.file_count
                );
            }
        }

        Command::Index { project, all } => {
            let index = connect(&config).await?;
            ensure_schema(index.as_ref(), &PlatformPaths::snapshot_dir(), false).await?;
            let manifest = ProjectsManifest::load_or_default(&manifest_path)?;
            let pipeline = Arc::new(Pipeline::new(
                Arc::clone(&index),
                config.indexing.clone(),
            ));

            if all {
                let results = pipeline
                    .ingest_all(&manifest.projects, &manifest.global_exclude)
                    .await;
                let mut failures = 0;
                for (name, result) in &results {
                    match result {
                        Ok(report) => println!(
                            "  {:<24} {} records ({} failed)",
                            name, report.inserted, report.failed
                        ),
                        Err(e) => {
                            failures += 1;
                            println!("  {name:<24} error: {e}");
                        }
                    }
                }
                if failures > 0 {
                    return Err(IndexerError::other(format!(
                        "{failures} of {} projects failed to index",
                        results.len()
                    )));
                }
            } else {
                let name = project.ok_or_else(|| {
                    IndexerError::other("pass --project NAME or --all")
                })?;
                let project = manifest
                    .project(&name)
                    .ok_or_else(|| RegistryError::UnknownProject(name.clone()))?;
                let report = pipeline
                    .ingest_project(project, &manifest.global_exclude)
                    .await?;
                println!(
                    "Indexed '{}': {} records from {} files ({} failed, {} skipped)",
                    name,
                    report.inserted,
                    report.files_seen,
                    report.failed,
                    report.files_skipped
                );
            }
        }

        Command::Watch => {
            let root = require_root(cli.root)?;
            let index = connect(&config).await?;
            ensure_schema(index.as_ref(), &PlatformPaths::snapshot_dir(), false).await?;
            let pipeline = Arc::new(Pipeline::new(
                Arc::clone(&index),
                config.indexing.clone(),
            ));
            Daemon::new(config, root, manifest_path, pipeline)
                .run(
                    &PlatformPaths::daemon_pid_path(),
                    &PlatformPaths::daemon_stop_path(),
                    true,
                )
                .await?;
        }

        Command::Daemon { action } => match action {
            DaemonAction::Start => {
                let root = require_root(cli.root)?;
                let index = connect(&config).await?;
                ensure_schema(index.as_ref(), &PlatformPaths::snapshot_dir(), false).await?;
                let pipeline = Arc::new(Pipeline::new(
                    Arc::clone(&index),
                    config.indexing.clone(),
                ));
                Daemon::new(config, root, manifest_path, pipeline)
                    .run(
                        &PlatformPaths::daemon_pid_path(),
                        &PlatformPaths::daemon_stop_path(),
                        false,
                    )
                    .await?;
            }
            DaemonAction::Stop => {
                let pid = daemon::request_stop(
                    &PlatformPaths::daemon_pid_path(),
                    &PlatformPaths::daemon_stop_path(),
                )?;
                println!("Stop requested for daemon (pid {pid})");
            }
            DaemonAction::Status => {
                let status = daemon::status(
                    &PlatformPaths::daemon_pid_path(),
                    &PlatformPaths::daemon_log_path(),
                    20,
                );
                match status.pid {
                    Some(pid) => println!("Daemon running (pid {pid})"),
                    None => println!("Daemon not running"),
                }
                if !status.log_tail.is_empty() {
                    println!("\nRecent log:");
                    for line in &status.log_tail {
                        println!("  {line}");
                    }
                }
            }
        },

        Command::Search {
            query,
            project,
            kind,
            adaptive,
        } => {
            let index = connect(&config).await?;
            let kinds: Vec<RecordKind> = match kind {
                Some(kind) => vec![kind.record_kind()],
                None => RecordKind::ALL.to_vec(),
            };
            let hits = search_collections(
                index.as_ref(),
                &kinds,
                &query,
                config.search.limit,
                config.search.alpha,
                project.as_deref(),
            )
            .await?;

            let params = RankerParams {
                max_results: config.search.limit,
                ..RankerParams::default()
            };
            let hits = if adaptive {
                ranker::cut_adaptive(hits, params)
            } else {
                ranker::cut(hits, params)
            };

            if hits.is_empty() {
                println!("No results");
            }
            for hit in &hits {
                let title = hit
                    .properties
                    .get("name")
                    .or_else(|| hit.properties.get("title"))
                    .or_else(|| hit.properties.get("sessionId"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("?");
                let source = hit
                    .properties
                    .get("sourcePath")
                    .and_then(|v| v.as_str())
                    .unwrap_or("?");
                let project = hit
                    .properties
                    .get("project")
                    .and_then(|v| v.as_str())
                    .unwrap_or("?");
                println!(
                    "  {:.3}  {title}  [{}] ({project}: {source})",
                    hit.score, hit.collection
                );
            }
        }

        Command::Migrate { force } => {
            let index = connect(&config).await?;
            let report =
                ensure_schema(index.as_ref(), &PlatformPaths::snapshot_dir(), force).await?;
            for (collection, action) in &report.actions {
                match action {
                    CollectionAction::UpToDate => println!("  {collection:<22} up to date"),
                    CollectionAction::Created => println!("  {collection:<22} created"),
                    CollectionAction::Migrated { reimported, failed } => println!(
                        "  {collection:<22} rebuilt ({reimported} re-imported, {failed} failed)"
                    ),
                }
            }
        }

        Command::Stats => {
            let index = connect(&config).await?;
            for kind in RecordKind::ALL {
                let count = index.count(kind.collection()).await.unwrap_or(0);
                println!("  {:<22} {}", kind.collection(), count);
            }
        }
    }

    Ok(())
}

/// Query each collection and merge the hits descending by score
async fn search_collections(
    index: &dyn VectorIndex,
    kinds: &[RecordKind],
    query: &str,
    limit: usize,
    alpha: f32,
    project: Option<&str>,
) -> Result<Vec<RankedHit>, StoreError> {
    let mut hits = Vec::new();
    for kind in kinds {
        hits.extend(
            index
                .search(kind.collection(), query, limit, alpha, project)
                .await?,
        );
    }
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(hits)
}

/// Route tracing output to stderr, or to the daemon log file for a
/// backgrounded daemon so `daemon status` can tail it.
fn init_tracing(command: &Command) -> Result<(), IndexerError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if let Command::Daemon {
        action: DaemonAction::Start,
    } = command
    {
        let log_path = PlatformPaths::daemon_log_path();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IndexerError::other(format!("cannot create log dir: {e}")))?;
        }
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                IndexerError::other(format!("cannot open {}: {e}", log_path.display()))
            })?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(log))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Connect to the store and verify readiness before doing any work
async fn connect(config: &Config) -> Result<Arc<dyn VectorIndex>, IndexerError> {
    let index = WeaviateIndex::new(&config.store.url, config.store.timeout_secs)?;
    if !index.is_ready().await? {
        return Err(StoreError::NotReady(config.store.url.clone()).into());
    }
    Ok(Arc::new(index))
}

fn require_root(root: Option<PathBuf>) -> Result<PathBuf, IndexerError> {
    root.ok_or_else(|| IndexerError::other("pass --root or set PROJECT_INDEXER_ROOT"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        Cli::try_parse_from(["project-indexer", "discover", "--root", "/code"]).unwrap();
        Cli::try_parse_from(["project-indexer", "index", "--project", "demo"]).unwrap();
        Cli::try_parse_from(["project-indexer", "index", "--all"]).unwrap();
        Cli::try_parse_from(["project-indexer", "daemon", "status"]).unwrap();
        Cli::try_parse_from([
            "project-indexer",
            "search",
            "parse config",
            "--kind",
            "docs",
            "--adaptive",
        ])
        .unwrap();
    }

    #[test]
    fn test_index_project_conflicts_with_all() {
        assert!(
            Cli::try_parse_from(["project-indexer", "index", "--project", "demo", "--all"])
                .is_err()
        );
    }

    #[test]
    fn test_search_kind_maps_to_collections() {
        assert_eq!(SearchKind::Code.record_kind(), RecordKind::CodeChunk);
        assert_eq!(SearchKind::Memory.record_kind(), RecordKind::ConversationMemory);
    }

    #[test]
    fn test_search_kind_is_optional() {
        let cli = Cli::try_parse_from(["project-indexer", "search", "login flow"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Search { kind: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_search_without_kind_merges_all_collections() {
        use crate::store::MemoryIndex;
        use serde_json::{Map, json};

        let index = MemoryIndex::new();
        for kind in RecordKind::ALL {
            index.create_collection(&kind.schema()).await.unwrap();
        }

        let mut code = Map::new();
        code.insert("content".into(), json!("fn validate_token() checks the session"));
        code.insert("project".into(), json!("backend"));
        index.insert("CodeChunk", "c1", &code).await.unwrap();

        let mut doc = Map::new();
        doc.insert("content".into(), json!("session notes"));
        doc.insert("project".into(), json!("backend"));
        index.insert("DocChunk", "d1", &doc).await.unwrap();

        let hits =
            search_collections(&index, &RecordKind::ALL, "validate session", 10, 0.7, None)
                .await
                .unwrap();

        let collections: Vec<&str> = hits.iter().map(|h| h.collection.as_str()).collect();
        assert!(collections.contains(&"CodeChunk"));
        assert!(collections.contains(&"DocChunk"));
        // Merged list is ordered by score across collections
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(hits[0].collection, "CodeChunk");
    }
}
