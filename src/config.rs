/// Configuration system for project-indexer
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
///
/// Also defines the persisted projects manifest, the single piece of
/// cross-process shared state. Every component reads it at startup; only the
/// registry writes it, and always as a wholesale overwrite.
use crate::error::{ConfigError, IndexerError, RegistryError};
use crate::types::Project;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// External vector index configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Indexing configuration
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Watch daemon configuration
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Search and result-ranking configuration
    #[serde(default)]
    pub search: SearchConfig,
}

/// External vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Weaviate base URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Records per flush batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum characters per document chunk
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Maximum file size to index (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Minimum source-file count for a directory to register as a project
    #[serde(default = "default_min_file_count")]
    pub min_file_count: usize,

    /// Concurrent per-project ingests for `index --all`
    #[serde(default = "default_ingest_concurrency")]
    pub ingest_concurrency: usize,
}

/// Watch daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Debounce window in seconds for background daemon mode
    #[serde(default = "default_daemon_debounce")]
    pub debounce_secs: u64,

    /// Debounce window in seconds for interactive watch mode
    #[serde(default = "default_watch_debounce")]
    pub watch_debounce_secs: u64,

    /// Hours between automatic re-discovery runs
    #[serde(default = "default_rediscovery_hours")]
    pub rediscovery_hours: u64,

    /// Maximum number of projects watched concurrently
    #[serde(default = "default_max_watched")]
    pub max_watched: usize,
}

/// Search and result-ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default result limit requested from the store
    #[serde(default = "default_result_limit")]
    pub limit: usize,

    /// Hybrid blend: 0 = keyword only, 1 = semantic only
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

// Default value functions
fn default_store_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_store_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    50
}

fn default_max_chunk_chars() -> usize {
    2000
}

fn default_max_file_size() -> usize {
    1_048_576 // 1 MB
}

fn default_min_file_count() -> usize {
    3
}

fn default_ingest_concurrency() -> usize {
    4
}

fn default_daemon_debounce() -> u64 {
    30
}

fn default_watch_debounce() -> u64 {
    5
}

fn default_rediscovery_hours() -> u64 {
    6
}

fn default_max_watched() -> usize {
    12
}

fn default_result_limit() -> usize {
    10
}

fn default_alpha() -> f32 {
    0.7
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            timeout_secs: default_store_timeout(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_chunk_chars: default_max_chunk_chars(),
            max_file_size: default_max_file_size(),
            min_file_count: default_min_file_count(),
            ingest_concurrency: default_ingest_concurrency(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_daemon_debounce(),
            watch_debounce_secs: default_watch_debounce(),
            rediscovery_hours: default_rediscovery_hours(),
            max_watched: default_max_watched(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_result_limit(),
            alpha: default_alpha(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, IndexerError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location or fall back to defaults
    pub fn load_or_default() -> Result<Self, IndexerError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), IndexerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.indexing.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "indexing.batch_size".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.indexing.max_chunk_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "indexing.max_chunk_chars".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.indexing.ingest_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "indexing.ingest_concurrency".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if !(0.0..=1.0).contains(&self.search.alpha) {
            return Err(ConfigError::InvalidValue {
                key: "search.alpha".to_string(),
                reason: format!("must be between 0.0 and 1.0, got {}", self.search.alpha),
            }
            .into());
        }

        if self.daemon.max_watched == 0 {
            return Err(ConfigError::InvalidValue {
                key: "daemon.max_watched".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PROJECT_INDEXER_STORE_URL") {
            self.store.url = url;
        }

        if let Ok(batch_size) = std::env::var("PROJECT_INDEXER_BATCH_SIZE")
            && let Ok(size) = batch_size.parse()
        {
            self.indexing.batch_size = size;
        }

        if let Ok(debounce) = std::env::var("PROJECT_INDEXER_DEBOUNCE_SECS")
            && let Ok(secs) = debounce.parse()
        {
            self.daemon.debounce_secs = secs;
        }

        if let Ok(alpha) = std::env::var("PROJECT_INDEXER_ALPHA")
            && let Ok(a) = alpha.parse()
        {
            self.search.alpha = a;
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, IndexerError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

/// Auto-discovery bookkeeping stored alongside the project list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoDiscovery {
    pub enabled: bool,
    /// ISO-8601 timestamp of the last discovery run
    pub last_run: String,
    pub project_count: usize,
}

impl Default for AutoDiscovery {
    fn default() -> Self {
        Self {
            enabled: true,
            last_run: String::new(),
            project_count: 0,
        }
    }
}

/// The persisted projects document, written only by the registry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectsManifest {
    pub projects: Vec<Project>,
    /// Exclude patterns applied to every project
    #[serde(default)]
    pub global_exclude: Vec<String>,
    #[serde(default)]
    pub auto_discovery: AutoDiscovery,
}

impl ProjectsManifest {
    /// Load the manifest from disk
    pub fn load(path: &Path) -> Result<Self, IndexerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::ManifestLoadFailed(format!("{}: {}", path.display(), e))
        })?;
        let manifest = serde_json::from_str(&content)
            .map_err(|e| RegistryError::ManifestLoadFailed(format!("{}: {}", path.display(), e)))?;
        Ok(manifest)
    }

    /// Load the manifest, or an empty one if the file does not exist yet
    pub fn load_or_default(path: &Path) -> Result<Self, IndexerError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Persist the manifest, replacing any previous content in full
    pub fn save(&self, path: &Path) -> Result<(), IndexerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RegistryError::PersistFailed(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RegistryError::PersistFailed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| RegistryError::PersistFailed(e.to_string()))?;
        Ok(())
    }

    /// Look up a project by name
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }
}
