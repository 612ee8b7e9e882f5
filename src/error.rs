/// Centralized error types for project-indexer using thiserror
///
/// Provides domain-specific error types for better error handling and user-facing messages.
use thiserror::Error;

/// Main error type for the indexing system
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Daemon error: {0}")]
    Daemon(#[from] DaemonError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors related to the external vector index
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to connect to vector index: {0}")]
    ConnectionFailed(String),

    #[error("Vector index is not ready at {0}")]
    NotReady(String),

    #[error("Failed to create collection '{collection}': {reason}")]
    CollectionCreationFailed { collection: String, reason: String },

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Failed to insert records: {0}")]
    InsertFailed(String),

    #[error("Failed to delete records: {0}")]
    DeleteFailed(String),

    #[error("Failed to query vector index: {0}")]
    QueryFailed(String),

    #[error("Vector index returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors related to chunk extraction
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to read file '{file}': {reason}")]
    FileReadFailed { file: String, reason: String },

    #[error("File is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("Failed to parse '{file}': {reason}")]
    ParseFailed { file: String, reason: String },

    #[error("Unsupported content kind: {0}")]
    UnsupportedKind(String),
}

/// Errors related to project discovery
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Discovery root not found: {0}")]
    RootNotFound(String),

    #[error("Discovery root is not a directory: {0}")]
    NotADirectory(String),

    #[error("Project root is unreadable: {0}")]
    UnreadableRoot(String),

    #[error("Failed to persist projects manifest: {0}")]
    PersistFailed(String),

    #[error("Failed to load projects manifest: {0}")]
    ManifestLoadFailed(String),

    #[error("Unknown project: {0}")]
    UnknownProject(String),
}

/// Errors related to schema migration
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Failed to export records from '{collection}': {reason}")]
    ExportFailed { collection: String, reason: String },

    #[error("Failed to recreate collection '{collection}': {reason}")]
    RecreateFailed { collection: String, reason: String },

    #[error("Failed to write export snapshot: {0}")]
    SnapshotFailed(String),
}

/// Errors related to the watch daemon
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Daemon is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("Daemon is not running")]
    NotRunning,

    #[error("Failed to write pid file: {0}")]
    PidFileFailed(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

// Conversion from anyhow::Error to IndexerError
impl From<anyhow::Error> for IndexerError {
    fn from(err: anyhow::Error) -> Self {
        IndexerError::Other(format!("{:#}", err))
    }
}

impl IndexerError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        IndexerError::Other(msg.into())
    }

    /// Check if this is a user error (bad input, missing config) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            IndexerError::Config(_)
                | IndexerError::Registry(RegistryError::UnknownProject(_))
                | IndexerError::Registry(RegistryError::RootNotFound(_))
        )
    }

    /// Check if this error is retryable on a later run
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IndexerError::Store(StoreError::ConnectionFailed(_))
                | IndexerError::Store(StoreError::NotReady(_))
                | IndexerError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexerError::Registry(RegistryError::RootNotFound("/missing".to_string()));
        assert_eq!(
            err.to_string(),
            "Registry error: Discovery root not found: /missing"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: IndexerError = io_err.into();
        assert!(matches!(err, IndexerError::Io(_)));
    }

    #[test]
    fn test_error_from_anyhow() {
        let anyhow_err = anyhow::anyhow!("test error");
        let err: IndexerError = anyhow_err.into();
        assert!(matches!(err, IndexerError::Other(_)));
    }

    #[test]
    fn test_is_retryable() {
        let retryable = IndexerError::Store(StoreError::ConnectionFailed("refused".to_string()));
        assert!(retryable.is_retryable());

        let not_retryable = IndexerError::Extract(ExtractError::InvalidUtf8("x.bin".to_string()));
        assert!(!not_retryable.is_retryable());
    }

    #[test]
    fn test_is_user_error() {
        let user_err = IndexerError::Registry(RegistryError::UnknownProject("nope".to_string()));
        assert!(user_err.is_user_error());

        let system_err = IndexerError::Store(StoreError::QueryFailed("500".to_string()));
        assert!(!system_err.is_user_error());
    }

    #[test]
    fn test_store_error_collection_creation() {
        let err = StoreError::CollectionCreationFailed {
            collection: "CodeChunk".to_string(),
            reason: "already exists".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create collection 'CodeChunk': already exists"
        );
    }

    #[test]
    fn test_daemon_error_already_running() {
        let err = DaemonError::AlreadyRunning(4242);
        assert_eq!(err.to_string(), "Daemon is already running (pid 4242)");
    }
}
