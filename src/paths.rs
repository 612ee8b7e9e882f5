/// Centralized platform-specific path computation
///
/// Provides consistent path handling across Windows, macOS, and Linux following
/// XDG Base Directory specification on Unix-like systems.
use std::path::PathBuf;

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Get the appropriate data directory for the current platform
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_DATA_HOME or ~/.local/share
    pub fn data_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Application Support"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    std::env::var("HOME").map(|home| PathBuf::from(home).join(".local/share"))
                })
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Get the appropriate config directory for the current platform
    ///
    /// - Windows: %APPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_CONFIG_HOME or ~/.config
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Application Support"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Get project-specific data directory
    ///
    /// Returns: {data_dir}/project-indexer
    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join("project-indexer")
    }

    /// Get project-specific config directory
    ///
    /// Returns: {config_dir}/project-indexer
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join("project-indexer")
    }

    /// Get default config file path
    ///
    /// Returns: {config_dir}/project-indexer/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }

    /// Get default projects manifest path (written only by the registry)
    ///
    /// Returns: {config_dir}/project-indexer/projects.json
    pub fn default_manifest_path() -> PathBuf {
        Self::project_config_dir().join("projects.json")
    }

    /// Get the daemon pid file path
    ///
    /// Returns: {data_dir}/project-indexer/daemon.pid
    pub fn daemon_pid_path() -> PathBuf {
        Self::project_data_dir().join("daemon.pid")
    }

    /// Get the daemon stop-marker path
    ///
    /// Returns: {data_dir}/project-indexer/daemon.stop
    pub fn daemon_stop_path() -> PathBuf {
        Self::project_data_dir().join("daemon.stop")
    }

    /// Get the daemon log file path
    ///
    /// Returns: {data_dir}/project-indexer/daemon.log
    pub fn daemon_log_path() -> PathBuf {
        Self::project_data_dir().join("daemon.log")
    }

    /// Directory for migration export snapshots
    ///
    /// Returns: {data_dir}/project-indexer/snapshots
    pub fn snapshot_dir() -> PathBuf {
        Self::project_data_dir().join("snapshots")
    }
}
