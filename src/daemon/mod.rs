//! Background watch daemon.
//!
//! The daemon watches registered project roots and re-indexes a project once
//! its change burst goes quiet. Liveness is a pid file held under an
//! exclusive advisory lock; a stale pid file from a crashed run is therefore
//! harmless. Stop requests arrive as a marker file polled by the main loop,
//! which keeps shutdown portable and lets an in-flight re-index finish.

mod watch;

pub use watch::{Debouncer, ProjectEvent, WatchSet, is_relevant_path};

use crate::config::{Config, ProjectsManifest};
use crate::error::{DaemonError, IndexerError};
use crate::pipeline::Pipeline;
use crate::registry;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How often the main loop checks for a stop marker
const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pid file held under an exclusive lock for the daemon's lifetime
#[derive(Debug)]
pub struct PidFile {
    file: File,
    path: PathBuf,
}

impl PidFile {
    pub fn acquire(path: &Path) -> Result<Self, DaemonError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DaemonError::PidFileFailed(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| DaemonError::PidFileFailed(e.to_string()))?;

        if file.try_lock_exclusive().is_err() {
            let pid = fs::read_to_string(path)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);
            return Err(DaemonError::AlreadyRunning(pid));
        }

        file.set_len(0)
            .map_err(|e| DaemonError::PidFileFailed(e.to_string()))?;
        let mut locked = &file;
        write!(locked, "{}", std::process::id())
            .map_err(|e| DaemonError::PidFileFailed(e.to_string()))?;
        locked
            .flush()
            .map_err(|e| DaemonError::PidFileFailed(e.to_string()))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

/// Point-in-time daemon status
#[derive(Debug)]
pub struct DaemonStatus {
    /// Pid of the running daemon, None when not running
    pub pid: Option<u32>,
    pub log_tail: Vec<String>,
}

/// Inspect the pid file lock to decide whether a daemon is alive
pub fn status(pid_path: &Path, log_path: &Path, tail_lines: usize) -> DaemonStatus {
    let pid = read_live_pid(pid_path);
    DaemonStatus {
        pid,
        log_tail: tail_log(log_path, tail_lines),
    }
}

/// Ask a running daemon to shut down by writing the stop marker
pub fn request_stop(pid_path: &Path, stop_path: &Path) -> Result<u32, DaemonError> {
    let Some(pid) = read_live_pid(pid_path) else {
        return Err(DaemonError::NotRunning);
    };
    fs::write(stop_path, b"stop").map_err(|e| DaemonError::PidFileFailed(e.to_string()))?;
    Ok(pid)
}

fn read_live_pid(pid_path: &Path) -> Option<u32> {
    if !pid_path.exists() {
        return None;
    }
    let file = File::open(pid_path).ok()?;
    if file.try_lock_shared().is_ok() {
        // Nothing holds the exclusive lock, so the writer is gone
        let _ = fs2::FileExt::unlock(&file);
        return None;
    }
    fs::read_to_string(pid_path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

fn tail_log(log_path: &Path, lines: usize) -> Vec<String> {
    let Ok(content) = fs::read_to_string(log_path) else {
        return vec![];
    };
    let all: Vec<&str> = content.lines().collect();
    all.iter()
        .skip(all.len().saturating_sub(lines))
        .map(|s| s.to_string())
        .collect()
}

pub struct Daemon {
    config: Config,
    root_dir: PathBuf,
    manifest_path: PathBuf,
    pipeline: Arc<Pipeline>,
}

impl Daemon {
    pub fn new(
        config: Config,
        root_dir: PathBuf,
        manifest_path: PathBuf,
        pipeline: Arc<Pipeline>,
    ) -> Self {
        Self {
            config,
            root_dir,
            manifest_path,
            pipeline,
        }
    }

    /// Run the watch loop until a stop marker or Ctrl-C arrives.
    ///
    /// `interactive` selects the short debounce window used by the
    /// foreground `watch` command; the background daemon uses the long one.
    pub async fn run(
        &self,
        pid_path: &Path,
        stop_path: &Path,
        interactive: bool,
    ) -> Result<(), IndexerError> {
        let _pid = PidFile::acquire(pid_path)?;
        let _ = fs::remove_file(stop_path);

        let window = if interactive {
            Duration::from_secs(self.config.daemon.watch_debounce_secs)
        } else {
            Duration::from_secs(self.config.daemon.debounce_secs)
        };

        let mut manifest = self.refresh_projects()?;
        let mut watch_set =
            WatchSet::new(&manifest.projects, self.config.daemon.max_watched);
        tracing::info!(
            "Daemon started: watching {} projects, debounce {}s",
            watch_set.watched_count(),
            window.as_secs()
        );

        let (fire_tx, mut fire_rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::new(window, fire_tx);

        let mut stop_poll = tokio::time::interval(STOP_POLL_INTERVAL);
        let mut rediscovery = tokio::time::interval(Duration::from_secs(
            self.config.daemon.rediscovery_hours * 3600,
        ));
        rediscovery.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                _ = stop_poll.tick() => {
                    if stop_path.exists() {
                        let _ = fs::remove_file(stop_path);
                        tracing::info!("Stop requested, shutting down");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, shutting down");
                    break;
                }
                _ = rediscovery.tick() => {
                    match self.refresh_projects() {
                        Ok(new_manifest) => {
                            manifest = new_manifest;
                            debouncer.cancel_all();
                            watch_set = WatchSet::new(&manifest.projects, self.config.daemon.max_watched);
                            tracing::info!(
                                "Re-discovery complete: watching {} projects",
                                watch_set.watched_count()
                            );
                        }
                        Err(e) => tracing::error!("Re-discovery failed: {}", e),
                    }
                }
                Some(event) = watch_set.recv() => {
                    tracing::debug!("Change detected in project '{}'", event.project);
                    debouncer.touch(&event.project);
                }
                Some(project) = fire_rx.recv() => {
                    self.reindex(&manifest, &project).await;
                }
            }
        }

        debouncer.cancel_all();
        Ok(())
    }

    fn refresh_projects(&self) -> Result<ProjectsManifest, IndexerError> {
        registry::discover_and_persist(
            &self.root_dir,
            self.config.indexing.min_file_count,
            &self.manifest_path,
        )
    }

    async fn reindex(&self, manifest: &ProjectsManifest, project_name: &str) {
        let Some(project) = manifest.project(project_name) else {
            tracing::warn!("Project '{}' vanished before re-index", project_name);
            return;
        };
        tracing::info!("Debounce elapsed, re-indexing '{}'", project_name);
        match self
            .pipeline
            .ingest_project(project, &manifest.global_exclude)
            .await
        {
            Ok(report) => tracing::info!(
                "Re-indexed '{}': {} records inserted, {} failed",
                project_name,
                report.inserted,
                report.failed
            ),
            Err(e) => tracing::error!("Re-index of '{}' failed: {}", project_name, e),
        }
    }
}
