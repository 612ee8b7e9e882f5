//! Filesystem watching and event debouncing.
//!
//! One recursive watcher per project feeds a shared channel. Events are
//! filtered down to indexable source changes, then debounced per project
//! with cancel-and-replace timers: each new event restarts the quiet window,
//! and a project re-indexes only after its window passes without further
//! changes.

use crate::extract::{DOC_EXTENSIONS, SOURCE_EXTENSIONS};
use crate::registry::DISCOVERY_DENYLIST;
use crate::types::Project;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// File names that carry an indexable extension but never warrant a re-index
const IGNORED_FILE_NAMES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
];

/// A change event attributed to a watched project
#[derive(Debug, Clone)]
pub struct ProjectEvent {
    pub project: String,
}

/// Recursive watchers over a set of project roots.
///
/// Watchers are dropped and rebuilt wholesale when the project set changes.
/// A root that cannot be watched (deleted between discovery and setup, say)
/// is skipped rather than failing the whole set.
pub struct WatchSet {
    watchers: Vec<RecommendedWatcher>,
    rx: mpsc::UnboundedReceiver<ProjectEvent>,
}

impl WatchSet {
    pub fn new(projects: &[Project], max_watched: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watchers = Vec::new();

        for project in projects.iter().take(max_watched) {
            let name = project.name.clone();
            let root = project.root_path.clone();
            let tx = tx.clone();

            let watcher = notify::recommended_watcher(
                move |result: Result<notify::Event, notify::Error>| {
                    let Ok(event) = result else { return };
                    if !matches!(
                        event.kind,
                        notify::EventKind::Create(_)
                            | notify::EventKind::Modify(_)
                            | notify::EventKind::Remove(_)
                    ) {
                        return;
                    }
                    if event.paths.iter().any(|p| is_relevant_path(p)) {
                        let _ = tx.send(ProjectEvent {
                            project: name.clone(),
                        });
                    }
                },
            );
            let mut watcher = match watcher {
                Ok(watcher) => watcher,
                Err(e) => {
                    tracing::warn!("Skipping watch for '{}': {}", project.name, e);
                    continue;
                }
            };

            if let Err(e) = watcher.watch(&root, RecursiveMode::Recursive) {
                tracing::warn!(
                    "Skipping watch for '{}' at {}: {}",
                    project.name,
                    root.display(),
                    e
                );
                continue;
            }
            tracing::info!("Watching project '{}' at {}", project.name, root.display());
            watchers.push(watcher);
        }

        if projects.len() > max_watched {
            tracing::warn!(
                "Watching only the top {} of {} projects",
                max_watched,
                projects.len()
            );
        }

        Self { watchers, rx }
    }

    pub fn watched_count(&self) -> usize {
        self.watchers.len()
    }

    pub async fn recv(&mut self) -> Option<ProjectEvent> {
        self.rx.recv().await
    }
}

/// Whether a changed path should trigger a re-index
pub fn is_relevant_path(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if IGNORED_FILE_NAMES.contains(&name) || name.ends_with(".d.ts") || name.ends_with(".min.js") {
        return false;
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    if !SOURCE_EXTENSIONS.contains(&extension.as_str())
        && !DOC_EXTENSIONS.contains(&extension.as_str())
    {
        return false;
    }

    // Reject paths inside hidden or build-output directories
    !path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| (s.starts_with('.') && s.len() > 1) || DISCOVERY_DENYLIST.contains(&s))
    })
}

/// Per-project cancel-and-replace debounce timers.
///
/// `touch` arms (or re-arms) a project's timer; the project name is delivered
/// on the output channel once its quiet window elapses untouched.
pub struct Debouncer {
    window: Duration,
    tx: mpsc::UnboundedSender<String>,
    pending: HashMap<String, CancellationToken>,
}

impl Debouncer {
    pub fn new(window: Duration, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            window,
            tx,
            pending: HashMap::new(),
        }
    }

    pub fn touch(&mut self, project: &str) {
        if let Some(previous) = self.pending.get(project) {
            previous.cancel();
        }

        let token = CancellationToken::new();
        self.pending.insert(project.to_string(), token.clone());

        let tx = self.tx.clone();
        let window = self.window;
        let name = project.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(window) => {
                    let _ = tx.send(name);
                }
            }
        });
    }

    /// Drop all armed timers without firing them
    pub fn cancel_all(&mut self) {
        for token in self.pending.values() {
            token.cancel();
        }
        self.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LanguageKind;
    use std::path::PathBuf;

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
    async fn test_unwatchable_root_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let projects = vec![
            project("alive", dir.path()),
            project("gone", &dir.path().join("deleted-checkout")),
        ];

        let watch_set = WatchSet::new(&projects, 12);
        assert_eq!(watch_set.watched_count(), 1);
    }

    #[test]
    fn test_relevant_paths() {
        assert!(is_relevant_path(&PathBuf::from("/p/src/main.rs")));
        assert!(is_relevant_path(&PathBuf::from("/p/docs/guide.md")));
        assert!(is_relevant_path(&PathBuf::from("/p/data/config.json")));

        assert!(!is_relevant_path(&PathBuf::from("/p/image.png")));
        assert!(!is_relevant_path(&PathBuf::from("/p/package-lock.json")));
        assert!(!is_relevant_path(&PathBuf::from("/p/types/api.d.ts")));
        assert!(!is_relevant_path(&PathBuf::from("/p/dist/app.min.js")));
        assert!(!is_relevant_path(&PathBuf::from("/p/node_modules/x/y.js")));
        assert!(!is_relevant_path(&PathBuf::from("/p/target/debug/gen.rs")));
        assert!(!is_relevant_path(&PathBuf::from("/p/.git/hooks/pre-commit.py")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_fires_after_quiet_window() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::new(Duration::from_secs(30), tx);

        debouncer.touch("demo");
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(rx.recv().await.unwrap(), "demo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_restarts_the_window() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::new(Duration::from_secs(30), tx);

        debouncer.touch("demo");
        tokio::time::advance(Duration::from_secs(20)).await;
        // A second change before the window closes replaces the timer
        debouncer.touch("demo");
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(rx.recv().await.unwrap(), "demo");
        // Exactly one delivery for the whole burst
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_projects_debounce_independently() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::new(Duration::from_secs(30), tx);

        debouncer.touch("alpha");
        tokio::time::advance(Duration::from_secs(15)).await;
        debouncer.touch("beta");
        tokio::time::advance(Duration::from_secs(16)).await;

        assert_eq!(rx.recv().await.unwrap(), "alpha");
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(rx.recv().await.unwrap(), "beta");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_suppresses_pending() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::new(Duration::from_secs(5), tx);

        debouncer.touch("demo");
        assert_eq!(debouncer.pending_count(), 1);
        debouncer.cancel_all();
        assert_eq!(debouncer.pending_count(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
