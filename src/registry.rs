//! Project discovery and classification.
//!
//! Walks a discovery root one level deep, classifies each subdirectory by
//! manifest files (or a conventional `src/` folder), counts source files to
//! filter out noise directories, and persists the result as the projects
//! manifest. Re-discovery is authoritative: the previous manifest is
//! overwritten in full, never merged.

use crate::config::{AutoDiscovery, ProjectsManifest};
use crate::error::{IndexerError, RegistryError};
use crate::extract::{DOC_EXTENSIONS, SOURCE_EXTENSIONS};
use crate::types::{LanguageKind, Project};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Infra/cache directory names never considered during discovery or counting
pub const DISCOVERY_DENYLIST: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    "dist",
    "build",
    "out",
    "__pycache__",
    ".cache",
    ".venv",
    "venv",
    ".next",
    "coverage",
    "vendor",
];

/// Exclude patterns applied to every project, persisted with the manifest
pub const GLOBAL_EXCLUDE: &[&str] = &[
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/.git/**",
    "**/__pycache__/**",
    "**/coverage/**",
    "**/*.min.js",
];

/// Maximum directory depth when counting a candidate's source files
const MAX_COUNT_DEPTH: usize = 6;

/// Directories with fewer matching files than this are dropped as noise
pub const DEFAULT_MIN_FILE_COUNT: usize = 3;

/// Discover candidate projects one level below `root_dir`.
///
/// Projects are sorted by `(priority ascending, file_count descending)`:
/// manifest-classified directories rank above convention-classified ones.
pub fn discover(root_dir: &Path, min_file_count: usize) -> Result<Vec<Project>, IndexerError> {
    if !root_dir.exists() {
        return Err(RegistryError::RootNotFound(root_dir.display().to_string()).into());
    }
    if !root_dir.is_dir() {
        return Err(RegistryError::NotADirectory(root_dir.display().to_string()).into());
    }

    let entries = fs::read_dir(root_dir)
        .map_err(|e| RegistryError::UnreadableRoot(format!("{}: {}", root_dir.display(), e)))?;

    let mut projects = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry under {:?}: {}", root_dir, e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || DISCOVERY_DENYLIST.contains(&name.as_str()) {
            continue;
        }

        let Some((language_kind, priority)) = classify(&path) else {
            continue;
        };

        let file_count = count_source_files(&path);
        if file_count < min_file_count {
            tracing::debug!(
                "Dropping '{}': {} source files below noise floor {}",
                name,
                file_count,
                min_file_count
            );
            continue;
        }

        projects.push(Project {
            name,
            root_path: path,
            language_kind,
            include_patterns: vec![],
            exclude_patterns: vec![],
            priority,
            file_count,
        });
    }

    projects.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.file_count.cmp(&a.file_count))
    });

    tracing::info!(
        "Discovered {} projects under {}",
        projects.len(),
        root_dir.display()
    );
    Ok(projects)
}

/// Run discovery and persist the resulting manifest, overwriting any prior
/// one in full.
pub fn discover_and_persist(
    root_dir: &Path,
    min_file_count: usize,
    manifest_path: &Path,
) -> Result<ProjectsManifest, IndexerError> {
    let projects = discover(root_dir, min_file_count)?;
    let manifest = ProjectsManifest {
        auto_discovery: AutoDiscovery {
            enabled: true,
            last_run: chrono::Utc::now().to_rfc3339(),
            project_count: projects.len(),
        },
        projects,
        global_exclude: GLOBAL_EXCLUDE.iter().map(|s| s.to_string()).collect(),
    };
    manifest.save(manifest_path)?;
    tracing::info!(
        "Persisted projects manifest to {}",
        manifest_path.display()
    );
    Ok(manifest)
}

/// Classify a directory as a project.
///
/// Manifest files give priority 1; a conventional `src/` folder gives
/// priority 2. Returns None for directories that look like neither.
fn classify(dir: &Path) -> Option<(LanguageKind, u8)> {
    if dir.join("Cargo.toml").is_file() {
        return Some((LanguageKind::Rust, 1));
    }
    if dir.join("package.json").is_file() {
        let kind = if dir.join("tsconfig.json").is_file() {
            LanguageKind::TypeScript
        } else {
            LanguageKind::JavaScript
        };
        return Some((kind, 1));
    }
    if dir.join("pyproject.toml").is_file() || dir.join("setup.py").is_file() {
        return Some((LanguageKind::Python, 1));
    }
    if dir.join("go.mod").is_file() {
        return Some((LanguageKind::Go, 1));
    }
    if dir.join("src").is_dir() {
        return Some((LanguageKind::Unknown, 2));
    }
    None
}

/// Count source and document files under `dir`, bounded depth, skipping
/// deny-listed directories.
fn count_source_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .max_depth(MAX_COUNT_DEPTH)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && (name.starts_with('.') || DISCOVERY_DENYLIST.contains(&name.as_ref())))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    SOURCE_EXTENSIONS.contains(&ext) || DOC_EXTENSIONS.contains(&ext)
                })
        })
        .count()
}
