//! Chunk extraction: turns one file into zero or more semantic records.
//!
//! Dispatch is by content kind: source code goes through the heuristic code
//! extractor, plain and structured documents through paragraph chunking.
//! Extraction is deliberately pluggable behind [`extract_file`]; a failed
//! parse is a skip-with-error outcome for the caller to count, never a batch
//! abort.

mod code;
mod docs;

pub use code::extract_code;
pub use docs::extract_doc;

use crate::error::ExtractError;
use crate::types::Record;
use std::fs;
use std::path::Path;

/// Extensions handled by the code extractor
pub const SOURCE_EXTENSIONS: &[&str] = &["rs", "ts", "tsx", "js", "jsx", "mjs", "py", "go"];

/// Extensions handled by the document extractor
pub const DOC_EXTENSIONS: &[&str] = &["md", "txt", "csv", "json"];

/// Extract records from a single file.
///
/// `root` is the project root used to derive the relative source path.
/// Returns an empty vector for extensions no extractor claims.
pub fn extract_file(
    path: &Path,
    root: &Path,
    project: &str,
    max_chunk_chars: usize,
) -> Result<Vec<Record>, ExtractError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    if !SOURCE_EXTENSIONS.contains(&extension.as_str())
        && !DOC_EXTENSIONS.contains(&extension.as_str())
    {
        return Ok(vec![]);
    }

    let content = read_text(path)?;
    let source_path = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();

    if SOURCE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extract_code(&content, &extension, &source_path, project))
    } else {
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        Ok(extract_doc(
            &content,
            &title,
            &source_path,
            project,
            max_chunk_chars,
        ))
    }
}

fn read_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(path).map_err(|e| ExtractError::FileReadFailed {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|_| ExtractError::InvalidUtf8(path.display().to_string()))
}
