//! Paragraph-bounded document chunking.
//!
//! Paragraphs (blank-line separated blocks) are merged greedily into chunks
//! up to the configured character ceiling. A single paragraph over the
//! ceiling is emitted whole as its own chunk; content is never truncated
//! mid-paragraph.

use crate::types::{Record, RecordPayload};

/// Default chunk ceiling in characters
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 2000;

/// Chunk a document into records.
///
/// `title` is typically the file stem; `section` on each chunk tracks the
/// most recent markdown heading seen before the chunk started.
pub fn extract_doc(
    content: &str,
    title: &str,
    source_path: &str,
    project: &str,
    max_chars: usize,
) -> Vec<Record> {
    let max_chars = if max_chars == 0 {
        DEFAULT_MAX_CHUNK_CHARS
    } else {
        max_chars
    };

    let mut records = Vec::new();
    let mut current = String::new();
    let mut current_section = String::new();
    let mut pending_section = String::new();
    let mut chunk_index = 0;

    for paragraph in split_paragraphs(content) {
        if let Some(heading) = heading_text(&paragraph) {
            pending_section = heading;
        }

        if paragraph.len() > max_chars {
            // Oversize paragraph: close the running chunk, emit it whole
            flush(
                &mut records,
                &mut current,
                title,
                &current_section,
                &mut chunk_index,
                source_path,
                project,
            );
            current_section = pending_section.clone();
            records.push(build_chunk(
                paragraph.trim(),
                title,
                &current_section,
                chunk_index,
                source_path,
                project,
            ));
            chunk_index += 1;
            continue;
        }

        let would_be = if current.is_empty() {
            paragraph.len()
        } else {
            current.len() + 2 + paragraph.len()
        };
        if would_be > max_chars {
            flush(
                &mut records,
                &mut current,
                title,
                &current_section,
                &mut chunk_index,
                source_path,
                project,
            );
        }
        if current.is_empty() {
            current_section = pending_section.clone();
            current.push_str(&paragraph);
        } else {
            current.push_str("\n\n");
            current.push_str(&paragraph);
        }
    }
    flush(
        &mut records,
        &mut current,
        title,
        &current_section,
        &mut chunk_index,
        source_path,
        project,
    );

    records
}

#[allow(clippy::too_many_arguments)]
fn flush(
    records: &mut Vec<Record>,
    buf: &mut String,
    title: &str,
    section: &str,
    index: &mut usize,
    source_path: &str,
    project: &str,
) {
    let text = buf.trim();
    if !text.is_empty() {
        records.push(build_chunk(text, title, section, *index, source_path, project));
        *index += 1;
    }
    buf.clear();
}

fn build_chunk(
    text: &str,
    title: &str,
    section: &str,
    chunk_index: usize,
    source_path: &str,
    project: &str,
) -> Record {
    Record {
        project: project.to_string(),
        source_path: source_path.to_string(),
        content: text.to_string(),
        payload: RecordPayload::DocChunk {
            title: title.to_string(),
            section: section.to_string(),
            chunk_index,
        },
    }
}

/// Split on runs of blank lines, preserving line breaks inside paragraphs
fn split_paragraphs(content: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                paragraphs.push(current.trim_end().to_string());
            }
            current.clear();
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current.trim_end().to_string());
    }
    paragraphs
}

/// Markdown heading text if the paragraph starts with one
fn heading_text(paragraph: &str) -> Option<String> {
    let first = paragraph.lines().next()?;
    let trimmed = first.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let text = trimmed.trim_start_matches('#').trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordKind;

    fn sections(records: &[Record]) -> Vec<(String, usize)> {
        records
            .iter()
            .map(|r| match &r.payload {
                RecordPayload::DocChunk {
                    section,
                    chunk_index,
                    ..
                } => (section.clone(), *chunk_index),
                _ => panic!("expected doc chunk"),
            })
            .collect()
    }

    #[test]
    fn test_short_document_is_one_chunk() {
        let records = extract_doc(
            "# Intro\n\nFirst paragraph.\n\nSecond paragraph.",
            "README",
            "README.md",
            "demo",
            2000,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), RecordKind::DocChunk);
        assert!(records[0].content.contains("First paragraph."));
        assert!(records[0].content.contains("Second paragraph."));
        assert_eq!(sections(&records), vec![("Intro".to_string(), 0)]);
    }

    #[test]
    fn test_chunks_respect_ceiling() {
        let para = "x".repeat(400);
        let doc = format!("{para}\n\n{para}\n\n{para}");
        let records = extract_doc(&doc, "doc", "doc.md", "demo", 900);

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.content.len() <= 900));
        // First chunk merged two paragraphs, second holds the remainder
        assert_eq!(records[0].content.len(), 802);
        assert_eq!(records[1].content.len(), 400);
    }

    #[test]
    fn test_oversize_paragraph_emitted_whole() {
        let big = "y".repeat(5000);
        let doc = format!("small intro\n\n{big}\n\nsmall outro");
        let records = extract_doc(&doc, "doc", "doc.md", "demo", 2000);

        assert_eq!(records.len(), 3);
        assert_eq!(records[1].content.len(), 5000, "never truncated");
        assert_eq!(records[0].content, "small intro");
        assert_eq!(records[2].content, "small outro");
    }

    #[test]
    fn test_section_tracks_last_heading() {
        let doc = "# One\n\nalpha\n\n## Two\n\nbeta\n\ngamma";
        let records = extract_doc(doc, "guide", "guide.md", "demo", 20);

        let secs = sections(&records);
        assert!(secs.iter().any(|(s, _)| s == "One"));
        assert!(secs.iter().any(|(s, _)| s == "Two"));
        // Chunk indices are dense and ordered
        let indices: Vec<usize> = secs.iter().map(|(_, i)| *i).collect();
        assert_eq!(indices, (0..records.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_document_yields_nothing() {
        assert!(extract_doc("", "empty", "empty.md", "demo", 2000).is_empty());
        assert!(extract_doc("\n\n  \n", "blank", "blank.md", "demo", 2000).is_empty());
    }
}
