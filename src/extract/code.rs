//! Heuristic code extraction.
//!
//! Finds function/class/component-like units and type declarations with
//! line-oriented pattern matching rather than full parsing. Good enough to
//! give every unit a line span, a signature, flags, and a naive complexity
//! estimate; anything it misses simply produces fewer records.

use crate::types::{Record, RecordPayload};
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq)]
enum LanguageFamily {
    Rust,
    EcmaScript,
    Python,
    Go,
}

fn family_for(extension: &str) -> Option<LanguageFamily> {
    match extension {
        "rs" => Some(LanguageFamily::Rust),
        "ts" | "tsx" | "js" | "jsx" | "mjs" => Some(LanguageFamily::EcmaScript),
        "py" => Some(LanguageFamily::Python),
        "go" => Some(LanguageFamily::Go),
        _ => None,
    }
}

static RUST_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(pub(?:\([^)]*\))?\s+)?(async\s+)?(?:unsafe\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)")
        .unwrap()
});
static RUST_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(pub(?:\([^)]*\))?\s+)?(struct|enum|trait|type)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .unwrap()
});
static RUST_USE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*use\s+([A-Za-z_][A-Za-z0-9_]*(?:::[A-Za-z0-9_*{]+)*)").unwrap());

static ES_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?(?:default\s+)?(async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)")
        .unwrap()
});
static ES_ARROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?const\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::\s*[^=]+)?=>")
        .unwrap()
});
static ES_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)")
        .unwrap()
});
static ES_TYPEDEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?(interface|enum)\s+([A-Za-z_$][\w$]*)").unwrap()
});
static ES_TYPE_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?type\s+([A-Za-z_$][\w$]*)\s*=").unwrap()
});
static ES_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:import\s.*?from|require\()\s*['"]([^'"]+)['"]"#).unwrap());

static PY_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(async\s+)?def\s+([A-Za-z_]\w*)").unwrap());
static PY_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)class\s+([A-Za-z_]\w*)").unwrap());
static PY_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:from\s+([\w.]+)\s+import|import\s+([\w.]+))").unwrap());

static GO_FUNC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^func\s+(?:\([^)]*\)\s+)?([A-Za-z_]\w*)").unwrap());
static GO_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^type\s+([A-Za-z_]\w*)\s+(struct|interface|\S+)").unwrap());
static GO_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*(?:\w+\s+)?"([^"]+)"\s*$"#).unwrap());
static GO_IMPORT_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^import\s+(?:\w+\s+)?"([^"]+)""#).unwrap());

static BRANCH_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(if|elif|else if|for|while|match|case|catch|except|when)\b").unwrap()
});
static TYPE_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][A-Za-z0-9_]{2,})\b").unwrap());
static PROPERTY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:pub\s+|readonly\s+)?([a-z_][A-Za-z0-9_]*)\s*\??\s*:").unwrap());

/// A discovered unit before its record is built
struct UnitStart {
    line_idx: usize,
    name: String,
    chunk_type: &'static str,
    exported: bool,
    is_async: bool,
    is_typedef: bool,
    type_kind: &'static str,
}

/// Extract code chunk and type definition records from source text
pub fn extract_code(
    content: &str,
    extension: &str,
    source_path: &str,
    project: &str,
) -> Vec<Record> {
    let Some(family) = family_for(extension) else {
        return vec![];
    };

    let lines: Vec<&str> = content.lines().collect();
    let imports = collect_imports(family, &lines);
    let starts = find_unit_starts(family, &lines);

    let mut records = Vec::new();
    for start in &starts {
        let end_idx = unit_end(family, &lines, start.line_idx);
        let body = lines[start.line_idx..=end_idx].join("\n");
        if body.trim().is_empty() {
            continue;
        }
        let signature = lines[start.line_idx].trim().to_string();

        let payload = if start.is_typedef {
            RecordPayload::TypeDefinition {
                name: start.name.clone(),
                type_kind: start.type_kind.to_string(),
                properties: collect_properties(&lines[start.line_idx..=end_idx]),
                extends_types: extends_types(&signature),
                from_database: source_path.contains("schema") || source_path.contains("database"),
            }
        } else {
            RecordPayload::CodeChunk {
                name: start.name.clone(),
                chunk_type: start.chunk_type.to_string(),
                line_start: start.line_idx + 1,
                line_end: end_idx + 1,
                signature,
                exported: start.exported,
                is_async: start.is_async,
                imports: imports.clone(),
                exports: if start.exported {
                    vec![start.name.clone()]
                } else {
                    vec![]
                },
                used_types: used_types(&body, &start.name),
                complexity: complexity(&body),
            }
        };

        records.push(Record {
            project: project.to_string(),
            source_path: source_path.to_string(),
            content: body,
            payload,
        });
    }

    records
}

fn find_unit_starts(family: LanguageFamily, lines: &[&str]) -> Vec<UnitStart> {
    let mut starts = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        match family {
            LanguageFamily::Rust => {
                if let Some(caps) = RUST_FN.captures(line) {
                    starts.push(UnitStart {
                        line_idx: idx,
                        name: caps[3].to_string(),
                        chunk_type: "function",
                        exported: caps.get(1).is_some(),
                        is_async: caps.get(2).is_some(),
                        is_typedef: false,
                        type_kind: "",
                    });
                } else if let Some(caps) = RUST_TYPE.captures(line) {
                    let kind = match &caps[2] {
                        "struct" => "struct",
                        "enum" => "enum",
                        "trait" => "trait",
                        _ => "alias",
                    };
                    starts.push(UnitStart {
                        line_idx: idx,
                        name: caps[3].to_string(),
                        chunk_type: "",
                        exported: caps.get(1).is_some(),
                        is_async: false,
                        is_typedef: true,
                        type_kind: kind,
                    });
                }
            }
            LanguageFamily::EcmaScript => {
                if let Some(caps) = ES_FN.captures(line) {
                    starts.push(UnitStart {
                        line_idx: idx,
                        name: caps[3].to_string(),
                        chunk_type: "function",
                        exported: caps.get(1).is_some(),
                        is_async: caps.get(2).is_some(),
                        is_typedef: false,
                        type_kind: "",
                    });
                } else if let Some(caps) = ES_ARROW.captures(line) {
                    let name = caps[2].to_string();
                    // Uppercase-initial arrow consts are component-like
                    let chunk_type = if name.chars().next().is_some_and(|c| c.is_uppercase()) {
                        "component"
                    } else {
                        "function"
                    };
                    starts.push(UnitStart {
                        line_idx: idx,
                        name,
                        chunk_type,
                        exported: caps.get(1).is_some(),
                        is_async: caps.get(3).is_some(),
                        is_typedef: false,
                        type_kind: "",
                    });
                } else if let Some(caps) = ES_CLASS.captures(line) {
                    starts.push(UnitStart {
                        line_idx: idx,
                        name: caps[2].to_string(),
                        chunk_type: "class",
                        exported: caps.get(1).is_some(),
                        is_async: false,
                        is_typedef: false,
                        type_kind: "",
                    });
                } else if let Some(caps) = ES_TYPEDEF.captures(line) {
                    let kind = if &caps[2] == "interface" {
                        "interface"
                    } else {
                        "enum"
                    };
                    starts.push(UnitStart {
                        line_idx: idx,
                        name: caps[3].to_string(),
                        chunk_type: "",
                        exported: caps.get(1).is_some(),
                        is_async: false,
                        is_typedef: true,
                        type_kind: kind,
                    });
                } else if let Some(caps) = ES_TYPE_ALIAS.captures(line) {
                    starts.push(UnitStart {
                        line_idx: idx,
                        name: caps[2].to_string(),
                        chunk_type: "",
                        exported: caps.get(1).is_some(),
                        is_async: false,
                        is_typedef: true,
                        type_kind: "alias",
                    });
                }
            }
            LanguageFamily::Python => {
                if let Some(caps) = PY_DEF.captures(line) {
                    let name = caps[3].to_string();
                    // Only top-level defs and methods one level deep
                    if caps[1].len() <= 4 {
                        starts.push(UnitStart {
                            line_idx: idx,
                            exported: !name.starts_with('_'),
                            name,
                            chunk_type: "function",
                            is_async: caps.get(2).is_some(),
                            is_typedef: false,
                            type_kind: "",
                        });
                    }
                } else if let Some(caps) = PY_CLASS.captures(line) {
                    if caps[1].is_empty() {
                        let name = caps[2].to_string();
                        starts.push(UnitStart {
                            line_idx: idx,
                            exported: !name.starts_with('_'),
                            name,
                            chunk_type: "class",
                            is_async: false,
                            is_typedef: false,
                            type_kind: "",
                        });
                    }
                }
            }
            LanguageFamily::Go => {
                if let Some(caps) = GO_FUNC.captures(line) {
                    let name = caps[1].to_string();
                    starts.push(UnitStart {
                        line_idx: idx,
                        exported: name.chars().next().is_some_and(|c| c.is_uppercase()),
                        name,
                        chunk_type: "function",
                        is_async: false,
                        is_typedef: false,
                        type_kind: "",
                    });
                } else if let Some(caps) = GO_TYPE.captures(line) {
                    let kind = match &caps[2] {
                        "struct" => "struct",
                        "interface" => "interface",
                        _ => "alias",
                    };
                    let name = caps[1].to_string();
                    starts.push(UnitStart {
                        line_idx: idx,
                        exported: name.chars().next().is_some_and(|c| c.is_uppercase()),
                        name,
                        chunk_type: "",
                        is_async: false,
                        is_typedef: true,
                        type_kind: kind,
                    });
                }
            }
        }
    }
    starts
}

/// Find the last line of the unit starting at `start_idx`.
///
/// Brace-balanced for brace languages; indentation-scoped for Python. Units
/// without a block (type aliases, one-line arrows) end where the statement
/// ends.
fn unit_end(family: LanguageFamily, lines: &[&str], start_idx: usize) -> usize {
    if family == LanguageFamily::Python {
        let indent = leading_spaces(lines[start_idx]);
        let mut end = start_idx;
        for (idx, line) in lines.iter().enumerate().skip(start_idx + 1) {
            if line.trim().is_empty() {
                continue;
            }
            if leading_spaces(line) <= indent {
                break;
            }
            end = idx;
        }
        return end;
    }

    let mut depth: i32 = 0;
    let mut seen_open = false;
    for (idx, line) in lines.iter().enumerate().skip(start_idx) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    seen_open = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if seen_open && depth <= 0 {
            return idx;
        }
        // Statement-shaped unit with no block within a few lines
        if !seen_open && (line.trim_end().ends_with(';') || idx >= start_idx + 2) {
            return idx;
        }
    }
    lines.len() - 1
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn collect_imports(family: LanguageFamily, lines: &[&str]) -> Vec<String> {
    let mut imports = Vec::new();
    let mut in_go_block = false;
    for line in lines {
        match family {
            LanguageFamily::Rust => {
                if let Some(caps) = RUST_USE.captures(line) {
                    imports.push(caps[1].trim_end_matches("::{").to_string());
                }
            }
            LanguageFamily::EcmaScript => {
                if let Some(caps) = ES_IMPORT.captures(line) {
                    imports.push(caps[1].to_string());
                }
            }
            LanguageFamily::Python => {
                if let Some(caps) = PY_IMPORT.captures(line) {
                    let module = caps
                        .get(1)
                        .or_else(|| caps.get(2))
                        .map(|m| m.as_str().to_string());
                    if let Some(m) = module {
                        imports.push(m);
                    }
                }
            }
            LanguageFamily::Go => {
                if line.trim_start().starts_with("import (") {
                    in_go_block = true;
                } else if in_go_block && line.trim_start().starts_with(')') {
                    in_go_block = false;
                } else if in_go_block {
                    if let Some(caps) = GO_IMPORT.captures(line) {
                        imports.push(caps[1].to_string());
                    }
                } else if let Some(caps) = GO_IMPORT_SINGLE.captures(line) {
                    imports.push(caps[1].to_string());
                }
            }
        }
    }
    imports.dedup();
    imports
}

/// Naive cyclomatic complexity: 1 + branch keywords + short-circuit operators
fn complexity(body: &str) -> u32 {
    let keywords = BRANCH_KEYWORD.find_iter(body).count();
    let short_circuit = body.matches("&&").count() + body.matches("||").count();
    1 + (keywords + short_circuit) as u32
}

/// Capitalized identifiers referenced in the body, excluding the unit's own
/// name, capped to keep payloads small
fn used_types(body: &str, own_name: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in TYPE_IDENT.captures_iter(body) {
        let ident = caps[1].to_string();
        if ident == own_name || ident == "Self" {
            continue;
        }
        if !seen.contains(&ident) {
            seen.push(ident);
            if seen.len() >= 12 {
                break;
            }
        }
    }
    seen
}

fn collect_properties(span: &[&str]) -> Vec<String> {
    span.iter()
        .skip(1)
        .filter_map(|line| PROPERTY_LINE.captures(line).map(|c| c[1].to_string()))
        .take(24)
        .collect()
}

/// Parent types from the declaration line (`extends A, B`, `trait X: A + B`)
fn extends_types(signature: &str) -> Vec<String> {
    let tail = if let Some(pos) = signature.find("extends ") {
        &signature[pos + 8..]
    } else if let Some(pos) = signature.find(':') {
        &signature[pos + 1..]
    } else {
        return vec![];
    };
    tail.split(['{', '=', '(']).next().unwrap_or("")
        .split([',', '+'])
        .map(|s| s.trim().trim_end_matches('>').to_string())
        .filter(|s| s.chars().next().is_some_and(|c| c.is_uppercase()))
        .collect()
}
