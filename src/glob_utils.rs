//! Glob pattern matching utilities for path filtering

use globset::{Glob, GlobMatcher};

/// Check if a file path matches any of the given glob patterns
///
/// An empty pattern list matches everything. Patterns are matched against the
/// full path and against every path suffix, so `lib/**` matches
/// `/abs/path/to/lib/util.ts`. An invalid glob falls back to substring
/// matching.
pub fn matches_any_pattern(path: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }

    patterns.iter().any(|pattern| match Glob::new(pattern) {
        Ok(glob) => matcher_matches(&glob.compile_matcher(), path),
        Err(e) => {
            tracing::warn!(
                "Invalid glob pattern '{}', falling back to substring match: {}",
                pattern,
                e
            );
            path.contains(pattern)
        }
    })
}

/// Compile multiple glob patterns for efficient repeated matching.
/// Invalid patterns are skipped with a warning.
pub fn compile_patterns(patterns: &[String]) -> Vec<GlobMatcher> {
    patterns
        .iter()
        .filter_map(|pattern| match Glob::new(pattern) {
            Ok(g) => Some(g.compile_matcher()),
            Err(e) => {
                tracing::warn!("Failed to compile glob pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect()
}

/// Check if a path matches any of the precompiled matchers
pub fn matches_any_matcher(path: &str, matchers: &[GlobMatcher]) -> bool {
    matchers.iter().any(|m| matcher_matches(m, path))
}

fn matcher_matches(matcher: &GlobMatcher, path: &str) -> bool {
    if matcher.is_match(path) {
        return true;
    }

    let path_no_slash = path.trim_start_matches('/');
    if matcher.is_match(path_no_slash) {
        return true;
    }

    // Match against path suffixes so relative patterns hit absolute paths
    let parts: Vec<&str> = path.split('/').collect();
    for i in 1..parts.len() {
        if matcher.is_match(parts[i..].join("/")) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_directory_glob() {
        let patterns = vec!["lib/**".to_string()];

        assert!(matches_any_pattern("/project/lib/utils.ts", &patterns));
        assert!(matches_any_pattern("lib/nested/file.rs", &patterns));
        assert!(!matches_any_pattern("/project/src/main.rs", &patterns));
    }

    #[test]
    fn test_matches_extension_glob() {
        let patterns = vec!["**/*.ts".to_string()];

        assert!(matches_any_pattern("/project/src/main.ts", &patterns));
        assert!(!matches_any_pattern("/project/src/main.rs", &patterns));
    }

    #[test]
    fn test_empty_patterns_match_everything() {
        assert!(matches_any_pattern("/any/path.rs", &[]));
    }

    #[test]
    fn test_invalid_pattern_fallback() {
        let patterns = vec!["[invalid".to_string()];

        assert!(matches_any_pattern("/path/[invalid/file.rs", &patterns));
        assert!(!matches_any_pattern("/path/valid/file.rs", &patterns));
    }

    #[test]
    fn test_compiled_matchers() {
        let patterns = vec!["lib/**".to_string(), "**/*.rs".to_string()];
        let matchers = compile_patterns(&patterns);
        assert_eq!(matchers.len(), 2);

        assert!(matches_any_matcher("/project/lib/utils.ts", &matchers));
        assert!(matches_any_matcher("/project/src/main.rs", &matchers));
        assert!(!matches_any_matcher("/project/test.txt", &matchers));
    }

    #[test]
    fn test_compile_skips_invalid() {
        let patterns = vec!["lib/**".to_string(), "[invalid".to_string()];
        assert_eq!(compile_patterns(&patterns).len(), 1);
    }
}
