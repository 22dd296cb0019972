//! Action pattern matching (§4.2).
//!
//! Grounded on `octofhir-auth`'s `PatternMatcher` glob-to-regex translation
//! in `policy/matcher.rs`, specialized to the colon-segmented, fixed-arity
//! Action pattern convention.

use crate::policy::cache::{glob_to_anchored_regex, RegexCache};

/// Matches a single Action pattern against a requested action string (§4.2).
///
/// Both segment counts must be equal; `*` alone matches anything; a `*`
/// within a non-wildcard segment is translated to an anchored regex.
pub fn matches(pattern: &str, requested: &str, cache: &RegexCache) -> bool {
    if pattern.is_empty() || requested.is_empty() {
        return false;
    }
    if pattern == "*" {
        return true;
    }

    let pattern_segments: Vec<&str> = pattern.split(':').collect();
    let requested_segments: Vec<&str> = requested.split(':').collect();
    if pattern_segments.len() != requested_segments.len() {
        return false;
    }

    pattern_segments
        .iter()
        .zip(requested_segments.iter())
        .all(|(p, r)| match_segment(p, r, cache))
}

pub(crate) fn match_segment(pattern_segment: &str, requested_segment: &str, cache: &RegexCache) -> bool {
    if pattern_segment == "*" {
        return true;
    }
    if !pattern_segment.contains('*') {
        return pattern_segment == requested_segment;
    }
    let regex_pattern = glob_to_anchored_regex(pattern_segment);
    match cache.get_or_compile(&regex_pattern) {
        Some(regex) => regex.is_match(requested_segment),
        None => false,
    }
}

/// Matches the first pattern in `patterns` that succeeds (§4.2: "first match
/// wins"); returns true as soon as one pattern matches.
pub fn matches_any(patterns: &[String], requested: &str, cache: &RegexCache) -> bool {
    patterns.iter().any(|pattern| matches(pattern, requested, cache))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> RegexCache {
        RegexCache::new(None)
    }

    #[test]
    fn test_wildcard_pattern_matches_anything() {
        assert!(matches("*", "doc:file:read", &cache()));
    }

    #[test]
    fn test_exact_match() {
        assert!(matches("doc:file:read", "doc:file:read", &cache()));
        assert!(!matches("doc:file:read", "doc:file:write", &cache()));
    }

    #[test]
    fn test_segment_wildcard() {
        assert!(matches("doc:file:*", "doc:file:read", &cache()));
        assert!(matches("doc:*:read", "doc:file:read", &cache()));
    }

    #[test]
    fn test_different_arity_never_matches() {
        assert!(!matches("doc:file:*", "doc:file:read:extra", &cache()));
        assert!(!matches("doc:file:read:extra", "doc:file:read", &cache()));
    }

    #[test]
    fn test_glob_within_segment() {
        assert!(matches("doc:file:re*d", "doc:file:reload", &cache()));
        assert!(!matches("doc:file:re*d", "doc:file:write", &cache()));
    }

    #[test]
    fn test_matches_any_first_match_wins() {
        let patterns = vec!["admin:*:*".to_string(), "doc:file:read".to_string()];
        assert!(matches_any(&patterns, "doc:file:read", &cache()));
        assert!(!matches_any(&patterns, "doc:file:write", &cache()));
    }

    #[test]
    fn test_empty_inputs_never_match() {
        assert!(!matches("", "doc:file:read", &cache()));
        assert!(!matches("doc:file:read", "", &cache()));
    }
}
