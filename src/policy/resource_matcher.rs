//! Resource pattern matching (§4.3): variable substitution, arity
//! validation, hierarchical `/`-path matching, and NotResource exclusion.

use crate::policy::cache::RegexCache;
use crate::policy::context::EvaluationContext;

/// Matches a single Resource pattern against a requested resource string,
/// after substituting `${scope:key}` references from `context` (§4.3).
pub fn matches(pattern: &str, requested: &str, context: &EvaluationContext, cache: &RegexCache) -> bool {
    let skip_validation = pattern.contains("${");
    let substituted = context.substitute(pattern);

    if substituted == "*" {
        return true;
    }

    if !skip_validation && !has_valid_arity(requested) {
        return false;
    }

    if substituted.contains('/') || requested.contains('/') {
        return match_hierarchical(&substituted, requested, cache);
    }

    match_simple(&substituted, requested, cache)
}

/// A resource string has valid arity iff its leading `/`-delimited path
/// component — the `service:resource-type:id` identifier proper — has at
/// least 3 colon-separated segments (§4.3 step 3). Trailing path components
/// are sub-resource ids (e.g. `api:doc:sensitivity:confidential/x`'s `x`)
/// and are free-form: `match_simple`'s final pattern segment is documented
/// to absorb arbitrary colon-separated text there, so they carry no arity
/// requirement of their own.
fn has_valid_arity(requested: &str) -> bool {
    if requested == "*" {
        return true;
    }
    let leading = requested.split('/').next().unwrap_or(requested);
    leading.split(':').count() >= 3
}

fn match_hierarchical(pattern: &str, requested: &str, cache: &RegexCache) -> bool {
    let pattern_components: Vec<&str> = pattern.split('/').collect();
    let requested_components: Vec<&str> = requested.split('/').collect();
    if pattern_components.len() != requested_components.len() {
        return false;
    }
    pattern_components
        .iter()
        .zip(requested_components.iter())
        .all(|(p, r)| match_simple(p, r, cache))
}

/// Matches one `/`-free resource component. Unlike the Action matcher, the
/// final pattern segment absorbs any remaining colon-separated text in the
/// requested value: a `service:resource-type:id` pattern's `id` segment is
/// itself free-form and may contain further colons (e.g. a compound id), so
/// the requested value is split into at most as many parts as the pattern
/// has, via `splitn`, rather than requiring an exact segment-count match.
fn match_simple(pattern: &str, requested: &str, cache: &RegexCache) -> bool {
    let pattern_segments: Vec<&str> = pattern.split(':').collect();
    let requested_segments: Vec<&str> = requested.splitn(pattern_segments.len(), ':').collect();
    if pattern_segments.len() != requested_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(requested_segments.iter())
        .all(|(p, r)| crate::policy::action_matcher::match_segment(p, r, cache))
}

/// Matches the first pattern in `patterns` that succeeds (§4.2 tie-break,
/// reused by the PDP's pre-filter pass).
pub fn matches_any(patterns: &[String], requested: &str, context: &EvaluationContext, cache: &RegexCache) -> bool {
    patterns.iter().any(|pattern| matches(pattern, requested, context, cache))
}

/// NotResource evaluation: the resource is excluded iff at least one
/// NotResource pattern matches (§4.3).
pub fn is_excluded(not_resource_patterns: &[String], requested: &str, context: &EvaluationContext, cache: &RegexCache) -> bool {
    not_resource_patterns
        .iter()
        .any(|pattern| matches(pattern, requested, context, cache))
}
