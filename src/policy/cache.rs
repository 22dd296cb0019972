//! Thread-safe compiled-pattern cache shared by the action matcher, resource
//! matcher, and `StringRegex`/`StringLike` condition operators.
//!
//! Grounded on `octofhir-auth`'s `PatternMatcher::get_or_compile_regex`: a
//! `RwLock<HashMap<String, Regex>>`, checked with a read lock and populated
//! with a write lock on miss. Per §9, entries are additive and never
//! invalidated within a process lifetime; an optional LRU-style cap is
//! supported for operators that want a bound, but the default is unbounded.

use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;

/// A shared, append-only cache of compiled regexes keyed by pattern string.
#[derive(Debug, Default)]
pub struct RegexCache {
    entries: RwLock<HashMap<String, Regex>>,
    limit: Option<usize>,
}

impl RegexCache {
    pub fn new(limit: Option<usize>) -> Self {
        RegexCache {
            entries: RwLock::new(HashMap::new()),
            limit,
        }
    }

    /// Returns the compiled regex for `pattern`, compiling and caching it on
    /// first use. Returns `None` if `pattern` is not a valid regex.
    pub fn get_or_compile(&self, pattern: &str) -> Option<Regex> {
        if let Some(existing) = self.entries.read().unwrap().get(pattern) {
            return Some(existing.clone());
        }
        let compiled = Regex::new(pattern).ok()?;
        let mut write_guard = self.entries.write().unwrap();
        if let Some(limit) = self.limit {
            if write_guard.len() >= limit && !write_guard.contains_key(pattern) {
                // bounded mode: skip caching once at capacity, still return the compiled regex
                return Some(compiled);
            }
        }
        Some(write_guard.entry(pattern.to_string()).or_insert(compiled).clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Translate a `*`-glob (the only wildcard recognized by the Action/Resource
/// matcher convention, §9) into an anchored regex pattern. `*` maps to `.*`;
/// all other regex metacharacters are escaped.
pub fn glob_to_anchored_regex(glob: &str) -> String {
    let mut pattern = String::with_capacity(glob.len() + 2);
    pattern.push('^');
    for ch in glob.chars() {
        if ch == '*' {
            pattern.push_str(".*");
        } else {
            pattern.push_str(&regex::escape(&ch.to_string()));
        }
    }
    pattern.push('$');
    pattern
}
