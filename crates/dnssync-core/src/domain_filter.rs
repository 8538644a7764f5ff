//! Suffix-based domain scoping
//!
//! The same filter guards the read path (`records()`) and the write path
//! (`apply_changes()`), so a record outside the filter is never listed,
//! created or deleted.

use serde::{Deserialize, Serialize};

/// Ordered include/exclude suffix lists
///
/// A name matches a suffix `s` when it equals `s` or ends with `.s`. A suffix
/// written with a leading dot (`.example.com`) matches subdomains only.
/// Matching is case-insensitive and ignores trailing dots. An empty include
/// list matches every name; an exclude match always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    include: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    exclude: Vec<String>,
}

impl DomainFilter {
    /// Create a filter from include suffixes; blank entries are ignored
    pub fn new<I, S>(include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            include: normalize_all(include),
            exclude: Vec::new(),
        }
    }

    /// Add exclude suffixes
    pub fn with_exclusions<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude = normalize_all(exclude);
        self
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Whether the filter has any include or exclude entries
    pub fn is_configured(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }

    /// Check whether a DNS name is in scope
    pub fn matches(&self, name: &str) -> bool {
        let name = normalize(name);

        if self.exclude.iter().any(|suffix| suffix_matches(&name, suffix)) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|suffix| suffix_matches(&name, suffix))
    }
}

fn normalize_all<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|e| normalize(e.as_ref()))
        .filter(|e| !e.is_empty() && e != ".")
        .collect()
}

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn suffix_matches(name: &str, suffix: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    // ".example.com" only matches names below example.com
    if suffix.starts_with('.') {
        return name.ends_with(suffix);
    }

    name == suffix
        || name
            .strip_suffix(suffix)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
