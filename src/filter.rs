// src/filter.rs
use std::collections::BTreeSet;

use crate::sanitize::sanitize;

/// True when `tags` and `allowed` share at least one label.
/// Exact, case-sensitive comparison.
pub fn is_interesting(tags: &BTreeSet<String>, allowed: &BTreeSet<String>) -> bool {
    tags.intersection(allowed).next().is_some()
}

/// Fixed allow-list of category labels, read-only after startup.
#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    allowed: BTreeSet<String>,
}

impl CategoryFilter {
    /// Labels go through the same sanitizer as entry tags, so `Biotech & Health`
    /// matches the sanitized tag `Biotech &amp; Health`.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = labels
            .into_iter()
            .map(|l| sanitize(l.as_ref().trim()))
            .filter(|l| !l.is_empty())
            .collect();
        Self { allowed }
    }

    pub fn matches(&self, tags: &BTreeSet<String>) -> bool {
        is_interesting(tags, &self.allowed)
    }

    pub fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }
}
