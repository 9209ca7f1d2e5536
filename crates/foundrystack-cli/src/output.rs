//! Formatted output helpers for CLI commands.

use std::collections::BTreeMap;

use foundrystack_compose::template::Template;

/// A heavy rule as wide as `title`, for underlining headings.
#[must_use]
pub fn rule(title: &str) -> String {
    "\u{2550}".repeat(title.chars().count())
}

/// Resource counts keyed by resource type.
#[must_use]
pub fn resource_counts(template: &Template) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for (_, resource) in template.resources() {
        *counts.entry(resource.resource_type.as_str()).or_insert(0) += 1;
    }
    counts
}
