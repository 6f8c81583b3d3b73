//! Per-language glossary sidecars.
//!
//! The translate stage accumulates term mappings into
//! `glossary_{language}.json` at the series root so later episodes and
//! re-runs reuse established translations. The CSV export is what
//! reviewers actually read.

use crate::core::Language;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One glossary term mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    /// Term category (`character`, `location`, `term`, ...).
    pub category: String,
    /// Term in the source language.
    pub original: String,
    /// Established translation.
    pub translation: String,
    /// Optional usage note.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
}

impl GlossaryEntry {
    /// Creates an entry without a context note.
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        original: impl Into<String>,
        translation: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            original: original.into(),
            translation: translation.into(),
            context: String::new(),
        }
    }

    /// Sort rank of a category; unknown categories sort last.
    #[must_use]
    pub fn category_rank(category: &str) -> usize {
        match category {
            "character" => 0,
            "location" => 1,
            "term" => 2,
            "skill" => 3,
            "item" => 4,
            "organization" => 5,
            _ => 6,
        }
    }
}

/// Canonical sidecar file name for one language.
#[must_use]
pub fn glossary_file_name(language: Language) -> String {
    format!("glossary_{language}.json")
}

/// Merges new entries into an existing glossary.
///
/// An entry is new when no existing entry has the same `(category,
/// original)` pair; established translations are never overwritten.
/// Returns the number of entries added.
pub fn merge_entries(glossary: &mut Vec<GlossaryEntry>, incoming: Vec<GlossaryEntry>) -> usize {
    let mut added = 0;
    for entry in incoming {
        let exists = glossary
            .iter()
            .any(|g| g.category == entry.category && g.original == entry.original);
        if !exists {
            glossary.push(entry);
            added += 1;
        }
    }
    added
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Renders a glossary to CSV, ordered by category rank then original term.
#[must_use]
pub fn to_csv(entries: &[GlossaryEntry]) -> String {
    let mut sorted: Vec<&GlossaryEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        GlossaryEntry::category_rank(&a.category)
            .cmp(&GlossaryEntry::category_rank(&b.category))
            .then_with(|| a.original.cmp(&b.original))
    });
    let mut out = String::from("Category,Original,Translation,Context\n");
    for entry in sorted {
        let _ = writeln!(
            out,
            "{},{},{},{}",
            csv_escape(&entry.category),
            csv_escape(&entry.original),
            csv_escape(&entry.translation),
            csv_escape(&entry.context),
        );
    }
    out
}
