//! Source units and series metadata.

use crate::core::Language;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Placeholder used when a source file sits outside the expected tree and
/// its territory or publisher cannot be derived from the path.
pub const UNKNOWN_SEGMENT: &str = "Unknown";

/// One ingested source document.
///
/// Identity fields are derived from the source tree layout
/// `{source_root}/{territory}/{publisher}/.../file` once at ingestion and
/// are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Absolute path to the source document.
    pub path: PathBuf,
    /// Territory code segment (`KR`, `JP`, ...), or [`UNKNOWN_SEGMENT`].
    pub territory: String,
    /// Publisher segment, or [`UNKNOWN_SEGMENT`].
    pub publisher: String,
    /// Raw file stem, before series-name cleaning.
    pub file_stem: String,
}

impl SourceUnit {
    /// Derives a source unit from a file path under the source root.
    ///
    /// A path outside the root keeps the unit usable with
    /// [`UNKNOWN_SEGMENT`] markers instead of failing, matching how
    /// ad-hoc files are dropped next to the tree in practice.
    #[must_use]
    pub fn from_path(source_root: &Path, path: &Path) -> Self {
        let file_stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut territory = UNKNOWN_SEGMENT.to_string();
        let mut publisher = UNKNOWN_SEGMENT.to_string();
        if let Ok(rel) = path.strip_prefix(source_root) {
            let mut parts = rel.components();
            if let Some(part) = parts.next() {
                territory = part.as_os_str().to_string_lossy().into_owned();
            }
            if let Some(part) = parts.next() {
                // The last component is the file itself; a two-component
                // path has no publisher folder.
                if parts.next().is_some() {
                    publisher = part.as_os_str().to_string_lossy().into_owned();
                }
            }
        }
        Self {
            path: path.to_path_buf(),
            territory,
            publisher,
            file_stem,
        }
    }
}

/// Series metadata, the artifact of stage 0 (`series_metadata.json`).
///
/// Fields this engine does not know about are preserved through the `extra`
/// map so that externally enriched metadata survives a rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    /// Cleaned series name, used as the series folder name.
    pub series_name: String,
    /// Publisher derived from the source tree.
    pub publisher: String,
    /// Original (uncleaned) title from the source file name.
    pub original_title: String,
    /// Territory code segment of the source tree (`KR`, `JP`, ...).
    pub language_code: String,
    /// Detected or operator-specified source language.
    pub source_language: Language,
    /// Absolute path of the ingested source file.
    pub source_file: String,
    /// Default narrator voice for Korean synthesis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_voice_id: Option<String>,
    /// Default narrator voice for Japanese synthesis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_voice_id_jp: Option<String>,
    /// Confidence of the series-name match, `0.0` when nothing matched.
    #[serde(default)]
    pub match_score: f64,
    /// Fields written by other tools, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SeriesMetadata {
    /// Creates metadata for a freshly ingested source.
    #[must_use]
    pub fn new(
        series_name: impl Into<String>,
        unit: &SourceUnit,
        source_language: Language,
    ) -> Self {
        Self {
            series_name: series_name.into(),
            publisher: unit.publisher.clone(),
            original_title: unit.file_stem.clone(),
            language_code: unit.territory.clone(),
            source_language,
            source_file: unit.path.to_string_lossy().into_owned(),
            default_voice_id: None,
            default_voice_id_jp: None,
            match_score: 0.0,
            extra: BTreeMap::new(),
        }
    }

    /// Sets the match confidence.
    #[must_use]
    pub fn with_match_score(mut self, score: f64) -> Self {
        self.match_score = score;
        self
    }
}

/// Strips publisher markers, bracketed annotations and separator noise from
/// a raw file stem, producing the cleaned series name.
#[must_use]
pub fn clean_series_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for ch in raw.chars() {
        match ch {
            '[' | '(' | '【' | '（' => depth += 1,
            ']' | ')' | '】' | '）' => depth = depth.saturating_sub(1),
            '_' if depth == 0 => name.push(' '),
            _ if depth == 0 => name.push(ch),
            _ => {}
        }
    }
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Language;

    #[test]
    fn test_from_path_derives_segments() {
        let root = Path::new("/data/_SOURCE");
        let unit = SourceUnit::from_path(root, Path::new("/data/_SOURCE/KR/Peex/novel.docx"));
        assert_eq!(unit.territory, "KR");
        assert_eq!(unit.publisher, "Peex");
        assert_eq!(unit.file_stem, "novel");
    }

    #[test]
    fn test_from_path_with_series_subfolder() {
        let root = Path::new("/data/_SOURCE");
        let unit =
            SourceUnit::from_path(root, Path::new("/data/_SOURCE/JP/Kadokawa/series/vol1.txt"));
        assert_eq!(unit.territory, "JP");
        assert_eq!(unit.publisher, "Kadokawa");
    }

    #[test]
    fn test_from_path_outside_root_uses_unknown() {
        let root = Path::new("/data/_SOURCE");
        let unit = SourceUnit::from_path(root, Path::new("/tmp/loose.txt"));
        assert_eq!(unit.territory, UNKNOWN_SEGMENT);
        assert_eq!(unit.publisher, UNKNOWN_SEGMENT);
        assert_eq!(unit.file_stem, "loose");
    }

    #[test]
    fn test_metadata_preserves_unknown_fields() {
        let json = r#"{
            "series_name": "Debt of Love",
            "publisher": "Peex",
            "original_title": "사랑의빚",
            "language_code": "KR",
            "source_language": "korean",
            "source_file": "/data/_SOURCE/KR/Peex/사랑의빚.docx",
            "match_score": 0.92,
            "editor_note": "manually verified"
        }"#;
        let meta: SeriesMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.source_language, Language::Korean);
        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["editor_note"], "manually verified");
    }

    #[test]
    fn test_clean_series_name_strips_brackets_and_underscores() {
        assert_eq!(clean_series_name("[Peex]_사랑의빚_(final)"), "사랑의빚");
        assert_eq!(clean_series_name("Debt_of_Love"), "Debt of Love");
        assert_eq!(clean_series_name("  plain  "), "plain");
    }
}
