//! Canonical per-episode records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One episode as stored by every text stage (`episode_NNN.json`).
///
/// The shape is identical at every stage; later stages carry inline speaker
/// and emotion tags inside `content`. Fields other than the ones modeled
/// here round-trip untouched through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// One-based episode number.
    pub episode_number: u32,
    /// Episode title, may be empty for untitled episodes.
    #[serde(default)]
    pub title: String,
    /// Episode text. Later stages embed inline tags in this string.
    pub content: String,
    /// Stage-produced metadata (series name, model info, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Fields written by other tools, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EpisodeRecord {
    /// Creates a record with empty metadata.
    #[must_use]
    pub fn new(episode_number: u32, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            episode_number,
            title: title.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Canonical file name for an episode number (`episode_007.json`).
    #[must_use]
    pub fn file_name(episode_number: u32) -> String {
        format!("episode_{episode_number:03}.json")
    }

    /// Character count of the content, used in review stat lines.
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_zero_pads() {
        assert_eq!(EpisodeRecord::file_name(7), "episode_007.json");
        assert_eq!(EpisodeRecord::file_name(123), "episode_123.json");
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let json = r#"{
            "episode_number": 3,
            "title": "제3화",
            "content": "본문",
            "metadata": {"series_name": "사랑의빚"},
            "translator_notes": ["tone shift in scene 2"]
        }"#;
        let record: EpisodeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.episode_number, 3);
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["translator_notes"][0], "tone shift in scene 2");
        assert_eq!(back["metadata"]["series_name"], "사랑의빚");
    }

    #[test]
    fn test_missing_title_defaults_empty() {
        let record: EpisodeRecord =
            serde_json::from_str(r#"{"episode_number": 1, "content": "text"}"#).unwrap();
        assert_eq!(record.title, "");
    }

    #[test]
    fn test_char_count_is_chars_not_bytes() {
        let record = EpisodeRecord::new(1, "t", "가나다");
        assert_eq!(record.char_count(), 3);
    }
}
