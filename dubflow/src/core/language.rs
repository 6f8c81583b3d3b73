//! Target languages and source-language detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A language the pipeline can translate into or synthesize for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Korean (`KR`).
    Korean,
    /// Japanese (`JP`).
    Japanese,
    /// Taiwanese Mandarin (`TW`).
    Taiwanese,
}

impl Language {
    /// All supported languages.
    pub const ALL: [Self; 3] = [Self::Korean, Self::Japanese, Self::Taiwanese];

    /// The default target set when the caller does not pass a language list.
    pub const DEFAULT_TARGETS: [Self; 2] = [Self::Korean, Self::Japanese];

    /// Lowercase language name, used in artifact paths.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Korean => "korean",
            Self::Japanese => "japanese",
            Self::Taiwanese => "taiwanese",
        }
    }

    /// Two-letter territory code, used in the source and output tree roots.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Korean => "KR",
            Self::Japanese => "JP",
            Self::Taiwanese => "TW",
        }
    }

    /// Uppercase display label for review document headers.
    #[must_use]
    pub fn label(&self) -> String {
        self.name().to_uppercase()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned when parsing an unknown language name or code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown language '{value}' (expected korean/KR, japanese/JP or taiwanese/TW)")]
pub struct ParseLanguageError {
    /// The value that failed to parse.
    pub value: String,
}

impl FromStr for Language {
    type Err = ParseLanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "korean" | "kr" | "ko" => Ok(Self::Korean),
            "japanese" | "jp" | "ja" => Ok(Self::Japanese),
            "taiwanese" | "tw" | "zh-tw" => Ok(Self::Taiwanese),
            _ => Err(ParseLanguageError {
                value: s.trim().to_string(),
            }),
        }
    }
}

/// Number of leading characters sampled by [`detect_source_language`].
const DETECTION_SAMPLE_CHARS: usize = 2000;

/// Guesses whether a source text is Korean or Japanese.
///
/// Samples the first 2000 characters and compares the count of Hangul
/// syllables and jamo against hiragana and katakana. Japanese wins only on a
/// strictly higher kana count; Korean is the default for mixed or empty
/// samples.
#[must_use]
pub fn detect_source_language(text: &str) -> Language {
    let mut hangul = 0usize;
    let mut kana = 0usize;
    for ch in text.chars().take(DETECTION_SAMPLE_CHARS) {
        let cp = ch as u32;
        match cp {
            0xAC00..=0xD7AF | 0x1100..=0x11FF => hangul += 1,
            0x3040..=0x309F | 0x30A0..=0x30FF => kana += 1,
            _ => {}
        }
    }
    if kana > hangul {
        Language::Japanese
    } else {
        Language::Korean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_code_round_trip() {
        for lang in Language::ALL {
            assert_eq!(lang.name().parse::<Language>().unwrap(), lang);
            assert_eq!(lang.code().parse::<Language>().unwrap(), lang);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "english".parse::<Language>().unwrap_err();
        assert_eq!(err.value, "english");
    }

    #[test]
    fn test_detect_korean_text() {
        assert_eq!(detect_source_language("안녕하세요. 오늘의 이야기."), Language::Korean);
    }

    #[test]
    fn test_detect_japanese_text() {
        assert_eq!(detect_source_language("こんにちは。今日の物語です。"), Language::Japanese);
    }

    #[test]
    fn test_detect_defaults_to_korean() {
        assert_eq!(detect_source_language(""), Language::Korean);
        assert_eq!(detect_source_language("plain ascii only"), Language::Korean);
    }

    #[test]
    fn test_detect_ignores_text_beyond_sample() {
        let mut text = "가".repeat(2000);
        text.push_str(&"あ".repeat(5000));
        assert_eq!(detect_source_language(&text), Language::Korean);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Language::Korean).unwrap(), "\"korean\"");
        let back: Language = serde_json::from_str("\"taiwanese\"").unwrap();
        assert_eq!(back, Language::Taiwanese);
    }
}
