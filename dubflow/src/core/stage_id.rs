//! Stage identifiers and their fixed ordering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifies one stage of the localization pipeline.
///
/// The pipeline is a fixed, closed sequence: main stages are numbered `0`
/// through `7`, and the optional quality gates `2a`, `3a` and `6a` slot in
/// directly after their parent stage. The declaration order of the variants
/// is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageId {
    /// Stage 0: source ingestion and series metadata.
    #[serde(rename = "0")]
    Prepare,
    /// Stage 1: split the source text into episodes.
    #[serde(rename = "1")]
    Split,
    /// Stage 2: translate episodes into a target language.
    #[serde(rename = "2")]
    Translate,
    /// Stage 2a: translation quality gate.
    #[serde(rename = "2a")]
    TranslationQa,
    /// Stage 3: normalize text for speech synthesis.
    #[serde(rename = "3")]
    TtsFormat,
    /// Stage 3a: speaker identification and tagging.
    #[serde(rename = "3a")]
    SpeakerTagging,
    /// Stage 4: emotion and delivery tagging.
    #[serde(rename = "4")]
    EmotionTagging,
    /// Stage 5: voice casting and audio configuration.
    #[serde(rename = "5")]
    AudioSetup,
    /// Stage 6: speech synthesis per episode chunk.
    #[serde(rename = "6")]
    TtsGeneration,
    /// Stage 6a: synthesized-audio quality gate.
    #[serde(rename = "6a")]
    TtsQa,
    /// Stage 7: concatenation, mastering and music mix.
    #[serde(rename = "7")]
    AudioMixing,
}

/// Whether a stage produces one artifact for the whole series or one per
/// target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageScope {
    /// One artifact for the series (stages 0 and 1).
    Series,
    /// One artifact per target language (stages 2 through 7).
    PerLanguage,
}

impl StageId {
    /// All stages in execution order.
    pub const ALL: [Self; 11] = [
        Self::Prepare,
        Self::Split,
        Self::Translate,
        Self::TranslationQa,
        Self::TtsFormat,
        Self::SpeakerTagging,
        Self::EmotionTagging,
        Self::AudioSetup,
        Self::TtsGeneration,
        Self::TtsQa,
        Self::AudioMixing,
    ];

    /// Position of this stage in the execution order.
    #[must_use]
    pub fn position(&self) -> usize {
        *self as usize
    }

    /// The short token used on the command line and in reports (`"0"`, `"2a"`, ...).
    #[must_use]
    pub fn token(&self) -> &'static str {
        match self {
            Self::Prepare => "0",
            Self::Split => "1",
            Self::Translate => "2",
            Self::TranslationQa => "2a",
            Self::TtsFormat => "3",
            Self::SpeakerTagging => "3a",
            Self::EmotionTagging => "4",
            Self::AudioSetup => "5",
            Self::TtsGeneration => "6",
            Self::TtsQa => "6a",
            Self::AudioMixing => "7",
        }
    }

    /// Human-readable stage title, used in review documents and reports.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::Prepare => "Prepare",
            Self::Split => "Split",
            Self::Translate => "Translated",
            Self::TranslationQa => "Translation QA",
            Self::TtsFormat => "TTS Formatted",
            Self::SpeakerTagging => "Speaker Tagged",
            Self::EmotionTagging => "Emotion Tagged",
            Self::AudioSetup => "Audio Setup",
            Self::TtsGeneration => "TTS Audio",
            Self::TtsQa => "TTS QA",
            Self::AudioMixing => "Final Audio",
        }
    }

    /// Directory name for this stage's artifacts under the series folder.
    ///
    /// Stage 0 has no numbered directory; its artifact lives at the series
    /// root, so this returns `None` for [`StageId::Prepare`].
    #[must_use]
    pub fn dir_name(&self) -> Option<&'static str> {
        match self {
            Self::Prepare => None,
            Self::Split => Some("01_split"),
            Self::Translate => Some("02_translated"),
            Self::TranslationQa => Some("02a_qa_report"),
            Self::TtsFormat => Some("03_formatted"),
            Self::SpeakerTagging => Some("03a_speaker_tagged"),
            Self::EmotionTagging => Some("04_tagged"),
            Self::AudioSetup => Some("05_audio_setup"),
            Self::TtsGeneration => Some("06_tts_audio"),
            Self::TtsQa => Some("06a_tts_qa_report"),
            Self::AudioMixing => Some("07_final_audio"),
        }
    }

    /// Whether this is an optional quality gate (`2a`, `3a`, `6a`).
    ///
    /// Quality gates are never a hard dependency of any downstream stage;
    /// skipping one never blocks the rest of the pipeline.
    #[must_use]
    pub fn is_substage(&self) -> bool {
        matches!(self, Self::TranslationQa | Self::SpeakerTagging | Self::TtsQa)
    }

    /// Whether running this stage calls out to an external model or speech
    /// service and therefore sits behind the cooperative rate-limit delay.
    #[must_use]
    pub fn is_api_bound(&self) -> bool {
        !matches!(self, Self::Prepare | Self::TranslationQa | Self::AudioMixing)
    }

    /// Artifact scope of this stage.
    #[must_use]
    pub fn scope(&self) -> StageScope {
        match self {
            Self::Prepare | Self::Split => StageScope::Series,
            _ => StageScope::PerLanguage,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Error returned when parsing an unknown stage token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage id '{token}' (expected one of 0, 1, 2, 2a, 3, 3a, 4, 5, 6, 6a, 7)")]
pub struct ParseStageIdError {
    /// The token that failed to parse.
    pub token: String,
}

impl FromStr for StageId {
    type Err = ParseStageIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" => Ok(Self::Prepare),
            "1" => Ok(Self::Split),
            "2" => Ok(Self::Translate),
            "2a" => Ok(Self::TranslationQa),
            "3" => Ok(Self::TtsFormat),
            "3a" => Ok(Self::SpeakerTagging),
            "4" => Ok(Self::EmotionTagging),
            "5" => Ok(Self::AudioSetup),
            "6" => Ok(Self::TtsGeneration),
            "6a" => Ok(Self::TtsQa),
            "7" => Ok(Self::AudioMixing),
            _ => Err(ParseStageIdError {
                token: s.trim().to_string(),
            }),
        }
    }
}
