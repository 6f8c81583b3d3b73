//! QA fragment schemas written by the translation and speech gate stages.
//!
//! Each gate cell drops one `qa_report.json` fragment into its stage dir;
//! the aggregator assembles them into the consolidated pipeline report.

use crate::core::Language;
use serde::{Deserialize, Serialize};

/// Issue classification for translation QA findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Source-script text left in the translation.
    LanguageMixing,
    /// A glossary original appearing untranslated.
    UntranslatedTerm,
    /// A translation that contradicts the glossary.
    GlossaryMismatch,
    /// Unbalanced inline tag brackets.
    TagBalance,
    /// Translated length far outside the expected ratio.
    LengthRatio,
}

/// Issue severity. Only errors fail a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Must be fixed before audio work.
    Error,
    /// Style or review hint.
    Warning,
}

/// A single finding in one translated episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaIssue {
    /// What kind of problem was found.
    #[serde(rename = "type")]
    pub kind: IssueKind,
    /// Whether the finding fails the gate.
    pub severity: Severity,
    /// The offending text.
    pub text: String,
    /// Human-readable description.
    pub message: String,
    /// Expected replacement, for mismatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Surrounding text for locating the finding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl QaIssue {
    /// Creates an issue without location details.
    pub fn new(
        kind: IssueKind,
        severity: Severity,
        text: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            text: text.into(),
            message: message.into(),
            expected: None,
            context: None,
        }
    }

    /// Attaches the expected replacement.
    #[must_use]
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    /// Attaches surrounding context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// True for error-severity findings.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Findings for one episode. Episodes without findings are not recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeIssues {
    /// The episode.
    pub episode_number: u32,
    /// False when any finding is an error.
    pub passed: bool,
    /// Error findings in this episode.
    pub error_count: usize,
    /// Warning findings in this episode.
    pub warning_count: usize,
    /// The findings themselves.
    pub issues: Vec<QaIssue>,
}

impl EpisodeIssues {
    /// Builds the per-episode record from raw findings.
    #[must_use]
    pub fn from_issues(episode_number: u32, issues: Vec<QaIssue>) -> Self {
        let error_count = issues.iter().filter(|i| i.is_error()).count();
        let warning_count = issues.len() - error_count;
        Self {
            episode_number,
            passed: error_count == 0,
            error_count,
            warning_count,
            issues,
        }
    }
}

/// The translation gate fragment for one language cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationQaFragment {
    /// The language this fragment covers.
    pub language: Language,
    /// Total error findings across episodes.
    pub error_count: usize,
    /// Total warning findings across episodes.
    pub warning_count: usize,
    /// Findings repaired in place. The gate is read-only, so always zero;
    /// the field survives for report compatibility.
    pub fixed_count: usize,
    /// True when no episode has error findings.
    pub passed: bool,
    /// Episodes with findings, episode order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episodes: Vec<EpisodeIssues>,
}

impl TranslationQaFragment {
    /// Assembles the fragment from per-episode findings, dropping episodes
    /// without findings.
    #[must_use]
    pub fn from_episodes(language: Language, episodes: Vec<EpisodeIssues>) -> Self {
        let episodes: Vec<EpisodeIssues> =
            episodes.into_iter().filter(|e| !e.issues.is_empty()).collect();
        let error_count = episodes.iter().map(|e| e.error_count).sum();
        let warning_count = episodes.iter().map(|e| e.warning_count).sum();
        Self {
            language,
            error_count,
            warning_count,
            fixed_count: 0,
            passed: error_count == 0,
            episodes,
        }
    }
}

/// One chunk verification from the speech gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkCheck {
    /// The verified audio file name.
    pub chunk_file: String,
    /// Position of the chunk within its episode.
    pub chunk_index: usize,
    /// Whether the tail check passed.
    pub passed: bool,
    /// Normalized tail of the chunk's source text.
    pub original_last_chars: String,
    /// Normalized tail of the transcription.
    pub transcribed_last_chars: String,
    /// Whether the source tail was found in the transcription.
    pub contained: bool,
    /// Set when transcription itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Chunk verifications for one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeChecks {
    /// The episode.
    pub episode_number: u32,
    /// Chunks examined.
    pub total_chunks: usize,
    /// Chunks that passed.
    pub passed: usize,
    /// Chunks that failed.
    pub failed: usize,
    /// Percentage of passing chunks.
    pub pass_rate: f64,
    /// Per-chunk details.
    pub chunks: Vec<ChunkCheck>,
}

impl EpisodeChecks {
    /// Builds the per-episode record from chunk verifications.
    #[must_use]
    pub fn from_chunks(episode_number: u32, chunks: Vec<ChunkCheck>) -> Self {
        let total_chunks = chunks.len();
        let passed = chunks.iter().filter(|c| c.passed).count();
        let failed = total_chunks - passed;
        Self {
            episode_number,
            total_chunks,
            passed,
            failed,
            pass_rate: percentage(passed, total_chunks),
            chunks,
        }
    }
}

/// The speech gate fragment for one language cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsQaFragment {
    /// The language this fragment covers.
    pub language: Language,
    /// Total passing chunks across episodes.
    pub passed_count: usize,
    /// Total failing chunks across episodes.
    pub failed_count: usize,
    /// Percentage of passing chunks.
    pub pass_rate: f64,
    /// Per-episode details, episode order.
    pub episodes: Vec<EpisodeChecks>,
}

impl TtsQaFragment {
    /// Assembles the fragment from per-episode verifications.
    #[must_use]
    pub fn from_episodes(language: Language, episodes: Vec<EpisodeChecks>) -> Self {
        let passed_count = episodes.iter().map(|e| e.passed).sum();
        let failed_count = episodes.iter().map(|e| e.failed).sum();
        Self {
            language,
            passed_count,
            failed_count,
            pass_rate: percentage(passed_count, passed_count + failed_count),
            episodes,
        }
    }

    /// True when every examined chunk passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failed_count == 0
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}
