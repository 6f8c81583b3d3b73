//! Consolidated pipeline QA report assembled from gate fragments.

use crate::core::{Language, StageId};
use crate::errors::ArtifactError;
use crate::qa::{TranslationQaFragment, TtsQaFragment};
use crate::store::{ArtifactStore, QA_REPORT_FILE};
use crate::utils::iso_timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Markdown rendering of the consolidated report at the series root.
pub const QA_SUMMARY_MD: &str = "pipeline_qa_report.md";

/// JSON twin of the consolidated report.
pub const QA_SUMMARY_JSON: &str = "pipeline_qa_report.json";

/// Verdict of one gate cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionVerdict {
    /// The gate ran and found no errors.
    Passed,
    /// The gate ran and found errors.
    Failed,
    /// The gate never ran for this cell.
    NotEvaluated,
}

/// One gate cell in the consolidated report.
///
/// A gate that did not run is listed as `NotEvaluated` with the reason;
/// verdicts are never fabricated for skipped or blocked cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QaSection {
    /// Stage `2a` fragment for one language.
    Translation(TranslationQaFragment),
    /// Stage `6a` fragment for one language.
    Speech(TtsQaFragment),
    /// The gate did not run for this cell.
    NotEvaluated {
        /// Which gate.
        stage: StageId,
        /// Which language cell.
        language: Language,
        /// Why there is no fragment.
        reason: String,
    },
}

impl QaSection {
    /// The gate stage this section covers.
    #[must_use]
    pub fn stage(&self) -> StageId {
        match self {
            Self::Translation(_) => StageId::TranslationQa,
            Self::Speech(_) => StageId::TtsQa,
            Self::NotEvaluated { stage, .. } => *stage,
        }
    }

    /// The language cell this section covers.
    #[must_use]
    pub fn language(&self) -> Language {
        match self {
            Self::Translation(f) => f.language,
            Self::Speech(f) => f.language,
            Self::NotEvaluated { language, .. } => *language,
        }
    }

    /// The section verdict.
    #[must_use]
    pub fn verdict(&self) -> SectionVerdict {
        match self {
            Self::Translation(f) if f.passed => SectionVerdict::Passed,
            Self::Translation(_) => SectionVerdict::Failed,
            Self::Speech(f) if f.passed() => SectionVerdict::Passed,
            Self::Speech(_) => SectionVerdict::Failed,
            Self::NotEvaluated { .. } => SectionVerdict::NotEvaluated,
        }
    }
}

/// The consolidated QA report for one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaSummary {
    /// Series the report covers.
    pub series_name: String,
    /// When the report was assembled.
    pub generated_at: String,
    /// One section per gate cell, stage order then language order.
    pub sections: Vec<QaSection>,
    /// True when every evaluated section passed. Not-evaluated sections
    /// are listed but do not fail the verdict.
    pub passed: bool,
}

/// Assembles the consolidated report from the gate fragments on disk.
#[derive(Debug)]
pub struct QaAggregator<'a> {
    store: &'a ArtifactStore,
}

impl<'a> QaAggregator<'a> {
    /// Creates an aggregator over one series store.
    #[must_use]
    pub fn new(store: &'a ArtifactStore) -> Self {
        Self { store }
    }

    /// Reads every gate fragment for the given languages.
    pub fn aggregate(&self, languages: &[Language]) -> Result<QaSummary, ArtifactError> {
        let series_name = self
            .store
            .read_metadata()
            .map(|m| m.series_name)
            .unwrap_or_else(|_| {
                self.store
                    .series_dir()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        let mut sections = Vec::with_capacity(languages.len() * 2);
        for &language in languages {
            let fragment: Option<TranslationQaFragment> = self.store.read_json_optional(
                StageId::TranslationQa,
                Some(language),
                QA_REPORT_FILE,
            )?;
            sections.push(match fragment {
                Some(f) => QaSection::Translation(f),
                None => not_evaluated(StageId::TranslationQa, language),
            });
        }
        for &language in languages {
            let fragment: Option<TtsQaFragment> =
                self.store
                    .read_json_optional(StageId::TtsQa, Some(language), QA_REPORT_FILE)?;
            sections.push(match fragment {
                Some(f) => QaSection::Speech(f),
                None => not_evaluated(StageId::TtsQa, language),
            });
        }

        let passed = sections
            .iter()
            .all(|s| s.verdict() != SectionVerdict::Failed);
        Ok(QaSummary {
            series_name,
            generated_at: iso_timestamp(),
            sections,
            passed,
        })
    }

    /// Writes the markdown report and its JSON twin at the series root,
    /// returning both paths.
    pub fn write_reports(&self, summary: &QaSummary) -> Result<(PathBuf, PathBuf), ArtifactError> {
        self.store.ensure_series_dir()?;
        let md_path = self.store.series_dir().join(QA_SUMMARY_MD);
        fs::write(&md_path, summary.to_string()).map_err(|e| ArtifactError::io(&md_path, e))?;
        let json_path = self.store.series_dir().join(QA_SUMMARY_JSON);
        let json = serde_json::to_vec_pretty(summary)
            .map_err(|e| ArtifactError::json(&json_path, e))?;
        fs::write(&json_path, json).map_err(|e| ArtifactError::io(&json_path, e))?;
        Ok((md_path, json_path))
    }
}

fn not_evaluated(stage: StageId, language: Language) -> QaSection {
    QaSection::NotEvaluated {
        stage,
        language,
        reason: "gate did not run for this cell".to_string(),
    }
}

impl fmt::Display for QaSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Pipeline QA Report - {}", self.series_name)?;
        writeln!(f)?;
        writeln!(f, "> Generated: {}", self.generated_at)?;
        writeln!(
            f,
            "> Overall: {}",
            if self.passed { "PASS" } else { "FAIL" }
        )?;

        for (title, stage) in [
            ("Translation QA (stage 2a)", StageId::TranslationQa),
            ("Speech QA (stage 6a)", StageId::TtsQa),
        ] {
            writeln!(f)?;
            writeln!(f, "## {title}")?;
            writeln!(f)?;
            for section in self.sections.iter().filter(|s| s.stage() == stage) {
                write_section(f, section)?;
            }
        }
        Ok(())
    }
}

fn write_section(f: &mut fmt::Formatter<'_>, section: &QaSection) -> fmt::Result {
    match section {
        QaSection::Translation(fragment) => {
            writeln!(
                f,
                "- {}: {} ({} errors, {} warnings)",
                fragment.language,
                if fragment.passed { "PASS" } else { "FAIL" },
                fragment.error_count,
                fragment.warning_count,
            )?;
            for episode in fragment.episodes.iter().filter(|e| !e.passed) {
                writeln!(
                    f,
                    "  - episode {:03}: {} error(s)",
                    episode.episode_number, episode.error_count
                )?;
                for issue in episode.issues.iter().filter(|i| i.is_error()).take(3) {
                    writeln!(f, "    - '{}': {}", issue.text, issue.message)?;
                }
            }
        }
        QaSection::Speech(fragment) => {
            writeln!(
                f,
                "- {}: {} ({}/{} chunks, {:.1}%)",
                fragment.language,
                if fragment.passed() { "PASS" } else { "FAIL" },
                fragment.passed_count,
                fragment.passed_count + fragment.failed_count,
                fragment.pass_rate,
            )?;
            for episode in fragment.episodes.iter().filter(|e| e.failed > 0) {
                for chunk in episode.chunks.iter().filter(|c| !c.passed).take(3) {
                    writeln!(
                        f,
                        "  - episode {:03} {}: expected '{}' got '{}'",
                        episode.episode_number,
                        chunk.chunk_file,
                        chunk.original_last_chars,
                        chunk.transcribed_last_chars,
                    )?;
                }
            }
        }
        QaSection::NotEvaluated {
            language, reason, ..
        } => {
            writeln!(f, "- {language}: not evaluated ({reason})")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::{EpisodeChecks, EpisodeIssues, IssueKind, QaIssue, Severity};
    use crate::testing::TestSeries;
    use tempfile::TempDir;

    fn failing_translation_fragment(language: Language) -> TranslationQaFragment {
        TranslationQaFragment::from_episodes(
            language,
            vec![EpisodeIssues::from_issues(
                2,
                vec![QaIssue::new(
                    IssueKind::UntranslatedTerm,
                    Severity::Error,
                    "주인공",
                    "glossary term left untranslated",
                )],
            )],
        )
    }

    #[test]
    fn test_not_evaluated_sections_do_not_fail_the_verdict() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        let summary = QaAggregator::new(&series.store)
            .aggregate(&[Language::Korean, Language::Japanese])
            .unwrap();

        assert!(summary.passed);
        assert_eq!(summary.sections.len(), 4);
        assert!(summary
            .sections
            .iter()
            .all(|s| s.verdict() == SectionVerdict::NotEvaluated));
    }

    #[test]
    fn test_failed_fragment_fails_the_verdict() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        series
            .store
            .write_json(
                StageId::TranslationQa,
                Some(Language::Japanese),
                QA_REPORT_FILE,
                &failing_translation_fragment(Language::Japanese),
            )
            .unwrap();

        let summary = QaAggregator::new(&series.store)
            .aggregate(&[Language::Japanese])
            .unwrap();
        assert!(!summary.passed);
        assert_eq!(summary.sections[0].verdict(), SectionVerdict::Failed);
    }

    #[test]
    fn test_markdown_lists_every_cell() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        series
            .store
            .write_json(
                StageId::TranslationQa,
                Some(Language::Japanese),
                QA_REPORT_FILE,
                &failing_translation_fragment(Language::Japanese),
            )
            .unwrap();
        series
            .store
            .write_json(
                StageId::TtsQa,
                Some(Language::Japanese),
                QA_REPORT_FILE,
                &TtsQaFragment::from_episodes(
                    Language::Japanese,
                    vec![EpisodeChecks::from_chunks(1, Vec::new())],
                ),
            )
            .unwrap();

        let summary = QaAggregator::new(&series.store)
            .aggregate(&[Language::Japanese])
            .unwrap();
        let rendered = summary.to_string();
        assert!(rendered.contains("# Pipeline QA Report - Debt of Love"));
        assert!(rendered.contains("> Overall: FAIL"));
        assert!(rendered.contains("- japanese: FAIL (1 errors, 0 warnings)"));
        assert!(rendered.contains("episode 002"));
        assert!(rendered.contains("glossary term left untranslated"));
    }

    #[test]
    fn test_reports_land_at_the_series_root() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        let aggregator = QaAggregator::new(&series.store);
        let summary = aggregator.aggregate(&[Language::Korean]).unwrap();
        let (md, json) = aggregator.write_reports(&summary).unwrap();

        assert_eq!(md, series.store.series_dir().join(QA_SUMMARY_MD));
        let raw = fs::read_to_string(json).unwrap();
        let parsed: QaSummary = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, summary);
    }
}
