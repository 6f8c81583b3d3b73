//! Stage 3: normalize translated text for synthesis.

use crate::core::{EpisodeRecord, Language, StageId};
use crate::errors::StageError;
use crate::stages::{StageContext, StageReport, StageUnit};
use crate::utils::sino_numeral;
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

/// Leading episode-header shapes the formatter strips before prepending the
/// canonical one. Models occasionally emit several in a row, translated or
/// respelled in hiragana.
const HEADER_PATTERNS: &[&str] = &[
    r"(?i)^episode\s+[^\n]*\n+",
    r"^에피소드\s*[^\n]*\n+",
    r"^(?:제)?\d+\s*화\s*[.。:]?[^\n]*\n+",
    r"^第[^\n話集]{0,10}[話集]\s*[.。]?[^\n]*\n+",
    r"^だい[ぁ-ゖ]+(?:しゅう|わ|か|ばん)\s*[.。]?\s*\n+",
];

/// Runs the speech normalization pass over each translated episode and
/// canonicalizes the spoken episode header.
///
/// The model rewrites numbers, units and symbols into words; this unit then
/// strips whatever header shapes survived translation and prepends the one
/// canonical header for the cell's language.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtsFormatStage;

#[async_trait]
impl StageUnit for TtsFormatStage {
    fn name(&self) -> &str {
        "tts_format"
    }

    fn id(&self) -> StageId {
        StageId::TtsFormat
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let language = ctx.require_language()?;
        let episodes = ctx
            .store()
            .read_episodes(StageId::Translate, Some(language))?;
        if episodes.is_empty() {
            return Err(StageError::InvalidInput(
                "no translated episodes to format".to_string(),
            ));
        }

        let headers = HeaderRules::new();
        for record in &episodes {
            let formatted = ctx
                .services()
                .model
                .format_for_tts(&record.content, language)
                .await?;
            report.api_calls += 1;
            let (title, title_source) = if record.title.trim().is_empty() {
                (default_title(record.episode_number, language), "default")
            } else {
                (record.title.clone(), "existing")
            };
            let body = headers.strip_leading_headers(&formatted);
            let content = format!(
                "{}{body}",
                episode_header(record.episode_number, &title, language)
            );
            let out = EpisodeRecord::new(record.episode_number, title, content)
                .with_metadata("formatting_applied", json!(true))
                .with_metadata("formatting_language", json!(language.to_string()))
                .with_metadata("title_source", json!(title_source));
            ctx.store()
                .write_episode(StageId::TtsFormat, Some(language), &out)?;
            report.produced_files += 1;
        }
        ctx.store()
            .seal(StageId::TtsFormat, Some(language), Some(episodes.len()))?;
        report.note(format!("formatted {} episodes for speech", episodes.len()));
        Ok(report)
    }
}

/// Compiled header-stripping rules.
struct HeaderRules {
    patterns: Vec<Regex>,
}

impl HeaderRules {
    fn new() -> Self {
        Self {
            patterns: HEADER_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }

    /// Strips every recognized header shape from the start of the text.
    fn strip_leading_headers(&self, content: &str) -> String {
        let mut text = content.trim_start().to_string();
        loop {
            let mut changed = false;
            for regex in &self.patterns {
                if let Some(m) = regex.find(&text) {
                    text = text[m.end()..].trim_start().to_string();
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        text
    }
}

/// Canonical spoken header for one episode.
fn episode_header(number: u32, title: &str, language: Language) -> String {
    match language {
        Language::Korean => {
            format!("Episode {}. {title}.\n\n", sino_numeral(number, language))
        }
        Language::Japanese => format!("第{number}話。{title}。\n\n"),
        Language::Taiwanese => format!("第{}集。{title}。\n\n", sino_numeral(number, language)),
    }
}

/// Fallback title when upstream stages produced none.
fn default_title(number: u32, language: Language) -> String {
    match language {
        Language::Korean => format!("에피소드 {number}"),
        Language::Japanese => format!("エピソード {number}"),
        Language::Taiwanese => format!("第{number}集"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedServices, TestSeries};
    use tempfile::TempDir;

    #[test]
    fn test_stacked_headers_are_stripped() {
        let rules = HeaderRules::new();
        let cleaned =
            rules.strip_leading_headers("Episode 일. 제목.\n\n에피소드 일.\n\n본문이 시작된다.");
        assert_eq!(cleaned, "본문이 시작된다.");
    }

    #[test]
    fn test_kanji_and_hiragana_headers_are_stripped() {
        let rules = HeaderRules::new();
        assert_eq!(
            rules.strip_leading_headers("第一話。タイトル。\n\n本文。"),
            "本文。"
        );
        assert_eq!(
            rules.strip_leading_headers("だいいちわ。\n\n本文。"),
            "本文。"
        );
    }

    #[test]
    fn test_canonical_header_per_language() {
        assert_eq!(
            episode_header(3, "제목", Language::Korean),
            "Episode 삼. 제목.\n\n"
        );
        assert_eq!(
            episode_header(3, "題名", Language::Japanese),
            "第3話。題名。\n\n"
        );
        assert_eq!(
            episode_header(12, "標題", Language::Taiwanese),
            "第十二集。標題。\n\n"
        );
    }

    #[tokio::test]
    async fn test_format_canonicalizes_header_and_keeps_body() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        series.seed_stage(
            StageId::Translate,
            Some(Language::Japanese),
            &[
                (1, "", "Episode 일. 첫 화.\n\n(JP) 本文です。"),
                (2, "愛の借金", "Episode 이.\n\n(JP) 続きです。"),
            ],
        );
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Japanese));
        let report = TtsFormatStage.execute(&ctx).await.unwrap();

        assert_eq!(report.api_calls, 2);
        let records = series
            .store
            .read_episodes(StageId::TtsFormat, Some(Language::Japanese))
            .unwrap();
        assert_eq!(
            records[0].content,
            "第1話。エピソード 1。\n\n(JP) 本文です。"
        );
        assert_eq!(records[0].metadata["title_source"], json!("default"));
        assert_eq!(records[1].title, "愛の借金");
        assert!(records[1].content.starts_with("第2話。愛の借金。\n\n"));
        assert_eq!(records[1].metadata["title_source"], json!("existing"));
    }
}
