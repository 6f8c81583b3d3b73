//! Stage 2: translate split episodes into one target language cell.

use crate::core::{EpisodeRecord, StageId};
use crate::errors::StageError;
use crate::services::TranslationRequest;
use crate::stages::{StageContext, StageReport, StageUnit};
use crate::store::merge_entries;
use async_trait::async_trait;
use serde_json::json;

/// Translates every split episode into the cell's language, carrying a
/// per-language glossary so recurring names keep one translation.
///
/// The source-language cell is an identity copy: records pass through
/// unchanged apart from the `translation_type` marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslateStage;

#[async_trait]
impl StageUnit for TranslateStage {
    fn name(&self) -> &str {
        "translate"
    }

    fn id(&self) -> StageId {
        StageId::Translate
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let language = ctx.require_language()?;
        let meta = ctx.metadata()?;
        let episodes = ctx.store().read_episodes(StageId::Split, None)?;
        if episodes.is_empty() {
            return Err(StageError::InvalidInput(
                "no split episodes to translate".to_string(),
            ));
        }

        if language == meta.source_language {
            for episode in &episodes {
                let record = episode
                    .clone()
                    .with_metadata("translated_to", json!(language.to_string()))
                    .with_metadata("translation_type", json!("identity"));
                ctx.store()
                    .write_episode(StageId::Translate, Some(language), &record)?;
                report.produced_files += 1;
            }
            ctx.store()
                .seal(StageId::Translate, Some(language), Some(episodes.len()))?;
            report.note(format!(
                "copied {} source-language episodes",
                episodes.len()
            ));
            return Ok(report);
        }

        let mut glossary = ctx.store().read_glossary(language)?;
        ctx.log(format!("glossary starts with {} entries", glossary.len()));
        for episode in &episodes {
            let outcome = ctx
                .services()
                .model
                .translate(TranslationRequest {
                    series_name: &meta.series_name,
                    episode_number: episode.episode_number,
                    title: &episode.title,
                    content: &episode.content,
                    source_language: meta.source_language,
                    target_language: language,
                    glossary: &glossary,
                })
                .await?;
            report.api_calls += 1;
            let added = merge_entries(&mut glossary, outcome.new_glossary);
            if added > 0 {
                ctx.log(format!(
                    "episode {}: {added} new glossary entries",
                    episode.episode_number
                ));
            }
            let mut record =
                EpisodeRecord::new(episode.episode_number, outcome.title, outcome.content)
                    .with_metadata("translated_to", json!(language.to_string()))
                    .with_metadata("source_language", json!(meta.source_language.to_string()))
                    .with_metadata("translation_type", json!("llm"))
                    .with_metadata("glossary_used", json!(true));
            if record.title != episode.title && !episode.title.is_empty() {
                record = record.with_metadata("original_title", json!(episode.title));
            }
            ctx.store()
                .write_episode(StageId::Translate, Some(language), &record)?;
            report.produced_files += 1;
        }
        ctx.store().write_glossary(language, &glossary)?;
        ctx.store()
            .seal(StageId::Translate, Some(language), Some(episodes.len()))?;
        report.note(format!(
            "translated {} episodes to {language}, glossary at {} entries",
            episodes.len(),
            glossary.len()
        ));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Language;
    use crate::store::GlossaryEntry;
    use crate::testing::{ScriptedServices, TestSeries};
    use tempfile::TempDir;

    fn seed(series: &TestSeries) {
        series.seed_metadata(Language::Korean);
        series.seed_split(&[
            (1, "첫 화", "Episode 일.\n\n주인공이 등장한다."),
            (2, "", "Episode 이.\n\n이야기가 이어진다."),
        ]);
    }

    #[tokio::test]
    async fn test_source_language_cell_is_identity_copy() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        seed(&series);
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Korean));
        let report = TranslateStage.execute(&ctx).await.unwrap();

        assert_eq!(report.api_calls, 0);
        assert_eq!(report.produced_files, 2);
        let records = series
            .store
            .read_episodes(StageId::Translate, Some(Language::Korean))
            .unwrap();
        assert_eq!(records[0].content, "Episode 일.\n\n주인공이 등장한다.");
        assert_eq!(records[0].metadata["translation_type"], json!("identity"));
    }

    #[tokio::test]
    async fn test_translation_accumulates_glossary_across_episodes() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        seed(&series);
        let services = ScriptedServices::new()
            .with_glossary_additions(vec![GlossaryEntry::new("character", "주인공", "主人公")])
            .into_services();

        let ctx = series.context(&services, Some(Language::Japanese));
        let report = TranslateStage.execute(&ctx).await.unwrap();

        assert_eq!(report.api_calls, 2);
        let records = series
            .store
            .read_episodes(StageId::Translate, Some(Language::Japanese))
            .unwrap();
        assert!(records[0].content.starts_with("(JP) "));
        assert_eq!(records[0].metadata["translated_to"], json!("japanese"));
        let glossary = series.store.read_glossary(Language::Japanese).unwrap();
        assert_eq!(glossary.len(), 1);
        assert_eq!(glossary[0].original, "주인공");
    }

    #[tokio::test]
    async fn test_translation_failure_leaves_cell_unsealed() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        seed(&series);
        let services = ScriptedServices::new()
            .failing_translation(Language::Japanese)
            .into_services();

        let ctx = series.context(&services, Some(Language::Japanese));
        let err = TranslateStage.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, StageError::Service { .. }));
        assert!(!series
            .store
            .descriptor(StageId::Translate, Some(Language::Japanese))
            .is_satisfying());
    }
}
