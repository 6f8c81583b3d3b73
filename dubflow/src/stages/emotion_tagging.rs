//! Stage 4: embed inline emotion and delivery tags.

use crate::core::{EpisodeRecord, StageId};
use crate::errors::StageError;
use crate::stages::{StageContext, StageReport, StageUnit};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Tags each episode with inline delivery markers like `[calm]` or
/// `[dramatic]` for the synthesizer.
///
/// Prefers the speaker-tagged artifact when that sub-stage ran; otherwise
/// tags the plain formatted text.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmotionTaggingStage;

#[async_trait]
impl StageUnit for EmotionTaggingStage {
    fn name(&self) -> &str {
        "emotion_tagging"
    }

    fn id(&self) -> StageId {
        StageId::EmotionTagging
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let language = ctx.require_language()?;
        let input_stage = if ctx
            .store()
            .is_satisfying(StageId::SpeakerTagging, Some(language))
        {
            StageId::SpeakerTagging
        } else {
            StageId::TtsFormat
        };
        info!(%language, input = %input_stage, "tagging emotions");

        let episodes = ctx.store().read_episodes(input_stage, Some(language))?;
        if episodes.is_empty() {
            return Err(StageError::InvalidInput(
                "no episodes to tag emotions in".to_string(),
            ));
        }

        for record in &episodes {
            let tagged = ctx
                .services()
                .model
                .tag_emotions(&record.content, language)
                .await?;
            report.api_calls += 1;
            let out = EpisodeRecord::new(record.episode_number, record.title.clone(), tagged)
                .with_metadata("emotion_tags_applied", json!(true))
                .with_metadata("emotion_tagging_language", json!(language.to_string()));
            ctx.store()
                .write_episode(StageId::EmotionTagging, Some(language), &out)?;
            report.produced_files += 1;
        }
        ctx.store()
            .seal(StageId::EmotionTagging, Some(language), Some(episodes.len()))?;
        report.note(format!(
            "tagged emotions in {} episodes from {input_stage}",
            episodes.len()
        ));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Language;
    use crate::testing::{ScriptedServices, TestSeries};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prefers_speaker_tagged_input() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        series.seed_stage(
            StageId::TtsFormat,
            Some(Language::Japanese),
            &[(1, "題名", "整形済み本文。")],
        );
        series.seed_stage(
            StageId::SpeakerTagging,
            Some(Language::Japanese),
            &[(1, "題名", "[NARRATOR]: 整形済み本文。")],
        );
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Japanese));
        EmotionTaggingStage.execute(&ctx).await.unwrap();

        let records = series
            .store
            .read_episodes(StageId::EmotionTagging, Some(Language::Japanese))
            .unwrap();
        assert_eq!(records[0].content, "[calm]\n[NARRATOR]: 整形済み本文。");
        assert_eq!(records[0].metadata["emotion_tags_applied"], json!(true));
    }

    #[tokio::test]
    async fn test_falls_back_to_formatted_input() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        series.seed_stage(
            StageId::TtsFormat,
            Some(Language::Korean),
            &[(1, "제목", "정리된 본문."), (2, "제목 둘", "다음 본문.")],
        );
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Korean));
        let report = EmotionTaggingStage.execute(&ctx).await.unwrap();

        assert_eq!(report.api_calls, 2);
        let records = series
            .store
            .read_episodes(StageId::EmotionTagging, Some(Language::Korean))
            .unwrap();
        assert_eq!(records[0].content, "[calm]\n정리된 본문.");
        assert!(series
            .store
            .is_satisfying(StageId::EmotionTagging, Some(Language::Korean)));
    }
}
