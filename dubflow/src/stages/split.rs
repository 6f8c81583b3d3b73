//! Stage 1: split the source document into per-episode records.

use crate::core::{EpisodeRecord, Language, StageId};
use crate::errors::StageError;
use crate::stages::{StageContext, StageReport, StageUnit};
use crate::utils::sino_numeral;
use async_trait::async_trait;
use serde_json::json;

/// Splits the extracted source text on episode headings and prepends a
/// spoken heading to every episode body.
///
/// The heading (`Episode 일. 제목.`) is part of the episode text from here
/// on, so every later stage translates, tags and synthesizes it along with
/// the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitStage;

#[async_trait]
impl StageUnit for SplitStage {
    fn name(&self) -> &str {
        "split"
    }

    fn id(&self) -> StageId {
        StageId::Split
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let meta = ctx.metadata()?;
        let unit = ctx.source_unit();

        let text = ctx.services().extractor.extract(&unit.path).await?;
        report.api_calls += 1;
        if text.trim().is_empty() {
            return Err(StageError::InvalidInput(format!(
                "source document {} contains no text",
                unit.path.display()
            )));
        }
        ctx.log(format!("extracted {} characters", text.chars().count()));

        let outcome = ctx
            .services()
            .segmenter
            .split_episodes(&text, &unit.file_stem, meta.source_language)
            .await?;
        report.api_calls += 1;
        let mut episodes = outcome.episodes;
        ctx.log(format!(
            "detected {} episodes via pattern '{}' ({:.0}% confidence)",
            episodes.len(),
            outcome.pattern,
            outcome.confidence * 100.0
        ));
        if let Some(cap) = ctx.max_episodes() {
            let cap = cap as usize;
            if episodes.len() > cap {
                episodes.truncate(cap);
                ctx.log(format!("capped at the first {cap} episodes"));
            }
        }

        let source_name = unit
            .path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| meta.source_file.clone());
        for episode in &episodes {
            let content = format!(
                "{}{}",
                tts_heading(episode.number, &episode.title, meta.source_language),
                episode.content
            );
            let chars = content.chars().count();
            let record = EpisodeRecord::new(episode.number, episode.title.clone(), content)
                .with_metadata("series_name", json!(meta.series_name))
                .with_metadata("source_file", json!(source_name))
                .with_metadata("character_count", json!(chars));
            ctx.store().write_episode(StageId::Split, None, &record)?;
            report.produced_files += 1;
        }
        ctx.store().seal(StageId::Split, None, Some(episodes.len()))?;
        report.note(format!("wrote {} episode records", episodes.len()));
        Ok(report)
    }
}

/// Builds the spoken heading prepended to an episode body.
fn tts_heading(number: u32, title: &str, language: Language) -> String {
    let spoken = sino_numeral(number, language);
    let title = title.trim();
    if title.is_empty() {
        format!("Episode {spoken}.\n\n")
    } else {
        format!("Episode {spoken}. {title}.\n\n")
    }
}
