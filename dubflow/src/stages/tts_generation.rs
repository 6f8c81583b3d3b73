//! Stage 6: synthesize chunk audio for each episode.

use crate::core::{Language, StageId};
use crate::errors::{ArtifactError, StageError};
use crate::services::SynthesisRequest;
use crate::stages::{AudioConfig, StageContext, StageReport, StageUnit};
use crate::store::{ArtifactStore, AUDIO_CONFIG_FILE, CHUNK_MANIFEST_FILE};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Character limit per synthesis chunk.
const MAX_CHUNK_CHARS: usize = 2500;

/// Manifest entry for one synthesized chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Zero-based chunk index within the episode.
    pub index: usize,
    /// Audio file name inside the episode directory.
    pub file: String,
    /// The exact text the chunk was synthesized from.
    pub text: String,
    /// Character count of `text`.
    pub chars: usize,
    /// Reported chunk duration in seconds.
    pub duration_secs: f64,
}

/// Per-episode chunk manifest, written as `metadata.json` next to the
/// chunk audio files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeAudio {
    /// Episode number.
    pub episode_number: u32,
    /// Episode title at synthesis time.
    pub title: String,
    /// Language the audio was synthesized in.
    pub language: Language,
    /// Voice the whole episode was synthesized with.
    pub voice_id: String,
    /// Character count of the full episode text.
    pub content_length: usize,
    /// Chunks in playback order.
    pub chunks: Vec<ChunkMetadata>,
}

/// Synthesizes every episode of a language cell into per-episode chunk
/// directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtsGenerationStage;

#[async_trait]
impl StageUnit for TtsGenerationStage {
    fn name(&self) -> &str {
        "tts_generation"
    }

    fn id(&self) -> StageId {
        StageId::TtsGeneration
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let language = ctx.require_language()?;
        let voice_id = resolve_voice(ctx, language)?;
        let episodes = ctx
            .store()
            .read_episodes(StageId::EmotionTagging, Some(language))?;
        if episodes.is_empty() {
            return Err(StageError::InvalidInput(
                "no tagged episodes to synthesize".to_string(),
            ));
        }
        info!(%language, voice = %voice_id, episodes = episodes.len(), "synthesizing");

        for record in &episodes {
            let episode_dir = ctx
                .store()
                .stage_dir(StageId::TtsGeneration, Some(language))
                .join(format!("episode_{:03}", record.episode_number));
            fs::create_dir_all(&episode_dir)
                .map_err(|e| ArtifactError::io(&episode_dir, e))?;

            let chunks = chunk_text(&record.content, MAX_CHUNK_CHARS);
            let mut manifest = Vec::with_capacity(chunks.len());
            for (index, text) in chunks.iter().enumerate() {
                let file = format!("chunk_{index:03}.mp3");
                let output = episode_dir.join(&file);
                let outcome = ctx
                    .services()
                    .speech
                    .synthesize(SynthesisRequest {
                        text,
                        voice_id: &voice_id,
                        language,
                        output: &output,
                    })
                    .await?;
                report.api_calls += 1;
                manifest.push(ChunkMetadata {
                    index,
                    file,
                    text: text.clone(),
                    chars: text.chars().count(),
                    duration_secs: outcome.duration_secs,
                });
            }

            let audio = EpisodeAudio {
                episode_number: record.episode_number,
                title: record.title.clone(),
                language,
                voice_id: voice_id.clone(),
                content_length: record.content.chars().count(),
                chunks: manifest,
            };
            let manifest_path = episode_dir.join(CHUNK_MANIFEST_FILE);
            let json = serde_json::to_vec_pretty(&audio)?;
            fs::write(&manifest_path, json)
                .map_err(|e| ArtifactError::io(&manifest_path, e))?;
            ctx.store().invalidate(StageId::TtsGeneration, Some(language));
            report.produced_files += audio.chunks.len() + 1;
            report.note(format!(
                "episode {:03}: {} chunk(s)",
                record.episode_number,
                audio.chunks.len()
            ));
        }

        ctx.store()
            .seal(StageId::TtsGeneration, Some(language), Some(episodes.len()))?;
        Ok(report)
    }
}

/// Reads every per-episode chunk manifest of a language cell, with its
/// episode directory, in episode order.
pub(crate) fn read_manifests(
    store: &ArtifactStore,
    language: Language,
) -> Result<Vec<(PathBuf, EpisodeAudio)>, StageError> {
    let dir = store.stage_dir(StageId::TtsGeneration, Some(language));
    let mut found = Vec::new();
    let Ok(entries) = fs::read_dir(&dir) else {
        return Ok(found);
    };
    for entry in entries.flatten() {
        let manifest_path = entry.path().join(CHUNK_MANIFEST_FILE);
        if !manifest_path.is_file() {
            continue;
        }
        let bytes =
            fs::read(&manifest_path).map_err(|e| ArtifactError::io(&manifest_path, e))?;
        let manifest: EpisodeAudio = serde_json::from_slice(&bytes)
            .map_err(|e| ArtifactError::json(&manifest_path, e))?;
        found.push((entry.path(), manifest));
    }
    found.sort_by_key(|(_, m)| m.episode_number);
    Ok(found)
}

/// Picks the synthesis voice: the audio config's default first, then the
/// series metadata presets.
fn resolve_voice(ctx: &StageContext<'_>, language: Language) -> Result<String, StageError> {
    let config: Option<AudioConfig> =
        ctx.store()
            .read_json_optional(StageId::AudioSetup, Some(language), AUDIO_CONFIG_FILE)?;
    if let Some(config) = config {
        if !config.default_voice_id.is_empty() {
            return Ok(config.default_voice_id);
        }
    }
    let meta = ctx.metadata()?;
    let fallback = match language {
        Language::Japanese => meta.default_voice_id_jp,
        _ => meta.default_voice_id,
    };
    fallback.ok_or_else(|| {
        StageError::InvalidInput(format!("no voice id configured for {language}"))
    })
}

/// Splits episode text into synthesis chunks of at most `max_chars`
/// characters, keeping paragraph boundaries where possible and falling back
/// to sentence boundaries inside oversized paragraphs.
fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if char_len(trimmed) <= max_chars {
        return vec![trimmed.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for para in trimmed.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        if char_len(para) > max_chars {
            for sentence in para.split_inclusive(['.', '。']) {
                let sentence = sentence.trim();
                if !sentence.is_empty() {
                    append_unit(&mut chunks, &mut current, sentence, "\n", max_chars);
                }
            }
        } else {
            append_unit(&mut chunks, &mut current, para, "\n\n", max_chars);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn append_unit(
    chunks: &mut Vec<String>,
    current: &mut String,
    unit: &str,
    joiner: &str,
    max_chars: usize,
) {
    if !current.is_empty() && char_len(current) + char_len(unit) > max_chars {
        chunks.push(std::mem::take(current));
    }
    if !current.is_empty() {
        current.push_str(joiner);
    }
    current.push_str(unit);
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedServices, TestSeries};
    use tempfile::TempDir;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("짧은 본문.", 2500);
        assert_eq!(chunks, vec!["짧은 본문.".to_string()]);
    }

    #[test]
    fn test_paragraphs_pack_up_to_the_budget() {
        let text = format!("{}\n\n{}\n\n{}", "가".repeat(60), "나".repeat(60), "다".repeat(60));
        let chunks = chunk_text(&text, 130);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains("가"));
        assert!(chunks[0].contains("나"));
        assert_eq!(chunks[1], "다".repeat(60));
    }

    #[test]
    fn test_oversized_paragraph_splits_on_sentences() {
        let para = format!("{}。{}。{}。", "あ".repeat(50), "い".repeat(50), "う".repeat(50));
        let chunks = chunk_text(&para, 110);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 110);
        }
    }

    #[tokio::test]
    async fn test_synthesis_writes_chunk_dirs_and_manifest() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        let mut meta = series.seed_metadata(Language::Korean);
        meta.default_voice_id = Some("kr-voice".to_string());
        series.store.write_metadata(&meta).unwrap();
        series.seed_stage(
            StageId::EmotionTagging,
            Some(Language::Korean),
            &[(1, "제목", "[calm]\n첫 본문."), (2, "제목 둘", "[calm]\n둘째 본문.")],
        );
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Korean));
        let report = TtsGenerationStage.execute(&ctx).await.unwrap();

        assert_eq!(report.api_calls, 2);
        let dir = series
            .store
            .stage_dir(StageId::TtsGeneration, Some(Language::Korean))
            .join("episode_001");
        assert!(dir.join("chunk_000.mp3").is_file());
        let manifest: EpisodeAudio =
            serde_json::from_slice(&fs::read(dir.join(CHUNK_MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(manifest.voice_id, "kr-voice");
        assert_eq!(manifest.chunks.len(), 1);
        assert_eq!(manifest.chunks[0].file, "chunk_000.mp3");
        assert!(series
            .store
            .is_satisfying(StageId::TtsGeneration, Some(Language::Korean)));
    }

    #[tokio::test]
    async fn test_missing_voice_fails_before_synthesis() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        series.seed_stage(
            StageId::EmotionTagging,
            Some(Language::Korean),
            &[(1, "제목", "본문.")],
        );
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Korean));
        let err = TtsGenerationStage.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, StageError::InvalidInput(_)));
    }
}
