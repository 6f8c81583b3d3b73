//! Stage 7: concatenate, master and mix the final episode audio.

use crate::core::{Language, StageId};
use crate::errors::{ArtifactError, StageError};
use crate::stages::tts_generation::read_manifests;
use crate::stages::{AudioConfig, StageContext, StageReport, StageUnit};
use crate::store::AUDIO_CONFIG_FILE;
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Produces `episode_NNN_final.mp3` per episode from the synthesized
/// chunks, with `_voice` and `_mastered` intermediates kept beside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioMixingStage;

#[async_trait]
impl StageUnit for AudioMixingStage {
    fn name(&self) -> &str {
        "audio_mixing"
    }

    fn id(&self) -> StageId {
        StageId::AudioMixing
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let language = ctx.require_language()?;
        let manifests = read_manifests(ctx.store(), language)?;
        if manifests.is_empty() {
            return Err(StageError::InvalidInput(
                "no synthesized episodes to mix".to_string(),
            ));
        }

        let music = resolve_music(ctx, language)?;
        match &music {
            Some((path, gain_db)) => {
                info!(music = %path.display(), gain_db, "mixing with background music");
            }
            None => info!("no background music configured"),
        }

        let out_dir = ctx.store().stage_dir(StageId::AudioMixing, Some(language));
        fs::create_dir_all(&out_dir).map_err(|e| ArtifactError::io(&out_dir, e))?;
        let targets = ctx.mastering();

        let mut mixed = 0usize;
        for (episode_dir, manifest) in &manifests {
            let chunks: Vec<PathBuf> = manifest
                .chunks
                .iter()
                .map(|c| episode_dir.join(&c.file))
                .filter(|p| p.is_file())
                .collect();
            if chunks.is_empty() {
                warn!(episode = manifest.episode_number, "no chunk audio on disk");
                continue;
            }

            let base = format!("episode_{:03}", manifest.episode_number);
            let voice = out_dir.join(format!("{base}_voice.mp3"));
            let mastered = out_dir.join(format!("{base}_mastered.mp3"));
            let final_file = out_dir.join(format!("{base}_final.mp3"));

            ctx.services().audio.concat(&chunks, &voice).await?;
            ctx.services()
                .audio
                .master(&voice, &mastered, targets)
                .await?;
            match &music {
                Some((music_file, gain_db)) => {
                    ctx.services()
                        .audio
                        .mix_music(&mastered, music_file, *gain_db, &final_file)
                        .await?;
                }
                None => {
                    fs::copy(&mastered, &final_file)
                        .map_err(|e| ArtifactError::io(&final_file, e))?;
                }
            }
            ctx.store().invalidate(StageId::AudioMixing, Some(language));
            report.produced_files += 3;
            mixed += 1;
            report.note(format!(
                "episode {:03}: {} chunk(s) mixed",
                manifest.episode_number,
                chunks.len()
            ));
        }

        if mixed == 0 {
            return Err(StageError::InvalidInput(
                "no episode had chunk audio to mix".to_string(),
            ));
        }
        ctx.store()
            .seal(StageId::AudioMixing, Some(language), Some(mixed))?;
        Ok(report)
    }
}

/// The background music file for this cell, if the audio config names one
/// that exists under the series `music/` folder.
fn resolve_music(
    ctx: &StageContext<'_>,
    language: Language,
) -> Result<Option<(PathBuf, f32)>, StageError> {
    let config: Option<AudioConfig> =
        ctx.store()
            .read_json_optional(StageId::AudioSetup, Some(language), AUDIO_CONFIG_FILE)?;
    let Some(config) = config else {
        return Ok(None);
    };
    let Some(name) = config.music.background else {
        return Ok(None);
    };
    let path = ctx.store().music_dir().join(name);
    if path.is_file() {
        Ok(Some((path, config.music.gain_db)))
    } else {
        warn!(music = %path.display(), "configured music file is missing");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{AudioSetupStage, TtsGenerationStage};
    use crate::testing::{ScriptedServices, TestSeries};
    use tempfile::TempDir;

    async fn synthesized_series(root: &std::path::Path, preset_music: bool) -> TestSeries {
        let series = TestSeries::at_with(root, |b| b.use_preset_audio(true));
        let mut meta = series.seed_metadata(Language::Korean);
        meta.default_voice_id = Some("kr-voice".to_string());
        series.store.write_metadata(&meta).unwrap();
        if preset_music {
            fs::create_dir_all(series.store.music_dir()).unwrap();
            fs::write(series.store.music_dir().join("bed.mp3"), b"MUSIC").unwrap();
        }
        series.seed_stage(
            StageId::EmotionTagging,
            Some(Language::Korean),
            &[(1, "제목", "첫 본문."), (2, "제목 둘", "둘째 본문.")],
        );
        let services = ScriptedServices::new().into_services();
        let ctx = series.context(&services, Some(Language::Korean));
        AudioSetupStage.execute(&ctx).await.unwrap();
        TtsGenerationStage.execute(&ctx).await.unwrap();
        series
    }

    #[tokio::test]
    async fn test_mixing_writes_final_files_without_music() {
        let tmp = TempDir::new().unwrap();
        let series = synthesized_series(tmp.path(), false).await;
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Korean));
        let report = AudioMixingStage.execute(&ctx).await.unwrap();

        assert_eq!(report.produced_files, 6);
        let dir = series
            .store
            .stage_dir(StageId::AudioMixing, Some(Language::Korean));
        for base in ["episode_001", "episode_002"] {
            assert!(dir.join(format!("{base}_voice.mp3")).is_file());
            assert!(dir.join(format!("{base}_mastered.mp3")).is_file());
            assert!(dir.join(format!("{base}_final.mp3")).is_file());
        }
        assert!(series
            .store
            .is_satisfying(StageId::AudioMixing, Some(Language::Korean)));
    }

    #[tokio::test]
    async fn test_music_bed_lands_in_the_final_mix() {
        let tmp = TempDir::new().unwrap();
        let series = synthesized_series(tmp.path(), true).await;
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Korean));
        AudioMixingStage.execute(&ctx).await.unwrap();

        let dir = series
            .store
            .stage_dir(StageId::AudioMixing, Some(Language::Korean));
        let final_bytes = fs::read(dir.join("episode_001_final.mp3")).unwrap();
        let mastered_bytes = fs::read(dir.join("episode_001_mastered.mp3")).unwrap();
        assert!(final_bytes.len() > mastered_bytes.len());
        assert!(final_bytes.ends_with(b"MUSIC"));
    }
}
