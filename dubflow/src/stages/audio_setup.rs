//! Stage 5: derive the per-language audio configuration.

use crate::core::{Language, StageId};
use crate::errors::StageError;
use crate::services::CastingPlan;
use crate::stages::{StageContext, StageReport, StageUnit};
use crate::store::AUDIO_CONFIG_FILE;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Gain for preset background music, well under narration level.
const PRESET_MUSIC_GAIN_DB: f32 = -18.0;

/// Voice and music plan consumed by the synthesis and mixing stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Language this configuration casts for.
    pub language: Language,
    /// Short series synopsis that briefed the casting.
    pub series_summary: String,
    /// Narrator voice, used when a chunk names no other voice.
    pub default_voice_id: String,
    /// Voice assignment per tagged character.
    pub voices: Vec<VoiceCast>,
    /// Music files and mix gain for the final master.
    pub music: MusicSelection,
}

/// One character-to-voice assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCast {
    /// Character name as tagged in the text.
    pub character: String,
    /// Voice id of the synthesis engine.
    pub voice_id: String,
}

/// Music plan for the final mix. File names are relative to the series
/// `music/` folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicSelection {
    /// Opening theme, played before the narration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening: Option<String>,
    /// Background bed mixed under the narration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    /// Gain applied to music under voice, in dB.
    pub gain_db: f32,
}

/// Writes `audio_config.json` for one language cell.
///
/// In preset mode the voice comes from the series metadata and the music
/// from whatever the operator dropped into `music/`; otherwise the model
/// casts voices from the tagged text.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioSetupStage;

#[async_trait]
impl StageUnit for AudioSetupStage {
    fn name(&self) -> &str {
        "audio_setup"
    }

    fn id(&self) -> StageId {
        StageId::AudioSetup
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let language = ctx.require_language()?;
        let meta = ctx.metadata()?;
        let preset_voice = match language {
            Language::Japanese => meta.default_voice_id_jp.clone(),
            _ => meta.default_voice_id.clone(),
        };

        let config = if ctx.use_preset_audio() {
            let voice_id = preset_voice.ok_or_else(|| {
                StageError::InvalidInput(format!(
                    "preset audio requested but metadata has no voice id for {language}"
                ))
            })?;
            let background = first_music_file(&ctx.store().music_dir());
            info!(%language, voice = %voice_id, music = ?background, "using preset audio");
            AudioConfig {
                language,
                series_summary: String::new(),
                default_voice_id: voice_id.clone(),
                voices: vec![VoiceCast {
                    character: "narrator".to_string(),
                    voice_id,
                }],
                music: MusicSelection {
                    opening: None,
                    background,
                    gain_db: PRESET_MUSIC_GAIN_DB,
                },
            }
        } else {
            let episodes = ctx
                .store()
                .read_episodes(StageId::EmotionTagging, Some(language))?;
            if episodes.is_empty() {
                return Err(StageError::InvalidInput(
                    "no tagged episodes to cast voices from".to_string(),
                ));
            }
            let sample: Vec<String> = episodes
                .iter()
                .take(1)
                .map(|e| e.content.clone())
                .collect();
            let plan = ctx
                .services()
                .model
                .cast_voices(&meta.series_name, &sample, preset_voice.as_deref(), language)
                .await?;
            report.api_calls += 1;
            from_plan(language, plan)?
        };

        ctx.store()
            .write_json(StageId::AudioSetup, Some(language), AUDIO_CONFIG_FILE, &config)?;
        report.produced_files += 1;
        ctx.store().seal(StageId::AudioSetup, Some(language), Some(1))?;
        report.note(format!(
            "audio config ready with {} voice(s)",
            config.voices.len()
        ));
        Ok(report)
    }
}

fn from_plan(language: Language, plan: CastingPlan) -> Result<AudioConfig, StageError> {
    let default_voice_id = plan
        .voices
        .iter()
        .find(|v| v.character.eq_ignore_ascii_case("narrator"))
        .or_else(|| plan.voices.first())
        .map(|v| v.voice_id.clone())
        .ok_or_else(|| StageError::InvalidInput("casting produced no voices".to_string()))?;
    Ok(AudioConfig {
        language,
        series_summary: plan.series_summary,
        default_voice_id,
        voices: plan
            .voices
            .into_iter()
            .map(|v| VoiceCast {
                character: v.character,
                voice_id: v.voice_id,
            })
            .collect(),
        music: MusicSelection {
            opening: plan.music.opening,
            background: plan.music.background,
            gain_db: plan.music.gain_db,
        },
    })
}

/// First `.mp3`/`.wav` file in the music folder, by name.
fn first_music_file(dir: &Path) -> Option<String> {
    let entries = fs::read_dir(dir).ok()?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| {
            let lower = name.to_ascii_lowercase();
            lower.ends_with(".mp3") || lower.ends_with(".wav")
        })
        .collect();
    names.sort();
    names.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedServices, TestSeries};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_preset_mode_reads_metadata_voice_and_music_folder() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at_with(tmp.path(), |b| b.use_preset_audio(true));
        let mut meta = series.seed_metadata(Language::Korean);
        meta.default_voice_id = Some("kr-voice".to_string());
        series.store.write_metadata(&meta).unwrap();
        fs::create_dir_all(series.store.music_dir()).unwrap();
        fs::write(series.store.music_dir().join("theme.mp3"), b"mp3").unwrap();
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Korean));
        let report = AudioSetupStage.execute(&ctx).await.unwrap();

        assert_eq!(report.api_calls, 0);
        let config: AudioConfig = series
            .store
            .read_json(StageId::AudioSetup, Some(Language::Korean), AUDIO_CONFIG_FILE)
            .unwrap();
        assert_eq!(config.default_voice_id, "kr-voice");
        assert_eq!(config.music.background.as_deref(), Some("theme.mp3"));
        assert!(series
            .store
            .is_satisfying(StageId::AudioSetup, Some(Language::Korean)));
    }

    #[tokio::test]
    async fn test_preset_mode_without_voice_id_fails() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at_with(tmp.path(), |b| b.use_preset_audio(true));
        series.seed_metadata(Language::Korean);
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Japanese));
        let err = AudioSetupStage.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, StageError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_casting_mode_calls_model() {
        let tmp = TempDir::new().unwrap();
        let series = TestSeries::at(tmp.path());
        series.seed_metadata(Language::Korean);
        series.seed_stage(
            StageId::EmotionTagging,
            Some(Language::Japanese),
            &[(1, "題名", "[calm]\n[NARRATOR]: 本文です。")],
        );
        let services = ScriptedServices::new().into_services();

        let ctx = series.context(&services, Some(Language::Japanese));
        let report = AudioSetupStage.execute(&ctx).await.unwrap();

        assert_eq!(report.api_calls, 1);
        let config: AudioConfig = series
            .store
            .read_json(StageId::AudioSetup, Some(Language::Japanese), AUDIO_CONFIG_FILE)
            .unwrap();
        assert_eq!(config.default_voice_id, "voice-001");
        assert_eq!(config.voices.len(), 1);
        assert_eq!(config.music.gain_db, -18.0);
    }
}
