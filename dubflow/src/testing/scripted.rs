//! Deterministic service implementations for driving stage units in tests.

use crate::config::MasteringTargets;
use crate::core::Language;
use crate::errors::StageError;
use crate::services::{
    AudioProcessor, CastingPlan, ContentSegmenter, HeadingSegmenter, LanguageModel, MusicPlan,
    ServiceSet, SpeechSynthesizer, SplitEpisode, SplitOutcome, SynthesisOutcome, SynthesisRequest,
    TextExtractor, TranslationOutcome, TranslationRequest, VoiceAssignment,
};
use crate::store::GlossaryEntry;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One struct implementing all five service seams with scripted behavior.
///
/// Every call is recorded; transforms are deterministic and observable:
/// translation prefixes the target language code, tagging prepends a marker
/// line, synthesis writes the chunk text as the audio bytes so transcription
/// can round-trip it.
#[derive(Debug, Default)]
pub struct ScriptedServices {
    source_text: String,
    episodes: Option<Vec<SplitEpisode>>,
    glossary_additions: Vec<GlossaryEntry>,
    casting: Option<CastingPlan>,
    fail_translate_for: Option<Language>,
    fail_synthesis: bool,
    garble_transcripts: bool,
    calls: Mutex<BTreeMap<&'static str, usize>>,
}

impl ScriptedServices {
    /// Creates a scripted set with empty fixtures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the text the extractor returns.
    #[must_use]
    pub fn with_source_text(mut self, text: impl Into<String>) -> Self {
        self.source_text = text.into();
        self
    }

    /// Scripts the segmenter's episodes instead of heading detection.
    #[must_use]
    pub fn with_episodes(mut self, episodes: Vec<SplitEpisode>) -> Self {
        self.episodes = Some(episodes);
        self
    }

    /// Glossary entries the first translated episode establishes.
    #[must_use]
    pub fn with_glossary_additions(mut self, entries: Vec<GlossaryEntry>) -> Self {
        self.glossary_additions = entries;
        self
    }

    /// Scripts the casting plan returned by the model.
    #[must_use]
    pub fn with_casting(mut self, plan: CastingPlan) -> Self {
        self.casting = Some(plan);
        self
    }

    /// Makes translation fail for one target language.
    #[must_use]
    pub fn failing_translation(mut self, language: Language) -> Self {
        self.fail_translate_for = Some(language);
        self
    }

    /// Makes every synthesis call fail.
    #[must_use]
    pub fn failing_synthesis(mut self) -> Self {
        self.fail_synthesis = true;
        self
    }

    /// Makes transcriptions come back scrambled, failing the speech gate.
    #[must_use]
    pub fn garbled_transcripts(mut self) -> Self {
        self.garble_transcripts = true;
        self
    }

    /// Wraps the scripted set into a [`ServiceSet`].
    #[must_use]
    pub fn into_services(self) -> ServiceSet {
        Self::share(&Arc::new(self))
    }

    /// Builds a [`ServiceSet`] over a shared instance, keeping the handle
    /// available for call inspection.
    #[must_use]
    pub fn share(this: &Arc<Self>) -> ServiceSet {
        ServiceSet {
            extractor: this.clone(),
            segmenter: this.clone(),
            model: this.clone(),
            speech: this.clone(),
            audio: this.clone(),
        }
    }

    /// How many times `method` was called.
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    fn record(&self, method: &'static str) {
        *self.calls.lock().entry(method).or_insert(0) += 1;
    }

    fn default_casting() -> CastingPlan {
        CastingPlan {
            series_summary: "Scripted casting summary.".to_string(),
            voices: vec![VoiceAssignment {
                character: "narrator".to_string(),
                voice_id: "voice-001".to_string(),
            }],
            music: MusicPlan {
                opening: None,
                background: Some("background.mp3".to_string()),
                gain_db: -18.0,
            },
        }
    }
}

#[async_trait]
impl TextExtractor for ScriptedServices {
    async fn extract(&self, _path: &Path) -> Result<String, StageError> {
        self.record("extract");
        Ok(self.source_text.clone())
    }
}

#[async_trait]
impl ContentSegmenter for ScriptedServices {
    async fn split_episodes(
        &self,
        text: &str,
        file_name: &str,
        language: Language,
    ) -> Result<SplitOutcome, StageError> {
        self.record("split_episodes");
        if let Some(episodes) = &self.episodes {
            return Ok(SplitOutcome {
                episodes: episodes.clone(),
                pattern: "scripted".to_string(),
                confidence: 1.0,
            });
        }
        HeadingSegmenter::new()
            .split_episodes(text, file_name, language)
            .await
    }
}

#[async_trait]
impl LanguageModel for ScriptedServices {
    async fn translate(
        &self,
        req: TranslationRequest<'_>,
    ) -> Result<TranslationOutcome, StageError> {
        self.record("translate");
        if self.fail_translate_for == Some(req.target_language) {
            return Err(StageError::Service {
                service: "language_model".to_string(),
                message: format!("scripted translation failure for {}", req.target_language),
            });
        }
        let new_glossary = if req.episode_number == 1 {
            self.glossary_additions.clone()
        } else {
            Vec::new()
        };
        Ok(TranslationOutcome {
            title: req.title.to_string(),
            content: format!("({}) {}", req.target_language.code(), req.content),
            new_glossary,
        })
    }

    async fn format_for_tts(
        &self,
        content: &str,
        _language: Language,
    ) -> Result<String, StageError> {
        self.record("format_for_tts");
        Ok(content.to_string())
    }

    async fn tag_speakers(&self, content: &str, _language: Language) -> Result<String, StageError> {
        self.record("tag_speakers");
        Ok(format!("[narrator]\n{content}"))
    }

    async fn tag_emotions(&self, content: &str, _language: Language) -> Result<String, StageError> {
        self.record("tag_emotions");
        Ok(format!("[calm]\n{content}"))
    }

    async fn cast_voices(
        &self,
        _series_name: &str,
        _tagged_content: &[String],
        default_voice: Option<&str>,
        _language: Language,
    ) -> Result<CastingPlan, StageError> {
        self.record("cast_voices");
        let mut plan = self.casting.clone().unwrap_or_else(Self::default_casting);
        if let (Some(voice), Some(first)) = (default_voice, plan.voices.first_mut()) {
            first.voice_id = voice.to_string();
        }
        Ok(plan)
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedServices {
    async fn synthesize(&self, req: SynthesisRequest<'_>) -> Result<SynthesisOutcome, StageError> {
        self.record("synthesize");
        if self.fail_synthesis {
            return Err(StageError::Service {
                service: "speech_synthesizer".to_string(),
                message: "scripted synthesis failure".to_string(),
            });
        }
        tokio::fs::write(req.output, req.text.as_bytes()).await?;
        Ok(SynthesisOutcome {
            path: req.output.to_path_buf(),
            duration_secs: req.text.chars().count() as f64 / 20.0,
        })
    }

    async fn transcribe(&self, audio: &Path, _language: Language) -> Result<String, StageError> {
        self.record("transcribe");
        let text = tokio::fs::read_to_string(audio).await?;
        if self.garble_transcripts {
            return Ok(text.chars().rev().collect());
        }
        Ok(text)
    }
}

#[async_trait]
impl AudioProcessor for ScriptedServices {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), StageError> {
        self.record("concat");
        let mut joined = Vec::new();
        for input in inputs {
            joined.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, joined).await?;
        Ok(())
    }

    async fn master(
        &self,
        input: &Path,
        output: &Path,
        _targets: MasteringTargets,
    ) -> Result<(), StageError> {
        self.record("master");
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn mix_music(
        &self,
        voice: &Path,
        music: &Path,
        _gain_db: f32,
        output: &Path,
    ) -> Result<(), StageError> {
        self.record("mix_music");
        let mut mixed = tokio::fs::read(voice).await?;
        mixed.extend(tokio::fs::read(music).await?);
        tokio::fs::write(output, mixed).await?;
        Ok(())
    }
}
