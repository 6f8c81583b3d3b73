//! The service set of a core-only install.

use super::{
    AudioProcessor, CastingPlan, ContentSegmenter, LanguageModel, SpeechSynthesizer, SplitOutcome,
    SynthesisOutcome, SynthesisRequest, TextExtractor, TranslationOutcome, TranslationRequest,
};
use crate::config::MasteringTargets;
use crate::core::Language;
use crate::errors::StageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Implements every service trait by failing with
/// [`StageError::ServiceNotConfigured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Disconnected;

fn not_configured<T>(service: &str) -> Result<T, StageError> {
    Err(StageError::ServiceNotConfigured {
        service: service.to_string(),
    })
}

#[async_trait]
impl TextExtractor for Disconnected {
    async fn extract(&self, _path: &Path) -> Result<String, StageError> {
        not_configured("text_extractor")
    }
}

#[async_trait]
impl ContentSegmenter for Disconnected {
    async fn split_episodes(
        &self,
        _text: &str,
        _file_name: &str,
        _language: Language,
    ) -> Result<SplitOutcome, StageError> {
        not_configured("content_segmenter")
    }
}

#[async_trait]
impl LanguageModel for Disconnected {
    async fn translate(
        &self,
        _req: TranslationRequest<'_>,
    ) -> Result<TranslationOutcome, StageError> {
        not_configured("language_model")
    }

    async fn format_for_tts(
        &self,
        _content: &str,
        _language: Language,
    ) -> Result<String, StageError> {
        not_configured("language_model")
    }

    async fn tag_speakers(
        &self,
        _content: &str,
        _language: Language,
    ) -> Result<String, StageError> {
        not_configured("language_model")
    }

    async fn tag_emotions(
        &self,
        _content: &str,
        _language: Language,
    ) -> Result<String, StageError> {
        not_configured("language_model")
    }

    async fn cast_voices(
        &self,
        _series_name: &str,
        _tagged_content: &[String],
        _default_voice: Option<&str>,
        _language: Language,
    ) -> Result<CastingPlan, StageError> {
        not_configured("language_model")
    }
}

#[async_trait]
impl SpeechSynthesizer for Disconnected {
    async fn synthesize(
        &self,
        _req: SynthesisRequest<'_>,
    ) -> Result<SynthesisOutcome, StageError> {
        not_configured("speech_synthesizer")
    }

    async fn transcribe(&self, _audio: &Path, _language: Language) -> Result<String, StageError> {
        not_configured("speech_synthesizer")
    }
}

#[async_trait]
impl AudioProcessor for Disconnected {
    async fn concat(&self, _inputs: &[PathBuf], _output: &Path) -> Result<(), StageError> {
        not_configured("audio_processor")
    }

    async fn master(
        &self,
        _input: &Path,
        _output: &Path,
        _targets: MasteringTargets,
    ) -> Result<(), StageError> {
        not_configured("audio_processor")
    }

    async fn mix_music(
        &self,
        _voice: &Path,
        _music: &Path,
        _gain_db: f32,
        _output: &Path,
    ) -> Result<(), StageError> {
        not_configured("audio_processor")
    }
}
