//! Seams to the external engines the stage units call.
//!
//! The orchestrator core never talks to a model, speech or audio engine
//! directly; stage units go through these traits. Every call is opaque,
//! rate-limited by the runner, and fallible. The crate ships local
//! implementations where no engine is genuinely needed (plain-text
//! extraction, heading-pattern segmentation), [`ServiceSet::disconnected`]
//! for a core-only install and the scripted set in [`crate::testing`] for
//! tests.

mod disconnected;
mod extractor;
mod segmenter;

pub use disconnected::Disconnected;
pub use extractor::PlainTextExtractor;
pub use segmenter::HeadingSegmenter;

use crate::config::MasteringTargets;
use crate::core::Language;
use crate::errors::StageError;
use crate::store::GlossaryEntry;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extracts plain text from a source document (docx, epub, txt).
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Converts the document at `path` into plain text.
    async fn extract(&self, path: &Path) -> Result<String, StageError>;
}

/// One episode produced by the segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitEpisode {
    /// One-based episode number.
    pub number: u32,
    /// Detected episode title, empty when the heading carried none.
    pub title: String,
    /// Episode body text.
    pub content: String,
}

/// Result of splitting a source text into episodes.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    /// The detected episodes, in order.
    pub episodes: Vec<SplitEpisode>,
    /// Name of the heading pattern that matched.
    pub pattern: String,
    /// Detector confidence, 0 to 1.
    pub confidence: f64,
}

/// Splits a source text into episodes on heading boundaries.
#[async_trait]
pub trait ContentSegmenter: Send + Sync {
    /// Splits `text` into episodes. `file_name` gives the detector a hint
    /// for single-episode sources.
    async fn split_episodes(
        &self,
        text: &str,
        file_name: &str,
        language: Language,
    ) -> Result<SplitOutcome, StageError>;
}

/// A translation request for one episode.
#[derive(Debug, Clone)]
pub struct TranslationRequest<'a> {
    /// Series name for context.
    pub series_name: &'a str,
    /// Episode number being translated.
    pub episode_number: u32,
    /// Source-language title.
    pub title: &'a str,
    /// Source-language content.
    pub content: &'a str,
    /// Language of the source text.
    pub source_language: Language,
    /// Language to translate into.
    pub target_language: Language,
    /// Established term mappings to honor.
    pub glossary: &'a [GlossaryEntry],
}

/// A translated episode plus any new glossary terms the model established.
#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    /// Translated title.
    pub title: String,
    /// Translated content.
    pub content: String,
    /// Terms first established in this episode.
    pub new_glossary: Vec<GlossaryEntry>,
}

/// One character-to-voice assignment in a casting plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceAssignment {
    /// Character name as tagged in the text.
    pub character: String,
    /// Voice id of the synthesis engine.
    pub voice_id: String,
}

/// Background-music plan for a series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MusicPlan {
    /// Opening theme file name under the series `music/` folder.
    pub opening: Option<String>,
    /// Background bed file name under the series `music/` folder.
    pub background: Option<String>,
    /// Gain applied to music when mixed under voice, in dB.
    pub gain_db: f32,
}

/// Result of the voice-casting call behind stage 5.
#[derive(Debug, Clone)]
pub struct CastingPlan {
    /// Short series synopsis used to brief the casting.
    pub series_summary: String,
    /// Voice assignment per character, narrator included.
    pub voices: Vec<VoiceAssignment>,
    /// Music plan for the final mix.
    pub music: MusicPlan,
}

/// The language model behind translation, formatting, tagging and casting.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Translates one episode.
    async fn translate(&self, req: TranslationRequest<'_>)
        -> Result<TranslationOutcome, StageError>;

    /// Normalizes text for speech (numbers, units, symbols).
    async fn format_for_tts(&self, content: &str, language: Language)
        -> Result<String, StageError>;

    /// Embeds inline speaker tags into dialogue.
    async fn tag_speakers(&self, content: &str, language: Language) -> Result<String, StageError>;

    /// Embeds inline emotion and delivery tags.
    async fn tag_emotions(&self, content: &str, language: Language) -> Result<String, StageError>;

    /// Derives a casting plan from tagged episode text.
    async fn cast_voices(
        &self,
        series_name: &str,
        tagged_content: &[String],
        default_voice: Option<&str>,
        language: Language,
    ) -> Result<CastingPlan, StageError>;
}

/// A synthesis request for one chunk of episode text.
#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    /// The chunk text, inline tags included.
    pub text: &'a str,
    /// Voice to synthesize with.
    pub voice_id: &'a str,
    /// Target language.
    pub language: Language,
    /// Where the engine must write the audio file.
    pub output: &'a Path,
}

/// Metadata about one synthesized chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutcome {
    /// The written audio file.
    pub path: PathBuf,
    /// Chunk duration in seconds.
    pub duration_secs: f64,
}

/// The speech engine behind synthesis and QA transcription.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes one chunk to `req.output`.
    async fn synthesize(&self, req: SynthesisRequest<'_>) -> Result<SynthesisOutcome, StageError>;

    /// Transcribes an audio file back to text for comparison.
    async fn transcribe(&self, audio: &Path, language: Language) -> Result<String, StageError>;
}

/// The audio tool behind concatenation, mastering and music mixing.
#[async_trait]
pub trait AudioProcessor: Send + Sync {
    /// Concatenates `inputs` in order into `output`.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), StageError>;

    /// Masters `input` to the given loudness targets.
    async fn master(
        &self,
        input: &Path,
        output: &Path,
        targets: MasteringTargets,
    ) -> Result<(), StageError>;

    /// Mixes a music bed under the voice track.
    async fn mix_music(
        &self,
        voice: &Path,
        music: &Path,
        gain_db: f32,
        output: &Path,
    ) -> Result<(), StageError>;
}

/// The bundle of services handed to stage units through the context.
#[derive(Clone)]
pub struct ServiceSet {
    /// Document text extraction.
    pub extractor: Arc<dyn TextExtractor>,
    /// Episode segmentation.
    pub segmenter: Arc<dyn ContentSegmenter>,
    /// Language model tasks.
    pub model: Arc<dyn LanguageModel>,
    /// Speech synthesis and transcription.
    pub speech: Arc<dyn SpeechSynthesizer>,
    /// Audio processing.
    pub audio: Arc<dyn AudioProcessor>,
}

impl std::fmt::Debug for ServiceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSet").finish_non_exhaustive()
    }
}

impl ServiceSet {
    /// A set where every call fails with a configuration error.
    ///
    /// This is what a core-only install runs with: planning, resume and
    /// review reconciliation all work; stages that need an engine fail
    /// cleanly when invoked.
    #[must_use]
    pub fn disconnected() -> Self {
        let d = Arc::new(Disconnected);
        Self {
            extractor: d.clone(),
            segmenter: d.clone(),
            model: d.clone(),
            speech: d.clone(),
            audio: d,
        }
    }

    /// The local set: real implementations where no engine is needed,
    /// disconnected engines everywhere else.
    ///
    /// Plain-text sources can be prepared and split with this set alone;
    /// translation, synthesis and mixing fail until engines are connected.
    #[must_use]
    pub fn local() -> Self {
        let d = Arc::new(Disconnected);
        Self {
            extractor: Arc::new(PlainTextExtractor),
            segmenter: Arc::new(HeadingSegmenter::new()),
            model: d.clone(),
            speech: d.clone(),
            audio: d,
        }
    }
}
