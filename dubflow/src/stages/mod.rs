//! Stage units: the eleven workers behind the pipeline.
//!
//! Each unit implements [`StageUnit`] and owns exactly one stage of the
//! series folder. Units read predecessor artifacts through the store, call
//! external engines through the service seams and seal their own artifact
//! before returning.

mod audio_mixing;
mod audio_setup;
mod context;
mod emotion_tagging;
mod prepare;
mod registry;
mod speaker_tagging;
mod split;
mod translate;
mod translation_qa;
mod tts_format;
mod tts_generation;
mod tts_qa;

pub use audio_mixing::AudioMixingStage;
pub use audio_setup::{AudioConfig, AudioSetupStage, MusicSelection, VoiceCast};
pub use context::StageContext;
pub use emotion_tagging::EmotionTaggingStage;
pub use prepare::PrepareStage;
pub use registry::StageRegistry;
pub use speaker_tagging::SpeakerTaggingStage;
pub use split::SplitStage;
pub use translate::TranslateStage;
pub use translation_qa::TranslationQaStage;
pub use tts_format::TtsFormatStage;
pub use tts_generation::{ChunkMetadata, EpisodeAudio, TtsGenerationStage};
pub use tts_qa::TtsQaStage;

use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Counters and summary lines a unit hands back to the runner.
///
/// The lines land in the cell log; the counters are folded into the cell's
/// run record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Human summary lines, one per notable action.
    pub lines: Vec<String>,
    /// Files the unit wrote into its stage dir.
    pub produced_files: usize,
    /// External service calls the unit made.
    pub api_calls: u64,
}

impl StageReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a summary line.
    pub fn note(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

/// Trait for pipeline stage units.
///
/// Units are invoked once per `(stage, language)` cell by the runner. They
/// must be stateless across invocations; everything a run needs travels in
/// the [`StageContext`].
#[async_trait]
pub trait StageUnit: Send + Sync + Debug {
    /// Returns the unit's name.
    fn name(&self) -> &str;

    /// Returns the stage this unit implements.
    fn id(&self) -> crate::core::StageId;

    /// Executes the unit for one cell.
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_accumulates_lines() {
        let mut report = StageReport::new();
        report.note("wrote 3 episodes");
        report.note("sealed");
        assert_eq!(report.lines.len(), 2);
        assert_eq!(report.produced_files, 0);
    }
}
