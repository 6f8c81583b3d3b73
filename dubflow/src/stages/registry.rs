//! Closed registry mapping every stage to its unit.

use super::{
    AudioMixingStage, AudioSetupStage, EmotionTaggingStage, PrepareStage, SpeakerTaggingStage,
    SplitStage, StageUnit, TranslateStage, TranslationQaStage, TtsFormatStage, TtsGenerationStage,
    TtsQaStage,
};
use crate::core::StageId;

/// The total map from [`StageId`] to its implementing unit.
///
/// The registry is closed: the constructor registers all eleven units in
/// stage order and lookup cannot fail. There is no surface for registering
/// additional stages at runtime.
#[derive(Debug)]
pub struct StageRegistry {
    units: [Box<dyn StageUnit>; 11],
}

impl StageRegistry {
    /// Builds the registry with the standard unit for every stage.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            units: [
                Box::new(PrepareStage),
                Box::new(SplitStage),
                Box::new(TranslateStage),
                Box::new(TranslationQaStage),
                Box::new(TtsFormatStage),
                Box::new(SpeakerTaggingStage),
                Box::new(EmotionTaggingStage),
                Box::new(AudioSetupStage),
                Box::new(TtsGenerationStage),
                Box::new(TtsQaStage),
                Box::new(AudioMixingStage),
            ],
        }
    }

    /// Looks up the unit for a stage. Total over [`StageId`].
    #[must_use]
    pub fn unit(&self, stage: StageId) -> &dyn StageUnit {
        &*self.units[stage.position()]
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
