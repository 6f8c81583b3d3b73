//! The fixed dependency graph over pipeline stages.

use crate::core::StageId;
use std::collections::BTreeMap;
use thiserror::Error;

/// Error raised when a stage graph violates the pipeline's structural rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An edge points at the stage itself or at a later stage.
    #[error("stage {stage} cannot require {required}: dependencies must point at earlier stages")]
    ForwardEdge {
        /// The dependent stage.
        stage: StageId,
        /// The invalid requirement.
        required: StageId,
    },
    /// A stage declares a quality gate as a hard requirement.
    #[error("stage {stage} cannot require quality gate {required}: gates are optional")]
    GateRequired {
        /// The dependent stage.
        stage: StageId,
        /// The quality gate wrongly required.
        required: StageId,
    },
}

/// The dependency graph walked by the planner and the runner.
///
/// Every stage requires the artifact of at most one predecessor. Quality
/// gates (`2a`, `3a`, `6a`) hang off their parent stage but are never
/// themselves required, so skipping a gate never blocks later stages.
/// Auxiliary inputs (stage `4` preferring speaker-tagged text, stages `6`
/// and `7` reading the audio configuration) are resolved through the stage
/// context, not through hard edges.
#[derive(Debug, Clone)]
pub struct StageGraph {
    required: BTreeMap<StageId, StageId>,
    preferred: BTreeMap<StageId, StageId>,
}

impl StageGraph {
    /// The standard eleven-stage pipeline graph.
    #[must_use]
    pub fn standard() -> Self {
        let required = [
            (StageId::Split, StageId::Prepare),
            (StageId::Translate, StageId::Split),
            (StageId::TranslationQa, StageId::Translate),
            (StageId::TtsFormat, StageId::Translate),
            (StageId::SpeakerTagging, StageId::TtsFormat),
            (StageId::EmotionTagging, StageId::TtsFormat),
            (StageId::AudioSetup, StageId::EmotionTagging),
            (StageId::TtsGeneration, StageId::AudioSetup),
            (StageId::TtsQa, StageId::TtsGeneration),
            (StageId::AudioMixing, StageId::TtsGeneration),
        ]
        .into_iter()
        .collect();
        let preferred = [(StageId::EmotionTagging, StageId::SpeakerTagging)]
            .into_iter()
            .collect();
        Self {
            required,
            preferred,
        }
    }

    /// The one stage whose artifact `stage` needs before it can run, if any.
    #[must_use]
    pub fn required_input(&self, stage: StageId) -> Option<StageId> {
        self.required.get(&stage).copied()
    }

    /// An optional upstream stage whose artifact `stage` consumes instead of
    /// its required input when a satisfying one exists.
    #[must_use]
    pub fn preferred_input(&self, stage: StageId) -> Option<StageId> {
        self.preferred.get(&stage).copied()
    }

    /// Stages that directly require `stage`.
    #[must_use]
    pub fn dependents(&self, stage: StageId) -> Vec<StageId> {
        StageId::ALL
            .into_iter()
            .filter(|s| self.required_input(*s) == Some(stage))
            .collect()
    }

    /// Checks the structural rules: edges point backwards and no stage
    /// requires a quality gate.
    pub fn verify(&self) -> Result<(), GraphError> {
        for (&stage, &required) in &self.required {
            if required >= stage {
                return Err(GraphError::ForwardEdge { stage, required });
            }
            if required.is_substage() {
                return Err(GraphError::GateRequired { stage, required });
            }
        }
        for (&stage, &preferred) in &self.preferred {
            if preferred >= stage {
                return Err(GraphError::ForwardEdge {
                    stage,
                    required: preferred,
                });
            }
        }
        Ok(())
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::standard()
    }
}
