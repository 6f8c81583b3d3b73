//! Execution planning: run, skip or reuse per stage and language.

use crate::config::{PipelineConfig, ResumePolicy};
use crate::core::{Language, StageId, StageScope};
use crate::store::ArtifactStore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The planned action for one `(stage, language)` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    /// The stage unit will be invoked.
    Run,
    /// The operator put the stage in the skip set.
    SkipRequested,
    /// A satisfying artifact already exists; idempotent resume.
    SkipSatisfied,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "RUN"),
            Self::SkipRequested => write!(f, "SKIP-REQUESTED"),
            Self::SkipSatisfied => write!(f, "SKIP-SATISFIED"),
        }
    }
}

/// One cell of an execution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// The stage.
    pub stage: StageId,
    /// The language cell, `None` for series-scoped stages.
    pub language: Option<Language>,
    /// What the runner will do with this cell.
    pub action: PlanAction,
    /// Human-readable reason for the decision.
    pub reason: String,
}

impl PlanEntry {
    /// Label for the cell column of plan tables and log lines.
    #[must_use]
    pub fn cell_label(&self) -> String {
        self.language
            .map_or_else(|| "series".to_string(), |l| l.to_string())
    }
}

/// Counts of plan entries by action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCounts {
    /// Cells planned to run.
    pub run: usize,
    /// Cells skipped at the operator's request.
    pub skip_requested: usize,
    /// Cells skipped because a satisfying artifact exists.
    pub skip_satisfied: usize,
}

/// An ordered execution plan over the stage graph.
///
/// Derived, never persisted: computed fresh from the skip set and the
/// artifact store each time, so two consecutive plans over an unchanged
/// store are identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    entries: Vec<PlanEntry>,
}

impl ExecutionPlan {
    /// All entries in execution order.
    #[must_use]
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// The entries planned to run, in order.
    pub fn to_run(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.action == PlanAction::Run)
    }

    /// Looks up the entry for one cell.
    #[must_use]
    pub fn entry(&self, stage: StageId, language: Option<Language>) -> Option<&PlanEntry> {
        self.entries
            .iter()
            .find(|e| e.stage == stage && e.language == language)
    }

    /// Counts entries by action.
    #[must_use]
    pub fn counts(&self) -> PlanCounts {
        let mut counts = PlanCounts::default();
        for entry in &self.entries {
            match entry.action {
                PlanAction::Run => counts.run += 1,
                PlanAction::SkipRequested => counts.skip_requested += 1,
                PlanAction::SkipSatisfied => counts.skip_satisfied += 1,
            }
        }
        counts
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<6} {:<10} {:<16} reason", "stage", "cell", "action")?;
        for entry in &self.entries {
            writeln!(
                f,
                "{:<6} {:<10} {:<16} {}",
                entry.stage.to_string(),
                entry.cell_label(),
                entry.action.to_string(),
                entry.reason,
            )?;
        }
        Ok(())
    }
}

/// Computes execution plans from configuration and store state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner;

impl Planner {
    /// Plans one run: for every stage in order, and for per-language stages
    /// every configured language in caller order, decides between run,
    /// requested skip and satisfied skip.
    ///
    /// A skipped stage is never planned as a run, whatever the store holds.
    /// Dependency availability is not consulted here; the runner probes it
    /// at execution time.
    #[must_use]
    pub fn plan(config: &PipelineConfig, store: &ArtifactStore) -> ExecutionPlan {
        let mut entries = Vec::new();
        for stage in StageId::ALL {
            match stage.scope() {
                StageScope::Series => {
                    entries.push(Self::decide(config, store, stage, None));
                }
                StageScope::PerLanguage => {
                    for &language in &config.languages {
                        entries.push(Self::decide(config, store, stage, Some(language)));
                    }
                }
            }
        }
        ExecutionPlan { entries }
    }

    fn decide(
        config: &PipelineConfig,
        store: &ArtifactStore,
        stage: StageId,
        language: Option<Language>,
    ) -> PlanEntry {
        if config.skip.contains(&stage) {
            return PlanEntry {
                stage,
                language,
                action: PlanAction::SkipRequested,
                reason: "requested via skip set".to_string(),
            };
        }
        if config.resume == ResumePolicy::ReuseComplete {
            let descriptor = store.descriptor(stage, language);
            if descriptor.is_satisfying() {
                return PlanEntry {
                    stage,
                    language,
                    action: PlanAction::SkipSatisfied,
                    reason: format!(
                        "satisfying artifact ({} file{})",
                        descriptor.file_count,
                        if descriptor.file_count == 1 { "" } else { "s" },
                    ),
                };
            }
            if descriptor.present {
                return PlanEntry {
                    stage,
                    language,
                    action: PlanAction::Run,
                    reason: "existing artifact is incomplete".to_string(),
                };
            }
            return PlanEntry {
                stage,
                language,
                action: PlanAction::Run,
                reason: "no artifact".to_string(),
            };
        }
        PlanEntry {
            stage,
            language,
            action: PlanAction::Run,
            reason: "resume policy requires a fresh run".to_string(),
        }
    }
}
