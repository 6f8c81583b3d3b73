//! Sequential plan execution over the stage registry.

use crate::config::{PipelineConfig, SeriesPaths};
use crate::core::{Language, SourceUnit, StageGraph, StageId, StageScope};
use crate::errors::{ArtifactError, MissingDependencyError, StageExecutionError};
use crate::pipeline::plan::{ExecutionPlan, PlanAction, PlanEntry};
use crate::pipeline::rate_limit::RateGate;
use crate::pipeline::summary::{log_tail, CellOutcome, HaltBoundary, RunSummary, StageRunRecord};
use crate::services::ServiceSet;
use crate::stages::{StageContext, StageRegistry};
use crate::store::ArtifactStore;
use crate::utils::iso_timestamp;
use std::fs;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// File under `_logs/` holding the serialized [`RunSummary`].
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// Executes an [`ExecutionPlan`] cell by cell.
///
/// Cells run strictly in plan order. Before invoking a unit the runner
/// probes the cell's required input artifact; an unsatisfied input settles
/// the cell as blocked without invoking the unit. Quality gates are never
/// probed as inputs, so a skipped or failed gate never blocks later stages.
#[derive(Debug)]
pub struct PipelineRunner<'a> {
    config: &'a PipelineConfig,
    paths: &'a SeriesPaths,
    store: &'a ArtifactStore,
    services: &'a ServiceSet,
    unit: &'a SourceUnit,
    registry: StageRegistry,
    graph: StageGraph,
}

impl<'a> PipelineRunner<'a> {
    /// Builds a runner over one series with the standard stage registry.
    #[must_use]
    pub fn new(
        config: &'a PipelineConfig,
        paths: &'a SeriesPaths,
        store: &'a ArtifactStore,
        services: &'a ServiceSet,
        unit: &'a SourceUnit,
    ) -> Self {
        Self {
            config,
            paths,
            store,
            services,
            unit,
            registry: StageRegistry::standard(),
            graph: StageGraph::standard(),
        }
    }

    /// Runs the plan to completion or to the first failure under
    /// `stop_on_error`, then persists the summary under `_logs/`.
    pub async fn execute(&self, plan: &ExecutionPlan) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = iso_timestamp();
        let clock = Instant::now();
        let mut gate = RateGate::new(self.config.rate_limit);
        let mut records = Vec::with_capacity(plan.entries().len());
        let mut halted_at = None;

        info!(%run_id, cells = plan.entries().len(), "Run started");
        for entry in plan.entries() {
            let record = match entry.action {
                PlanAction::SkipRequested => {
                    self.skip_record(entry, CellOutcome::SkippedRequested)
                }
                PlanAction::SkipSatisfied => {
                    self.skip_record(entry, CellOutcome::SkippedSatisfied)
                }
                PlanAction::Run => self.run_cell(entry, &mut gate).await,
            };
            let failed = record.outcome.is_failure();
            records.push(record);
            if failed && self.config.stop_on_error {
                warn!(stage = %entry.stage, cell = %entry.cell_label(), "Halting run on first failure");
                halted_at = Some(HaltBoundary {
                    stage: entry.stage,
                    language: entry.language,
                });
                break;
            }
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: iso_timestamp(),
            duration_ms: clock.elapsed().as_millis() as u64,
            api_calls: records.iter().map(|r| r.api_calls).sum(),
            api_wait_ms: gate.total_wait().as_millis() as u64,
            records,
            halted_at,
        };
        self.persist_summary(&summary);
        info!(%run_id, success = summary.success(), "Run finished");
        summary
    }

    async fn run_cell(&self, entry: &PlanEntry, gate: &mut RateGate) -> StageRunRecord {
        let stage = entry.stage;
        let started_at = iso_timestamp();
        let clock = Instant::now();

        if let Some(missing) = self.unsatisfied_input(stage, entry.language) {
            let err = MissingDependencyError {
                stage,
                language: entry.language,
                missing,
            };
            warn!(stage = %stage, error = %err, "Blocked: unit not invoked");
            return finish(
                entry,
                CellOutcome::Blocked { missing },
                started_at,
                clock,
                Duration::ZERO,
                0,
                vec![err.to_string()],
            );
        }

        if let Err(e) = self.reset_present_artifact(stage, entry.language) {
            warn!(stage = %stage, error = %e, "Could not clear existing artifact");
            return finish(
                entry,
                CellOutcome::Failed {
                    error: e.to_string(),
                },
                started_at,
                clock,
                Duration::ZERO,
                0,
                Vec::new(),
            );
        }

        let api_wait = if stage.is_api_bound() {
            gate.acquire().await
        } else {
            Duration::ZERO
        };

        let ctx = StageContext::new(
            self.config,
            self.paths,
            self.store,
            self.services,
            self.unit,
            entry.language,
        );
        info!(stage = %stage, cell = %entry.cell_label(), "Stage started");
        let result = self.registry.unit(stage).execute(&ctx).await;
        let mut log_text = ctx.take_log();

        let record = match result {
            Ok(report) => {
                for line in &report.lines {
                    info!(stage = %stage, "{line}");
                    log_text.push_str(line);
                    log_text.push('\n');
                }
                finish(
                    entry,
                    CellOutcome::Succeeded,
                    started_at,
                    clock,
                    api_wait,
                    report.api_calls,
                    Vec::new(),
                )
            }
            Err(e) => {
                let err = StageExecutionError {
                    stage,
                    language: entry.language,
                    source: e,
                };
                warn!(stage = %stage, error = %err, "Stage failed");
                log_text.push_str(&format!("error: {err}\n"));
                finish(
                    entry,
                    CellOutcome::Failed {
                        error: err.to_string(),
                    },
                    started_at,
                    clock,
                    api_wait,
                    0,
                    log_tail(&log_text),
                )
            }
        };
        self.write_cell_log(stage, entry.language, &log_text);
        record
    }

    /// The unsatisfied required input of `stage`, if any.
    ///
    /// Series-scoped inputs are probed on the series cell whatever language
    /// the dependent cell targets.
    fn unsatisfied_input(&self, stage: StageId, language: Option<Language>) -> Option<StageId> {
        let required = self.graph.required_input(stage)?;
        let cell = match required.scope() {
            StageScope::Series => None,
            StageScope::PerLanguage => language,
        };
        if self.store.is_satisfying(required, cell) {
            None
        } else {
            Some(required)
        }
    }

    /// Clears any existing artifact so the unit starts from a clean cell.
    fn reset_present_artifact(
        &self,
        stage: StageId,
        language: Option<Language>,
    ) -> Result<(), ArtifactError> {
        let descriptor = self.store.descriptor(stage, language);
        if descriptor.present {
            info!(stage = %stage, "Clearing existing artifact before re-run");
            self.store.clear_stage(stage, language)?;
        }
        Ok(())
    }

    fn skip_record(&self, entry: &PlanEntry, outcome: CellOutcome) -> StageRunRecord {
        info!(
            stage = %entry.stage,
            cell = %entry.cell_label(),
            outcome = outcome.label(),
            "Cell settled without running"
        );
        let now = iso_timestamp();
        StageRunRecord {
            stage: entry.stage,
            language: entry.language,
            action: entry.action,
            outcome,
            started_at: now.clone(),
            finished_at: now,
            duration_ms: 0,
            api_wait_ms: 0,
            api_calls: 0,
            log_tail: Vec::new(),
        }
    }

    fn write_cell_log(&self, stage: StageId, language: Option<Language>, text: &str) {
        if text.is_empty() {
            return;
        }
        let dir = self.paths.logs_dir();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(path = %dir.display(), error = %e, "Could not create log folder");
            return;
        }
        let path = dir.join(cell_log_name(stage, language));
        if let Err(e) = fs::write(&path, text) {
            warn!(path = %path.display(), error = %e, "Could not write cell log");
        }
    }

    fn persist_summary(&self, summary: &RunSummary) {
        if let Err(e) = self.try_persist_summary(summary) {
            warn!(error = %e, "Could not write run summary");
        }
    }

    fn try_persist_summary(&self, summary: &RunSummary) -> std::io::Result<()> {
        let dir = self.paths.logs_dir();
        fs::create_dir_all(&dir)?;
        let json = serde_json::to_vec_pretty(summary)?;
        fs::write(dir.join(RUN_SUMMARY_FILE), json)
    }
}

/// Log file name for one cell, `stage_{dir}[.{language}].log`.
fn cell_log_name(stage: StageId, language: Option<Language>) -> String {
    let dir = stage.dir_name().unwrap_or("00_prepare");
    match language {
        Some(l) => format!("stage_{dir}.{l}.log"),
        None => format!("stage_{dir}.log"),
    }
}

fn finish(
    entry: &PlanEntry,
    outcome: CellOutcome,
    started_at: String,
    clock: Instant,
    api_wait: Duration,
    api_calls: u64,
    log_tail: Vec<String>,
) -> StageRunRecord {
    StageRunRecord {
        stage: entry.stage,
        language: entry.language,
        action: entry.action,
        outcome,
        started_at,
        finished_at: iso_timestamp(),
        duration_ms: clock.elapsed().as_millis() as u64,
        api_wait_ms: api_wait.as_millis() as u64,
        api_calls,
        log_tail,
    }
}
