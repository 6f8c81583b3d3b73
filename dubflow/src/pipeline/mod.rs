//! Execution planning and sequential stage orchestration.
//!
//! A run is three steps: [`Planner::plan`] derives the per-cell actions
//! from the skip set and the artifact store, [`PipelineRunner::execute`]
//! settles the plan cell by cell, and the resulting [`RunSummary`] is
//! rendered for the operator and persisted under the series `_logs/`
//! folder.

mod plan;
mod rate_limit;
mod runner;
mod summary;

#[cfg(test)]
mod integration_tests;

pub use plan::{ExecutionPlan, PlanAction, PlanCounts, PlanEntry, Planner};
pub use rate_limit::RateGate;
pub use runner::{PipelineRunner, RUN_SUMMARY_FILE};
pub use summary::{
    log_tail, CellOutcome, HaltBoundary, OutcomeCounts, RunSummary, StageRunRecord,
    LOG_TAIL_LINES,
};
