//! # Dubflow
//!
//! A stage-oriented engine that turns long-form text sources into localized,
//! emotion-tagged, voice-synthesized audio series.
//!
//! Dubflow models the production pipeline as eleven file-persisted stages
//! and provides:
//!
//! - **Plan-then-execute orchestration**: a pure planner decides per
//!   `(stage, language)` cell whether to run, reuse or skip; a runner
//!   executes the plan strictly in order
//! - **Artifact-store resumability**: every stage's output is a sealed,
//!   versioned artifact a later run can pick up instead of recomputing
//! - **Review round-trips**: canonical records project into editable
//!   markdown and reconcile back with staleness detection
//! - **QA aggregation**: per-language gate fragments roll up into one
//!   series-level report
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dubflow::prelude::*;
//!
//! let config = PipelineConfig::builder()
//!     .source_root("/data/sources")
//!     .output_root("/data/out")
//!     .review_root("/data/review")
//!     .languages([Language::Korean, Language::Japanese])
//!     .skip_str("5,6,6a,7")?
//!     .build()?;
//!
//! let plan = Planner::plan(&config, &store);
//! let summary = PipelineRunner::new(&config, &paths, &store, &services, &unit)
//!     .execute(&plan)
//!     .await;
//! assert!(summary.success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod pipeline;
pub mod qa;
pub mod review;
pub mod services;
pub mod stages;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        MasteringTargets, PipelineConfig, RateLimitPolicy, ResumePolicy, SeriesPaths,
    };
    pub use crate::core::{
        EpisodeRecord, Language, SeriesMetadata, SourceUnit, StageGraph, StageId, StageScope,
    };
    pub use crate::errors::{DubflowError, StageError};
    pub use crate::pipeline::{
        ExecutionPlan, PipelineRunner, PlanAction, Planner, RunSummary, StageRunRecord,
    };
    pub use crate::qa::{QaAggregator, QaSummary};
    pub use crate::review::{ReviewProjector, ReviewReconciler};
    pub use crate::services::ServiceSet;
    pub use crate::stages::{StageContext, StageRegistry, StageUnit};
    pub use crate::store::{ArtifactDescriptor, ArtifactStore};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
