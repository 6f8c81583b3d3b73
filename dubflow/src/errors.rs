//! Error types for the dubflow engine.
//!
//! The taxonomy separates orchestration failures (missing dependencies,
//! failed stage units) from review reconciliation failures (stale or
//! malformed review documents) and from configuration and storage problems.
//! A rate-limit wait is not an error anywhere in this crate.

use crate::core::{Language, ParseLanguageError, ParseStageIdError, StageId};
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for dubflow operations.
#[derive(Debug, Error)]
pub enum DubflowError {
    /// A required upstream artifact is absent or incomplete.
    #[error("{0}")]
    MissingDependency(#[from] MissingDependencyError),

    /// A stage unit reported failure.
    #[error("{0}")]
    StageExecution(#[from] StageExecutionError),

    /// A review document no longer matches the canonical artifacts.
    #[error("{0}")]
    StaleReview(#[from] StaleReviewError),

    /// A review document could not be parsed back.
    #[error("{0}")]
    MalformedReview(#[from] MalformedReviewError),

    /// Invalid pipeline configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Artifact store failure.
    #[error("{0}")]
    Artifact(#[from] ArtifactError),

    /// IO error outside the artifact store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn cell_label(language: &Option<Language>) -> String {
    language.map_or_else(|| "series".to_string(), |l| l.to_string())
}

/// A stage was asked to run before its required input existed.
///
/// Raised by the runner's pre-invocation probe; the stage unit itself is
/// never invoked. A skipped or failed upstream stage propagates through
/// this error when a downstream stage later probes for its artifact.
#[derive(Debug, Clone, Error)]
#[error(
    "stage {stage} ({}) requires the output of stage {missing}, which is absent or incomplete",
    cell_label(.language)
)]
pub struct MissingDependencyError {
    /// The stage that could not run.
    pub stage: StageId,
    /// The language cell, `None` for series-scoped stages.
    pub language: Option<Language>,
    /// The upstream stage whose artifact is missing.
    pub missing: StageId,
}

/// A stage unit ran and reported failure.
#[derive(Debug, Error)]
#[error("stage {stage} ({}) failed: {source}", cell_label(.language))]
pub struct StageExecutionError {
    /// The failing stage.
    pub stage: StageId,
    /// The language cell, `None` for series-scoped stages.
    pub language: Option<Language>,
    /// The unit-level cause.
    #[source]
    pub source: StageError,
}

/// A failure inside one stage unit invocation.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage needs an external service that is not wired up.
    #[error("service '{service}' is not configured")]
    ServiceNotConfigured {
        /// Name of the missing service.
        service: String,
    },

    /// An external service call failed.
    #[error("service '{service}' failed: {message}")]
    Service {
        /// Name of the failing service.
        service: String,
        /// Service-reported message.
        message: String,
    },

    /// The stage's input artifact exists but is unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// IO failure while reading inputs or writing outputs.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in an input artifact.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Artifact store failure inside the unit.
    #[error("{0}")]
    Artifact(#[from] ArtifactError),
}

/// A review document's fingerprint no longer matches the canonical data.
///
/// Nothing has been written when this is raised; the review must be
/// re-exported from the current artifacts.
#[derive(Debug, Clone, Error)]
#[error(
    "review for stage {stage} ({}) is stale: canonical data changed after export \
     (expected fingerprint {expected}, found {found})",
    cell_label(.language)
)]
pub struct StaleReviewError {
    /// The reviewed stage.
    pub stage: StageId,
    /// The reviewed language cell.
    pub language: Option<Language>,
    /// Fingerprint recorded in the review document.
    pub expected: String,
    /// Fingerprint of the canonical artifacts now.
    pub found: String,
}

/// A review document could not be parsed back into episode records.
#[derive(Debug, Clone, Error)]
#[error("malformed review document {}: {detail}", .path.display())]
pub struct MalformedReviewError {
    /// The offending file.
    pub path: PathBuf,
    /// What was wrong, naming the episode or marker where possible.
    pub detail: String,
}

impl MalformedReviewError {
    /// Creates a new malformed review error.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// Invalid pipeline configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The target language list is empty.
    #[error("at least one target language is required")]
    NoLanguages,

    /// A stage token in the skip set did not parse.
    #[error("invalid skip set entry: {0}")]
    InvalidStage(#[from] ParseStageIdError),

    /// A language name did not parse.
    #[error("invalid language: {0}")]
    InvalidLanguage(#[from] ParseLanguageError),

    /// Mastering targets are out of range.
    #[error("invalid mastering target: {detail}")]
    InvalidMastering {
        /// Which target and why.
        detail: String,
    },

    /// The rate-limit delay is not a finite non-negative number of seconds.
    #[error("invalid rate limit delay: {detail}")]
    InvalidRateLimit {
        /// Why the delay was rejected.
        detail: String,
    },

    /// A configured root directory does not exist.
    #[error("{name} directory does not exist: {}", .path.display())]
    MissingRoot {
        /// Which root (`source`, `output`, `review`).
        name: &'static str,
        /// The missing path.
        path: PathBuf,
    },
}

/// Failure in the artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// IO failure against a store path.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A structured record failed to parse or serialize.
    #[error("JSON error at {}: {source}", .path.display())]
    Json {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// An episode referenced by number does not exist in the stage artifact.
    #[error("episode {episode} not found under {}", .dir.display())]
    MissingEpisode {
        /// The stage artifact directory.
        dir: PathBuf,
        /// The missing episode number.
        episode: u32,
    },

    /// The artifact was written by an incompatible engine version.
    #[error("artifact schema version {found} is not compatible (supported: {supported})")]
    SchemaVersion {
        /// Version found on disk.
        found: u32,
        /// Version this engine writes.
        supported: u32,
    },
}

impl ArtifactError {
    /// Wraps an IO error with the path it happened at.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wraps a JSON error with the path it happened at.
    #[must_use]
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dependency_names_both_stages() {
        let err = MissingDependencyError {
            stage: StageId::TtsFormat,
            language: Some(Language::Japanese),
            missing: StageId::Translate,
        };
        let msg = err.to_string();
        assert!(msg.contains("stage 3"), "{msg}");
        assert!(msg.contains("japanese"), "{msg}");
        assert!(msg.contains("stage 2"), "{msg}");
    }

    #[test]
    fn test_series_cell_label() {
        let err = MissingDependencyError {
            stage: StageId::Split,
            language: None,
            missing: StageId::Prepare,
        };
        assert!(err.to_string().contains("(series)"));
    }

    #[test]
    fn test_stage_execution_wraps_unit_error() {
        let err = StageExecutionError {
            stage: StageId::Translate,
            language: Some(Language::Korean),
            source: StageError::ServiceNotConfigured {
                service: "language_model".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("stage 2 (korean) failed"), "{msg}");
        assert!(msg.contains("language_model"), "{msg}");
    }

    #[test]
    fn test_stale_review_reports_fingerprints() {
        let err = StaleReviewError {
            stage: StageId::Translate,
            language: Some(Language::Korean),
            expected: "aaa111".to_string(),
            found: "bbb222".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aaa111") && msg.contains("bbb222"), "{msg}");
    }

    #[test]
    fn test_dubflow_error_from_sub_errors() {
        let err: DubflowError = ConfigError::NoLanguages.into();
        assert!(matches!(err, DubflowError::Config(_)));
        let err: DubflowError = MalformedReviewError::new("/tmp/r.md", "missing header").into();
        assert!(err.to_string().contains("missing header"));
    }
}
