//! Pipeline configuration.
//!
//! Configuration is a plain immutable value built once by the caller and
//! passed down by reference. The library never reads environment variables
//! or global state; front ends resolve those before constructing the
//! builder.

use crate::core::{Language, SeriesMetadata, StageId};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default minimum interval between external API calls, in seconds.
pub const DEFAULT_RATE_LIMIT_SECS: f64 = 6.0;

/// Default mastering peak target in dBFS.
pub const DEFAULT_PEAK_DB: f32 = -3.0;

/// Default mastering RMS target in dBFS.
pub const DEFAULT_RMS_DB: f32 = -20.0;

/// Cooperative inter-call delay applied before API-bound stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Minimum interval between external calls.
    pub delay: Duration,
}

impl RateLimitPolicy {
    /// Builds a policy from a delay in seconds. Zero disables the wait.
    pub fn from_secs(secs: f64) -> Result<Self, ConfigError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(ConfigError::InvalidRateLimit {
                detail: format!("{secs} seconds"),
            });
        }
        Ok(Self {
            delay: Duration::from_secs_f64(secs),
        })
    }

    /// Whether the policy imposes any wait at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.delay.is_zero()
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs_f64(DEFAULT_RATE_LIMIT_SECS),
        }
    }
}

/// How existing artifacts are treated when planning a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    /// A complete, schema-compatible artifact satisfies its stage; the
    /// stage is skipped. Incomplete artifacts are treated as absent and
    /// cleared before the stage re-runs.
    #[default]
    ReuseComplete,
    /// Every non-skipped stage is planned as a fresh run regardless of
    /// existing artifacts.
    RequireFresh,
}

/// Loudness targets for the final mastering pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasteringTargets {
    /// Peak target in dBFS.
    pub peak_db: f32,
    /// Average (RMS) target in dBFS.
    pub rms_db: f32,
}

impl Default for MasteringTargets {
    fn default() -> Self {
        Self {
            peak_db: DEFAULT_PEAK_DB,
            rms_db: DEFAULT_RMS_DB,
        }
    }
}

impl MasteringTargets {
    fn verify(&self) -> Result<(), ConfigError> {
        if !self.peak_db.is_finite() || !self.rms_db.is_finite() {
            return Err(ConfigError::InvalidMastering {
                detail: "targets must be finite".to_string(),
            });
        }
        if self.peak_db > 0.0 {
            return Err(ConfigError::InvalidMastering {
                detail: format!("peak {} dB is above full scale", self.peak_db),
            });
        }
        if self.rms_db >= self.peak_db {
            return Err(ConfigError::InvalidMastering {
                detail: format!(
                    "RMS target {} dB must sit below the peak target {} dB",
                    self.rms_db, self.peak_db
                ),
            });
        }
        Ok(())
    }
}

/// Immutable configuration for one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root of the source document tree (`{territory}/{publisher}/...`).
    pub source_root: PathBuf,
    /// Root of the processed artifact tree.
    pub output_root: PathBuf,
    /// Root of the review mirror tree.
    pub review_root: PathBuf,
    /// Target languages, deduplicated, in caller order.
    pub languages: Vec<Language>,
    /// Stages the operator asked to skip.
    pub skip: BTreeSet<StageId>,
    /// Inter-call delay for API-bound stages.
    pub rate_limit: RateLimitPolicy,
    /// Halt the run after the first failed cell.
    pub stop_on_error: bool,
    /// Cap on the number of episodes produced by the split stage.
    pub max_episodes: Option<u32>,
    /// Treatment of existing artifacts at planning time.
    pub resume: ResumePolicy,
    /// Loudness targets for the mastering pass.
    pub mastering: MasteringTargets,
    /// Copy the preset audio configuration instead of deriving one.
    pub use_preset_audio: bool,
}

impl PipelineConfig {
    /// Starts a builder with default policies.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Resolves the per-series folder set for a given metadata record.
    #[must_use]
    pub fn series_paths(&self, meta: &SeriesMetadata) -> SeriesPaths {
        let relative = Path::new(&meta.language_code)
            .join(&meta.publisher)
            .join(&meta.series_name);
        SeriesPaths {
            series_dir: self.output_root.join(&relative),
            review_dir: self.review_root.join(&relative),
        }
    }

    /// Errors unless the source root exists on disk.
    pub fn ensure_source_root(&self) -> Result<(), ConfigError> {
        if self.source_root.is_dir() {
            Ok(())
        } else {
            Err(ConfigError::MissingRoot {
                name: "source",
                path: self.source_root.clone(),
            })
        }
    }
}

/// Resolved on-disk locations for one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesPaths {
    /// `{output_root}/{territory}/{publisher}/{series_name}`.
    pub series_dir: PathBuf,
    /// The same layout under the review root.
    pub review_dir: PathBuf,
}

impl SeriesPaths {
    /// Background-music folder inside the series directory.
    #[must_use]
    pub fn music_dir(&self) -> PathBuf {
        self.series_dir.join("music")
    }

    /// Per-run log folder inside the series directory.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.series_dir.join("_logs")
    }
}

/// Builder for [`PipelineConfig`] with validation at `build()`.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    source_root: PathBuf,
    output_root: PathBuf,
    review_root: PathBuf,
    languages: Option<Vec<Language>>,
    skip: BTreeSet<StageId>,
    rate_limit: Option<RateLimitPolicy>,
    stop_on_error: bool,
    max_episodes: Option<u32>,
    resume: ResumePolicy,
    mastering: MasteringTargets,
    use_preset_audio: bool,
}

impl PipelineConfigBuilder {
    /// Creates a builder with every policy at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source tree root.
    #[must_use]
    pub fn source_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_root = path.into();
        self
    }

    /// Sets the processed artifact tree root.
    #[must_use]
    pub fn output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = path.into();
        self
    }

    /// Sets the review mirror root.
    #[must_use]
    pub fn review_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.review_root = path.into();
        self
    }

    /// Sets the target languages. Duplicates collapse to first occurrence.
    #[must_use]
    pub fn languages(mut self, languages: impl IntoIterator<Item = Language>) -> Self {
        self.languages = Some(languages.into_iter().collect());
        self
    }

    /// Parses a comma-separated language list (`"korean,japanese"`).
    pub fn languages_str(self, list: &str) -> Result<Self, ConfigError> {
        let mut languages = Vec::new();
        for token in list.split(',').filter(|t| !t.trim().is_empty()) {
            languages.push(Language::from_str(token)?);
        }
        Ok(self.languages(languages))
    }

    /// Adds one stage to the skip set.
    #[must_use]
    pub fn skip_stage(mut self, stage: StageId) -> Self {
        self.skip.insert(stage);
        self
    }

    /// Parses a comma-separated skip set (`"5,6,6a,7"`).
    pub fn skip_str(mut self, list: &str) -> Result<Self, ConfigError> {
        for token in list.split(',').filter(|t| !t.trim().is_empty()) {
            self.skip.insert(StageId::from_str(token)?);
        }
        Ok(self)
    }

    /// Sets the rate-limit delay in seconds.
    pub fn rate_limit_secs(mut self, secs: f64) -> Result<Self, ConfigError> {
        self.rate_limit = Some(RateLimitPolicy::from_secs(secs)?);
        Ok(self)
    }

    /// Sets the stop-on-error flag.
    #[must_use]
    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    /// Caps the number of episodes the split stage emits.
    #[must_use]
    pub fn max_episodes(mut self, cap: u32) -> Self {
        self.max_episodes = Some(cap);
        self
    }

    /// Sets the resume policy.
    #[must_use]
    pub fn resume(mut self, policy: ResumePolicy) -> Self {
        self.resume = policy;
        self
    }

    /// Sets the mastering loudness targets.
    #[must_use]
    pub fn mastering(mut self, peak_db: f32, rms_db: f32) -> Self {
        self.mastering = MasteringTargets { peak_db, rms_db };
        self
    }

    /// Uses the preset audio configuration in stage 5.
    #[must_use]
    pub fn use_preset_audio(mut self, preset: bool) -> Self {
        self.use_preset_audio = preset;
        self
    }

    /// Validates and produces the immutable configuration.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let mut languages = self
            .languages
            .unwrap_or_else(|| Language::DEFAULT_TARGETS.to_vec());
        let mut seen = BTreeSet::new();
        languages.retain(|l| seen.insert(*l));
        if languages.is_empty() {
            return Err(ConfigError::NoLanguages);
        }
        self.mastering.verify()?;
        Ok(PipelineConfig {
            source_root: self.source_root,
            output_root: self.output_root,
            review_root: self.review_root,
            languages,
            skip: self.skip,
            rate_limit: self.rate_limit.unwrap_or_default(),
            stop_on_error: self.stop_on_error,
            max_episodes: self.max_episodes,
            resume: self.resume,
            mastering: self.mastering,
            use_preset_audio: self.use_preset_audio,
        })
    }
}
