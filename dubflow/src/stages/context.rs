//! Per-cell execution context handed to stage units.

use crate::config::{MasteringTargets, PipelineConfig, SeriesPaths};
use crate::core::{Language, SeriesMetadata, SourceUnit};
use crate::errors::StageError;
use crate::services::ServiceSet;
use crate::store::ArtifactStore;
use parking_lot::Mutex;

/// Everything one stage unit invocation can see.
///
/// The context is built fresh per cell by the runner and never outlives the
/// invocation. Log lines written through [`StageContext::log`] are collected
/// by the runner into the per-cell log file.
pub struct StageContext<'a> {
    config: &'a PipelineConfig,
    paths: &'a SeriesPaths,
    store: &'a ArtifactStore,
    services: &'a ServiceSet,
    unit: &'a SourceUnit,
    language: Option<Language>,
    log: Mutex<String>,
}

impl<'a> StageContext<'a> {
    /// Builds the context for one `(stage, language)` cell.
    #[must_use]
    pub fn new(
        config: &'a PipelineConfig,
        paths: &'a SeriesPaths,
        store: &'a ArtifactStore,
        services: &'a ServiceSet,
        unit: &'a SourceUnit,
        language: Option<Language>,
    ) -> Self {
        Self {
            config,
            paths,
            store,
            services,
            unit,
            language,
            log: Mutex::new(String::new()),
        }
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        self.config
    }

    /// Resolved series folders.
    #[must_use]
    pub fn paths(&self) -> &SeriesPaths {
        self.paths
    }

    /// The artifact store for this series.
    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        self.store
    }

    /// The external service seams.
    #[must_use]
    pub fn services(&self) -> &ServiceSet {
        self.services
    }

    /// The ingested source unit.
    #[must_use]
    pub fn source_unit(&self) -> &SourceUnit {
        self.unit
    }

    /// The language cell, `None` for series-scoped stages.
    #[must_use]
    pub fn language(&self) -> Option<Language> {
        self.language
    }

    /// The language cell, or an input error for units that require one.
    pub fn require_language(&self) -> Result<Language, StageError> {
        self.language.ok_or_else(|| {
            StageError::InvalidInput("stage requires a language cell".to_string())
        })
    }

    /// Series metadata written by the prepare stage.
    pub fn metadata(&self) -> Result<SeriesMetadata, StageError> {
        Ok(self.store.read_metadata()?)
    }

    /// Episode-count cap for this run.
    #[must_use]
    pub fn max_episodes(&self) -> Option<u32> {
        self.config.max_episodes
    }

    /// Loudness targets for the mixing stage.
    #[must_use]
    pub fn mastering(&self) -> MasteringTargets {
        self.config.mastering
    }

    /// Whether audio setup must copy the preset instead of casting.
    #[must_use]
    pub fn use_preset_audio(&self) -> bool {
        self.config.use_preset_audio
    }

    /// Appends a line to the cell log.
    pub fn log(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        tracing::info!("{line}");
        let mut buffer = self.log.lock();
        buffer.push_str(line);
        buffer.push('\n');
    }

    /// Drains the collected log text.
    #[must_use]
    pub fn take_log(&self) -> String {
        std::mem::take(&mut *self.log.lock())
    }
}

impl std::fmt::Debug for StageContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("language", &self.language)
            .field("series_dir", &self.paths.series_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn fixture(tmp: &TempDir) -> (PipelineConfig, SeriesPaths, ArtifactStore, SourceUnit) {
        let config = PipelineConfig::builder()
            .output_root(tmp.path().join("out"))
            .review_root(tmp.path().join("review"))
            .build()
            .unwrap();
        let unit =
            SourceUnit::from_path(Path::new("/src"), Path::new("/src/KR/Peex/series.docx"));
        let meta = SeriesMetadata::new("Series", &unit, Language::Korean);
        let paths = config.series_paths(&meta);
        let store = ArtifactStore::open(paths.series_dir.clone());
        (config, paths, store, unit)
    }

    #[test]
    fn test_log_lines_are_collected_and_drained() {
        let tmp = TempDir::new().unwrap();
        let (config, paths, store, unit) = fixture(&tmp);
        let services = ServiceSet::disconnected();
        let ctx = StageContext::new(&config, &paths, &store, &services, &unit, None);
        ctx.log("first");
        ctx.log("second");
        assert_eq!(ctx.take_log(), "first\nsecond\n");
        assert_eq!(ctx.take_log(), "");
    }

    #[test]
    fn test_require_language_fails_for_series_cells() {
        let tmp = TempDir::new().unwrap();
        let (config, paths, store, unit) = fixture(&tmp);
        let services = ServiceSet::disconnected();
        let ctx = StageContext::new(&config, &paths, &store, &services, &unit, None);
        assert!(ctx.require_language().is_err());

        let ctx = StageContext::new(
            &config,
            &paths,
            &store,
            &services,
            &unit,
            Some(Language::Japanese),
        );
        assert_eq!(ctx.require_language().unwrap(), Language::Japanese);
    }
}
