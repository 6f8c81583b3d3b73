//! Test fixture wiring a config, store and source unit over one directory.

use crate::config::{PipelineConfig, PipelineConfigBuilder, SeriesPaths};
use crate::core::{clean_series_name, EpisodeRecord, Language, SeriesMetadata, SourceUnit, StageId};
use crate::services::ServiceSet;
use crate::stages::StageContext;
use crate::store::ArtifactStore;
use std::path::Path;

/// One series rooted in a caller-provided directory, ready for stage tests.
///
/// The fixture derives its folder set the way the engine does at run time:
/// `sources/`, `out/` and `review/` under the root, a Korean source document
/// under `sources/KR/Peex/`, and an [`ArtifactStore`] opened on the series
/// directory. Seed helpers write prior-stage artifacts so a unit under test
/// can start mid-pipeline.
pub struct TestSeries {
    /// Built pipeline configuration.
    pub config: PipelineConfig,
    /// Resolved per-series folders.
    pub paths: SeriesPaths,
    /// Store opened on the series directory.
    pub store: ArtifactStore,
    /// The ingested source document.
    pub unit: SourceUnit,
}

impl TestSeries {
    /// Creates a fixture with default configuration under `root`.
    #[must_use]
    pub fn at(root: &Path) -> Self {
        Self::at_with(root, |builder| builder)
    }

    /// Creates a fixture under `root`, letting `tune` adjust the config
    /// builder after the three roots are set.
    ///
    /// # Panics
    ///
    /// Panics when the tuned configuration does not build.
    #[must_use]
    pub fn at_with(
        root: &Path,
        tune: impl FnOnce(PipelineConfigBuilder) -> PipelineConfigBuilder,
    ) -> Self {
        let builder = PipelineConfig::builder()
            .source_root(root.join("sources"))
            .output_root(root.join("out"))
            .review_root(root.join("review"));
        let config = match tune(builder).build() {
            Ok(config) => config,
            Err(e) => panic!("fixture config did not build: {e}"),
        };
        let source_path = config
            .source_root
            .join("KR")
            .join("Peex")
            .join("[Peex] Debt_of_Love.txt");
        let unit = SourceUnit::from_path(&config.source_root, &source_path);
        let meta =
            SeriesMetadata::new(clean_series_name(&unit.file_stem), &unit, Language::Korean);
        let paths = config.series_paths(&meta);
        let store = ArtifactStore::open(paths.series_dir.clone());
        Self {
            config,
            paths,
            store,
            unit,
        }
    }

    /// Writes stage 0 metadata with the given source language.
    ///
    /// # Panics
    ///
    /// Panics when the store cannot write the metadata file.
    pub fn seed_metadata(&self, source_language: Language) -> SeriesMetadata {
        let meta = SeriesMetadata::new(
            clean_series_name(&self.unit.file_stem),
            &self.unit,
            source_language,
        );
        if let Err(e) = self.store.write_metadata(&meta) {
            panic!("fixture could not write metadata: {e}");
        }
        meta
    }

    /// Writes split episodes (stage 1) and seals the artifact.
    pub fn seed_split(&self, episodes: &[(u32, &str, &str)]) {
        self.seed_stage(StageId::Split, None, episodes);
    }

    /// Writes `(number, title, content)` episode records into a cell and
    /// seals it as complete.
    ///
    /// # Panics
    ///
    /// Panics when the store cannot write or seal the artifact.
    pub fn seed_stage(
        &self,
        stage: StageId,
        language: Option<Language>,
        episodes: &[(u32, &str, &str)],
    ) {
        for (number, title, content) in episodes {
            let record = EpisodeRecord::new(*number, *title, *content);
            if let Err(e) = self.store.write_episode(stage, language, &record) {
                panic!("fixture could not write episode {number}: {e}");
            }
        }
        if let Err(e) = self.store.seal(stage, language, Some(episodes.len())) {
            panic!("fixture could not seal {stage}: {e}");
        }
    }

    /// Builds a stage context over the fixture's series.
    #[must_use]
    pub fn context<'a>(
        &'a self,
        services: &'a ServiceSet,
        language: Option<Language>,
    ) -> StageContext<'a> {
        StageContext::new(
            &self.config,
            &self.paths,
            &self.store,
            services,
            &self.unit,
            language,
        )
    }
}
