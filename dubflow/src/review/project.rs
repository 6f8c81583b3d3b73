//! Projection of canonical artifacts into the review mirror.

use crate::config::SeriesPaths;
use crate::core::{EpisodeRecord, Language, StageId, StageScope};
use crate::errors::{ArtifactError, DubflowError};
use crate::review::format::{
    episode_review_file_name, render_episode_block, render_merged, ReviewHeader, EPISODES_DIR,
    MERGED_REVIEW_FILE,
};
use crate::store::{to_csv, ArtifactStore, PROMPT_FILE};
use crate::utils::iso_timestamp;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Files written by one projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewExport {
    /// The exported stage.
    pub stage: StageId,
    /// The exported language cell.
    pub language: Option<Language>,
    /// Path of the merged document.
    pub merged_path: PathBuf,
    /// Per-episode file paths, in episode order.
    pub episode_paths: Vec<PathBuf>,
    /// Copy of the stage's prompt capture, when it recorded one.
    pub prompt_path: Option<PathBuf>,
    /// Glossary CSV, written for translate-stage exports with entries.
    pub glossary_path: Option<PathBuf>,
    /// Store fingerprint embedded in the export.
    pub fingerprint: String,
}

/// Projects canonical episode records into editable markdown under the
/// review mirror of the series folder.
#[derive(Debug)]
pub struct ReviewProjector<'a> {
    store: &'a ArtifactStore,
    review_dir: PathBuf,
}

impl<'a> ReviewProjector<'a> {
    /// Creates a projector writing under the series' review folder.
    #[must_use]
    pub fn new(store: &'a ArtifactStore, paths: &SeriesPaths) -> Self {
        Self {
            store,
            review_dir: paths.review_dir.clone(),
        }
    }

    /// Review folder of one cell (`{review_dir}/{stage_dir}[/{language}]`),
    /// mirroring the store's stage directory layout.
    #[must_use]
    pub fn cell_dir(&self, stage: StageId, language: Option<Language>) -> PathBuf {
        let mut dir = self.review_dir.clone();
        if let Some(name) = stage.dir_name() {
            dir.push(name);
        }
        if let (StageScope::PerLanguage, Some(lang)) = (stage.scope(), language) {
            dir.push(lang.name());
        }
        dir
    }

    /// Exports one cell: the merged document, one file per episode, the
    /// prompt capture when the stage recorded one, and the glossary CSV for
    /// translate-stage exports.
    ///
    /// The returned export carries the store fingerprint embedded in the
    /// documents; reconciliation compares it against the store later.
    pub fn project(
        &self,
        stage: StageId,
        language: Option<Language>,
    ) -> Result<ReviewExport, DubflowError> {
        let episodes = self.store.read_episodes(stage, language)?;
        if episodes.is_empty() {
            return Err(ArtifactError::MissingEpisode {
                dir: self.store.stage_dir(stage, language),
                episode: 1,
            }
            .into());
        }
        let fingerprint = self.store.content_fingerprint(stage, language)?;
        let meta = self.store.read_metadata()?;
        let header = ReviewHeader {
            series_name: meta.series_name,
            stage,
            language,
            generated_at: iso_timestamp(),
            fingerprint: fingerprint.clone(),
            total_episodes: episodes.len(),
            total_characters: episodes.iter().map(EpisodeRecord::char_count).sum(),
        };

        let dir = self.cell_dir(stage, language);
        let episodes_dir = dir.join(EPISODES_DIR);
        fs::create_dir_all(&episodes_dir).map_err(|e| ArtifactError::io(&episodes_dir, e))?;

        let merged_path = dir.join(MERGED_REVIEW_FILE);
        write_text_file(&merged_path, &render_merged(&header, &episodes))?;

        let mut episode_paths = Vec::with_capacity(episodes.len());
        for episode in &episodes {
            let path = episodes_dir.join(episode_review_file_name(episode.episode_number));
            write_text_file(&path, &render_episode_block(episode, false))?;
            episode_paths.push(path);
        }

        let prompt_path = match self.store.read_text_optional(stage, language, PROMPT_FILE)? {
            Some(contents) => {
                let path = dir.join(PROMPT_FILE);
                write_text_file(&path, &contents)?;
                Some(path)
            }
            None => None,
        };

        let glossary_path = match language {
            Some(lang) if stage == StageId::Translate => {
                let entries = self.store.read_glossary(lang)?;
                if entries.is_empty() {
                    None
                } else {
                    let path = dir.join(format!("glossary_{lang}.csv"));
                    write_text_file(&path, &to_csv(&entries))?;
                    Some(path)
                }
            }
            _ => None,
        };

        info!(
            stage = %stage,
            language = ?language,
            episodes = episodes.len(),
            "Review export written"
        );
        Ok(ReviewExport {
            stage,
            language,
            merged_path,
            episode_paths,
            prompt_path,
            glossary_path,
            fingerprint,
        })
    }
}

fn write_text_file(path: &Path, contents: &str) -> Result<(), ArtifactError> {
    fs::write(path, contents).map_err(|e| ArtifactError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GlossaryEntry;
    use crate::testing::TestSeries;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn seeded_series(root: &Path) -> TestSeries {
        let series = TestSeries::at(root);
        series.seed_metadata(Language::Korean);
        series.seed_split(&[(1, "제1화", "원문 하나"), (2, "", "원문 둘")]);
        series.seed_stage(
            StageId::Translate,
            Some(Language::Korean),
            &[(1, "제1화", "첫 본문"), (2, "", "둘째 본문")],
        );
        series
    }

    #[test]
    fn test_project_writes_the_mirror_tree() {
        let tmp = TempDir::new().unwrap();
        let series = seeded_series(tmp.path());
        let projector = ReviewProjector::new(&series.store, &series.paths);

        let export = projector
            .project(StageId::Translate, Some(Language::Korean))
            .unwrap();

        let cell_dir = series
            .paths
            .review_dir
            .join("02_translated")
            .join("korean");
        assert_eq!(export.merged_path, cell_dir.join(MERGED_REVIEW_FILE));
        assert!(export.merged_path.is_file());
        assert_eq!(export.episode_paths.len(), 2);
        assert!(cell_dir.join("episodes/episode_001.md").is_file());
        assert!(cell_dir.join("episodes/episode_002.md").is_file());
        assert_eq!(
            export.fingerprint,
            series
                .store
                .content_fingerprint(StageId::Translate, Some(Language::Korean))
                .unwrap()
        );

        let merged = fs::read_to_string(&export.merged_path).unwrap();
        assert!(merged.starts_with("# Debt of Love - Translated - KOREAN\n"));
        assert!(merged.contains("> Source: 02_translated/korean\n"));
        assert!(merged.contains("첫 본문"));
    }

    #[test]
    fn test_project_copies_prompt_capture() {
        let tmp = TempDir::new().unwrap();
        let series = seeded_series(tmp.path());
        series
            .store
            .write_text(
                StageId::Translate,
                Some(Language::Korean),
                PROMPT_FILE,
                "## Prompt\n\n번역 지침",
            )
            .unwrap();
        let projector = ReviewProjector::new(&series.store, &series.paths);

        let export = projector
            .project(StageId::Translate, Some(Language::Korean))
            .unwrap();

        let path = export.prompt_path.unwrap();
        assert!(path.ends_with("02_translated/korean/__PROMPT_USED.md"));
        assert!(fs::read_to_string(path).unwrap().contains("번역 지침"));
    }

    #[test]
    fn test_project_exports_translate_glossary_csv() {
        let tmp = TempDir::new().unwrap();
        let series = seeded_series(tmp.path());
        series
            .store
            .write_glossary(
                Language::Korean,
                &[GlossaryEntry::new("character", "리나", "Lina")],
            )
            .unwrap();
        let projector = ReviewProjector::new(&series.store, &series.paths);

        let export = projector
            .project(StageId::Translate, Some(Language::Korean))
            .unwrap();

        let csv = fs::read_to_string(export.glossary_path.unwrap()).unwrap();
        assert!(csv.starts_with("Category,Original,Translation,Context\n"));
        assert!(csv.contains("리나"));
    }

    #[test]
    fn test_project_series_stage_has_no_language_segment() {
        let tmp = TempDir::new().unwrap();
        let series = seeded_series(tmp.path());
        let projector = ReviewProjector::new(&series.store, &series.paths);

        let export = projector.project(StageId::Split, None).unwrap();

        assert_eq!(
            export.merged_path,
            series.paths.review_dir.join("01_split").join(MERGED_REVIEW_FILE)
        );
        let merged = fs::read_to_string(&export.merged_path).unwrap();
        assert!(merged.starts_with("# Debt of Love - Split\n"));
        assert!(export.glossary_path.is_none());
    }

    #[test]
    fn test_project_empty_cell_errors() {
        let tmp = TempDir::new().unwrap();
        let series = seeded_series(tmp.path());
        let projector = ReviewProjector::new(&series.store, &series.paths);

        let err = projector
            .project(StageId::Translate, Some(Language::Japanese))
            .unwrap_err();
        assert!(matches!(
            err,
            DubflowError::Artifact(ArtifactError::MissingEpisode { .. })
        ));
    }
}
