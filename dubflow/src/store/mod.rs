//! Filesystem-backed artifact store for one series.
//!
//! The store owns all path layout and all skip-decision state. Every stage
//! reads and writes its artifacts through it, and the planner asks it for
//! [`ArtifactDescriptor`]s instead of touching the filesystem itself.
//!
//! Layout under the series folder:
//!
//! ```text
//! series_metadata.json            stage 0
//! glossary_korean.json            translate sidecars
//! 01_split/episode_001.json       series-scoped stages
//! 02_translated/korean/...        per-language stages
//! 06_tts_audio/korean/episode_001/{chunk files, metadata.json}
//! 07_final_audio/korean/episode_001_final.mp3
//! ```
//!
//! Each directory written by the store carries a small marker file recording
//! the schema version and the expected file count; a directory without a
//! marker (an interrupted or foreign write) is present but never complete.

mod descriptor;
mod glossary;

pub use descriptor::{ArtifactDescriptor, ArtifactMarker, MARKER_FILE, SCHEMA_VERSION};
pub use glossary::{glossary_file_name, merge_entries, to_csv, GlossaryEntry};

use crate::core::{EpisodeRecord, Language, SeriesMetadata, StageId, StageScope};
use crate::errors::ArtifactError;
use crate::utils::iso_timestamp;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the stage 0 artifact.
pub const SERIES_METADATA_FILE: &str = "series_metadata.json";

/// File name of QA fragments (stages `2a` and `6a`).
pub const QA_REPORT_FILE: &str = "qa_report.json";

/// File name of the stage 5 artifact.
pub const AUDIO_CONFIG_FILE: &str = "audio_config.json";

/// File name of the chunk manifest inside each stage 6 episode directory.
pub const CHUNK_MANIFEST_FILE: &str = "metadata.json";

/// File name for the prompt capture a stage may leave for reviewers.
pub const PROMPT_FILE: &str = "__PROMPT_USED.md";

/// Handle over one series folder.
#[derive(Debug)]
pub struct ArtifactStore {
    series_dir: PathBuf,
    descriptors: Mutex<HashMap<(StageId, Option<Language>), ArtifactDescriptor>>,
}

impl ArtifactStore {
    /// Opens a store over a series folder. The folder may not exist yet;
    /// stage 0 creates it.
    #[must_use]
    pub fn open(series_dir: impl Into<PathBuf>) -> Self {
        Self {
            series_dir: series_dir.into(),
            descriptors: Mutex::new(HashMap::new()),
        }
    }

    /// The series folder this store is rooted at.
    #[must_use]
    pub fn series_dir(&self) -> &Path {
        &self.series_dir
    }

    /// The shared `music/` folder of the series.
    #[must_use]
    pub fn music_dir(&self) -> PathBuf {
        self.series_dir.join("music")
    }

    /// Creates the series folder and its `music/` subfolder.
    pub fn ensure_series_dir(&self) -> Result<(), ArtifactError> {
        let music = self.music_dir();
        fs::create_dir_all(&music).map_err(|e| ArtifactError::io(&music, e))?;
        Ok(())
    }

    /// Directory holding the artifact of `(stage, language)`.
    ///
    /// Series-scoped stages ignore `language`; stage 0 resolves to the
    /// series folder itself.
    #[must_use]
    pub fn stage_dir(&self, stage: StageId, language: Option<Language>) -> PathBuf {
        let Some(dir) = stage.dir_name() else {
            return self.series_dir.clone();
        };
        let base = self.series_dir.join(dir);
        match (stage.scope(), language) {
            (StageScope::PerLanguage, Some(lang)) => base.join(lang.name()),
            _ => base,
        }
    }

    // ------------------------------------------------------------------
    // Descriptors

    /// Probes `(stage, language)`, returning the cached descriptor when the
    /// cell has not been written since the last probe.
    #[must_use]
    pub fn descriptor(&self, stage: StageId, language: Option<Language>) -> ArtifactDescriptor {
        let key = (stage, language);
        if let Some(found) = self.descriptors.lock().get(&key) {
            return found.clone();
        }
        let computed = self.probe(stage, language);
        self.descriptors.lock().insert(key, computed.clone());
        computed
    }

    /// Whether a satisfying artifact exists for `(stage, language)`.
    #[must_use]
    pub fn is_satisfying(&self, stage: StageId, language: Option<Language>) -> bool {
        self.descriptor(stage, language).is_satisfying()
    }

    /// Drops the cached descriptor for one cell.
    pub fn invalidate(&self, stage: StageId, language: Option<Language>) {
        self.descriptors.lock().remove(&(stage, language));
    }

    /// Marks a stage artifact as completely written.
    ///
    /// Drops the marker file recording the schema version and, when given,
    /// the expected number of artifact files. Until a cell is sealed its
    /// descriptor reports `complete: false`.
    pub fn seal(
        &self,
        stage: StageId,
        language: Option<Language>,
        expected_files: Option<usize>,
    ) -> Result<(), ArtifactError> {
        if stage == StageId::Prepare {
            // The metadata file is its own completion marker.
            self.invalidate(stage, language);
            return Ok(());
        }
        let dir = self.stage_dir(stage, language);
        fs::create_dir_all(&dir).map_err(|e| ArtifactError::io(&dir, e))?;
        let marker = ArtifactMarker {
            schema_version: SCHEMA_VERSION,
            updated_at: iso_timestamp(),
            expected_files,
        };
        self.write_json_at(&dir.join(MARKER_FILE), &marker)?;
        self.invalidate(stage, language);
        Ok(())
    }

    /// Deletes the artifact of one cell so its stage can run fresh.
    ///
    /// For stage 0 only the metadata file is removed; the series folder and
    /// unrelated sidecars stay.
    pub fn clear_stage(
        &self,
        stage: StageId,
        language: Option<Language>,
    ) -> Result<(), ArtifactError> {
        if stage == StageId::Prepare {
            let path = self.metadata_path();
            if path.exists() {
                fs::remove_file(&path).map_err(|e| ArtifactError::io(&path, e))?;
            }
        } else {
            let dir = self.stage_dir(stage, language);
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| ArtifactError::io(&dir, e))?;
            }
        }
        self.invalidate(stage, language);
        Ok(())
    }

    fn probe(&self, stage: StageId, language: Option<Language>) -> ArtifactDescriptor {
        if stage == StageId::Prepare {
            return self.probe_metadata();
        }
        let dir = self.stage_dir(stage, language);
        if !dir.is_dir() {
            return ArtifactDescriptor::absent(stage, language);
        }
        let marker = self.read_marker(&dir);
        let file_count = match stage {
            StageId::TtsGeneration => episode_chunk_dirs(&dir).len(),
            StageId::AudioMixing => final_audio_files(&dir).len(),
            StageId::TranslationQa | StageId::TtsQa => {
                usize::from(dir.join(QA_REPORT_FILE).is_file())
            }
            StageId::AudioSetup => usize::from(dir.join(AUDIO_CONFIG_FILE).is_file()),
            _ => episode_files(&dir).len(),
        };
        let present = file_count > 0 || marker.is_some();
        let (schema_version, sealed, expected_ok) = match &marker {
            Some(m) => (
                m.schema_version,
                true,
                m.expected_files.map_or(true, |n| n == file_count),
            ),
            None => (SCHEMA_VERSION, false, true),
        };
        ArtifactDescriptor {
            stage,
            language,
            present,
            complete: sealed && expected_ok && file_count > 0,
            schema_version,
            file_count,
        }
    }

    fn probe_metadata(&self) -> ArtifactDescriptor {
        let path = self.metadata_path();
        if !path.is_file() {
            return ArtifactDescriptor::absent(StageId::Prepare, None);
        }
        let parses = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<SeriesMetadata>(&bytes).ok())
            .is_some();
        ArtifactDescriptor {
            stage: StageId::Prepare,
            language: None,
            present: true,
            complete: parses,
            schema_version: SCHEMA_VERSION,
            file_count: 1,
        }
    }

    fn read_marker(&self, dir: &Path) -> Option<ArtifactMarker> {
        let bytes = fs::read(dir.join(MARKER_FILE)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    // ------------------------------------------------------------------
    // Series metadata

    /// Path of `series_metadata.json`.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.series_dir.join(SERIES_METADATA_FILE)
    }

    /// Reads the series metadata.
    pub fn read_metadata(&self) -> Result<SeriesMetadata, ArtifactError> {
        self.read_json_at(&self.metadata_path())
    }

    /// Writes the series metadata and invalidates the stage 0 descriptor.
    pub fn write_metadata(&self, meta: &SeriesMetadata) -> Result<(), ArtifactError> {
        self.ensure_series_dir()?;
        self.write_json_at(&self.metadata_path(), meta)?;
        self.invalidate(StageId::Prepare, None);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Episode records

    /// Reads all episodes of a cell, ordered by episode number.
    pub fn read_episodes(
        &self,
        stage: StageId,
        language: Option<Language>,
    ) -> Result<Vec<EpisodeRecord>, ArtifactError> {
        let dir = self.stage_dir(stage, language);
        let mut episodes = Vec::new();
        for (_, path) in episode_files(&dir) {
            episodes.push(self.read_json_at(&path)?);
        }
        Ok(episodes)
    }

    /// Reads one episode by number.
    pub fn read_episode(
        &self,
        stage: StageId,
        language: Option<Language>,
        episode_number: u32,
    ) -> Result<EpisodeRecord, ArtifactError> {
        let dir = self.stage_dir(stage, language);
        let path = dir.join(EpisodeRecord::file_name(episode_number));
        if !path.is_file() {
            return Err(ArtifactError::MissingEpisode {
                dir,
                episode: episode_number,
            });
        }
        self.read_json_at(&path)
    }

    /// Writes one episode record and invalidates the cell's descriptor.
    pub fn write_episode(
        &self,
        stage: StageId,
        language: Option<Language>,
        episode: &EpisodeRecord,
    ) -> Result<(), ArtifactError> {
        let dir = self.stage_dir(stage, language);
        fs::create_dir_all(&dir).map_err(|e| ArtifactError::io(&dir, e))?;
        let path = dir.join(EpisodeRecord::file_name(episode.episode_number));
        self.write_json_at(&path, episode)?;
        self.invalidate(stage, language);
        Ok(())
    }

    /// SHA-256 fingerprint over the canonical form of every episode record
    /// of a cell, in episode order. This is the hash embedded in review
    /// exports and compared at reconcile time.
    pub fn content_fingerprint(
        &self,
        stage: StageId,
        language: Option<Language>,
    ) -> Result<String, ArtifactError> {
        let dir = self.stage_dir(stage, language);
        let mut hasher = Sha256::new();
        for (number, path) in episode_files(&dir) {
            let bytes = fs::read(&path).map_err(|e| ArtifactError::io(&path, e))?;
            let value: serde_json::Value =
                serde_json::from_slice(&bytes).map_err(|e| ArtifactError::json(&path, e))?;
            let canonical =
                serde_json::to_vec(&value).map_err(|e| ArtifactError::json(&path, e))?;
            hasher.update(number.to_be_bytes());
            hasher.update(&canonical);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    // ------------------------------------------------------------------
    // Structured files and text sidecars

    /// Reads a structured file from a stage directory.
    pub fn read_json<T: DeserializeOwned>(
        &self,
        stage: StageId,
        language: Option<Language>,
        name: &str,
    ) -> Result<T, ArtifactError> {
        self.read_json_at(&self.stage_dir(stage, language).join(name))
    }

    /// Reads a structured file if it exists.
    pub fn read_json_optional<T: DeserializeOwned>(
        &self,
        stage: StageId,
        language: Option<Language>,
        name: &str,
    ) -> Result<Option<T>, ArtifactError> {
        let path = self.stage_dir(stage, language).join(name);
        if path.is_file() {
            Ok(Some(self.read_json_at(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Writes a structured file into a stage directory.
    pub fn write_json<T: Serialize>(
        &self,
        stage: StageId,
        language: Option<Language>,
        name: &str,
        value: &T,
    ) -> Result<(), ArtifactError> {
        let dir = self.stage_dir(stage, language);
        fs::create_dir_all(&dir).map_err(|e| ArtifactError::io(&dir, e))?;
        self.write_json_at(&dir.join(name), value)?;
        self.invalidate(stage, language);
        Ok(())
    }

    /// Writes a text sidecar (prompt captures and the like) into a stage
    /// directory.
    pub fn write_text(
        &self,
        stage: StageId,
        language: Option<Language>,
        name: &str,
        contents: &str,
    ) -> Result<(), ArtifactError> {
        let dir = self.stage_dir(stage, language);
        fs::create_dir_all(&dir).map_err(|e| ArtifactError::io(&dir, e))?;
        let path = dir.join(name);
        fs::write(&path, contents).map_err(|e| ArtifactError::io(&path, e))
    }

    /// Reads a text sidecar if it exists.
    pub fn read_text_optional(
        &self,
        stage: StageId,
        language: Option<Language>,
        name: &str,
    ) -> Result<Option<String>, ArtifactError> {
        let path = self.stage_dir(stage, language).join(name);
        if path.is_file() {
            let text = fs::read_to_string(&path).map_err(|e| ArtifactError::io(&path, e))?;
            Ok(Some(text))
        } else {
            Ok(None)
        }
    }

    // ------------------------------------------------------------------
    // Glossary sidecars

    /// Reads the glossary for a language; a missing sidecar is empty.
    pub fn read_glossary(&self, language: Language) -> Result<Vec<GlossaryEntry>, ArtifactError> {
        let path = self.series_dir.join(glossary_file_name(language));
        if !path.is_file() {
            return Ok(Vec::new());
        }
        self.read_json_at(&path)
    }

    /// Writes the glossary for a language.
    pub fn write_glossary(
        &self,
        language: Language,
        entries: &[GlossaryEntry],
    ) -> Result<(), ArtifactError> {
        self.ensure_series_dir()?;
        self.write_json_at(&self.series_dir.join(glossary_file_name(language)), &entries)
    }

    /// Renders the glossary for a language to CSV next to the sidecar,
    /// returning the CSV path.
    pub fn export_glossary_csv(&self, language: Language) -> Result<PathBuf, ArtifactError> {
        let entries = self.read_glossary(language)?;
        let path = self.series_dir.join(format!("glossary_{language}.csv"));
        fs::write(&path, to_csv(&entries)).map_err(|e| ArtifactError::io(&path, e))?;
        Ok(path)
    }

    // ------------------------------------------------------------------
    // JSON IO

    fn read_json_at<T: DeserializeOwned>(&self, path: &Path) -> Result<T, ArtifactError> {
        let bytes = fs::read(path).map_err(|e| ArtifactError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| ArtifactError::json(path, e))
    }

    /// Pretty-printed atomic write: temp file in the same directory, then
    /// rename over the target.
    fn write_json_at<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), ArtifactError> {
        let mut bytes =
            serde_json::to_vec_pretty(value).map_err(|e| ArtifactError::json(path, e))?;
        bytes.push(b'\n');
        let tmp = tmp_path(path);
        fs::write(&tmp, &bytes).map_err(|e| ArtifactError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| ArtifactError::io(path, e))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Parses `episode_NNN.json` file names, returning the episode number.
#[must_use]
pub fn episode_number_from_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("episode_")?.strip_suffix(".json")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Episode record files in a directory, sorted by episode number.
fn episode_files(dir: &Path) -> Vec<(u32, PathBuf)> {
    let mut found = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return found;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(number) = episode_number_from_name(&name) {
            found.push((number, entry.path()));
        }
    }
    found.sort_by_key(|(number, _)| *number);
    found
}

/// Per-episode chunk directories of the synthesis stage, sorted by name.
fn episode_chunk_dirs(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return found;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("episode_")
            && entry.path().is_dir()
            && entry.path().join(CHUNK_MANIFEST_FILE).is_file()
        {
            found.push(entry.path());
        }
    }
    found.sort();
    found
}

/// Final mixed audio files, sorted by name.
fn final_audio_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return found;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("episode_") && name.ends_with("_final.mp3") {
            found.push(entry.path());
        }
    }
    found.sort();
    found
}
