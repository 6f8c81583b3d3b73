//! Merge-back of edited review documents into canonical records.
//!
//! Reconciliation is optimistic and all-or-nothing: the export's embedded
//! fingerprint must still match the store, every referenced canonical
//! record must exist and every block must parse before a single byte is
//! written. Canonical fields other than `content` and `title` ride through
//! untouched.

use crate::core::{Language, StageId};
use crate::errors::{ArtifactError, DubflowError, MalformedReviewError, StaleReviewError};
use crate::review::format::{
    self, episode_number_from_review_name, ParsedEpisode, ParsedHeader, MERGED_REVIEW_FILE,
};
use crate::store::ArtifactStore;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The reconciled stage.
    pub stage: StageId,
    /// The reconciled language cell.
    pub language: Option<Language>,
    /// Episode blocks found in the review input.
    pub examined: usize,
    /// Canonical records rewritten with edited content or title.
    pub changed: usize,
    /// Records whose review block carried no edits.
    pub unchanged: usize,
    /// Store fingerprint after the apply; pending exports of this cell made
    /// before a change are stale against it.
    pub fingerprint: String,
}

/// Applies edited review documents back onto the artifact store.
#[derive(Debug)]
pub struct ReviewReconciler<'a> {
    store: &'a ArtifactStore,
}

impl<'a> ReviewReconciler<'a> {
    /// Creates a reconciler over one series store.
    #[must_use]
    pub fn new(store: &'a ArtifactStore) -> Self {
        Self { store }
    }

    /// Reconciles a review input: the merged document itself, a review cell
    /// folder containing one, or an `episodes/` folder of per-episode files
    /// (whose header metadata comes from the sibling merged document).
    ///
    /// # Errors
    ///
    /// [`DubflowError::StaleReview`] when the canonical artifacts changed
    /// after the export; [`DubflowError::MalformedReview`] when the input
    /// cannot be parsed or references an episode with no canonical record.
    /// Neither writes anything.
    pub fn reconcile(&self, path: &Path) -> Result<ReconcileReport, DubflowError> {
        let (header, episodes) = self.load(path)?;
        let found = self
            .store
            .content_fingerprint(header.stage, header.language)?;
        if found != header.fingerprint {
            return Err(StaleReviewError {
                stage: header.stage,
                language: header.language,
                expected: header.fingerprint,
                found,
            }
            .into());
        }

        // Verify every referenced record before touching any of them.
        let mut pairs = Vec::with_capacity(episodes.len());
        for episode in episodes {
            let record =
                match self
                    .store
                    .read_episode(header.stage, header.language, episode.number)
                {
                    Ok(record) => record,
                    Err(ArtifactError::MissingEpisode { .. }) => {
                        return Err(MalformedReviewError::new(
                            path,
                            format!("episode {:03} has no canonical record", episode.number),
                        )
                        .into());
                    }
                    Err(e) => return Err(e.into()),
                };
            pairs.push((episode, record));
        }

        let examined = pairs.len();
        let mut changed = 0;
        for (episode, mut record) in pairs {
            let mut dirty = record.content != episode.content;
            record.content = episode.content;
            if !episode.title.is_empty() && record.title != episode.title {
                record.title = episode.title;
                dirty = true;
            }
            if dirty {
                self.store
                    .write_episode(header.stage, header.language, &record)?;
                changed += 1;
            }
        }

        let fingerprint = self
            .store
            .content_fingerprint(header.stage, header.language)?;
        info!(
            stage = %header.stage,
            language = ?header.language,
            examined,
            changed,
            "Review reconciled"
        );
        Ok(ReconcileReport {
            stage: header.stage,
            language: header.language,
            examined,
            changed,
            unchanged: examined - changed,
            fingerprint,
        })
    }

    fn load(&self, path: &Path) -> Result<(ParsedHeader, Vec<ParsedEpisode>), DubflowError> {
        if path.is_file() {
            let parsed = format::parse_merged(&read_text(path)?, path)?;
            return Ok((parsed.header, parsed.episodes));
        }
        let merged = path.join(MERGED_REVIEW_FILE);
        if merged.is_file() {
            let parsed = format::parse_merged(&read_text(&merged)?, &merged)?;
            return Ok((parsed.header, parsed.episodes));
        }

        let sibling = path
            .parent()
            .map(|parent| parent.join(MERGED_REVIEW_FILE))
            .filter(|p| p.is_file())
            .ok_or_else(|| {
                MalformedReviewError::new(
                    path,
                    format!("no {MERGED_REVIEW_FILE} in or beside the folder"),
                )
            })?;
        let header = format::parse_header(&read_text(&sibling)?, &sibling)?;
        let mut episodes = Vec::new();
        for (number, file) in episode_review_files(path)? {
            let parsed = format::parse_episode_file(&read_text(&file)?, &file)?;
            if parsed.number != number {
                return Err(MalformedReviewError::new(
                    &file,
                    format!(
                        "file is named episode {number:03} but its heading says {:03}",
                        parsed.number
                    ),
                )
                .into());
            }
            episodes.push(parsed);
        }
        if episodes.is_empty() {
            return Err(MalformedReviewError::new(path, "no episode review files found").into());
        }
        Ok((header, episodes))
    }
}

fn read_text(path: &Path) -> Result<String, ArtifactError> {
    fs::read_to_string(path).map_err(|e| ArtifactError::io(path, e))
}

/// Per-episode review files in a folder, sorted by episode number.
fn episode_review_files(dir: &Path) -> Result<Vec<(u32, PathBuf)>, ArtifactError> {
    let entries = fs::read_dir(dir).map_err(|e| ArtifactError::io(dir, e))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ArtifactError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(number) = episode_number_from_review_name(&name) {
            found.push((number, entry.path()));
        }
    }
    found.sort_by_key(|(number, _)| *number);
    Ok(found)
}
