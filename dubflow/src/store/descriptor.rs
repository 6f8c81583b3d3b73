//! Artifact descriptors: explicit presence, completeness and schema checks.

use crate::core::{Language, StageId};
use serde::{Deserialize, Serialize};

/// Schema version this engine writes into artifact markers.
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the marker file the store drops into every stage directory it
/// writes. Directories without a marker are read as the current version.
pub const MARKER_FILE: &str = ".artifact.json";

/// Contents of the marker file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMarker {
    /// Schema version of the records in the directory.
    pub schema_version: u32,
    /// ISO timestamp of the seal that wrote this marker.
    pub updated_at: String,
    /// Number of artifact files the sealing stage produced. A directory
    /// whose live count disagrees is treated as incomplete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_files: Option<usize>,
}

/// The result of probing one `(stage, language)` artifact.
///
/// Descriptors are computed by the store and cached until the cell is
/// written again. Planning and dependency checks go through
/// [`ArtifactDescriptor::is_satisfying`] only; nothing else in the engine
/// looks at the filesystem to make a skip decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// The probed stage.
    pub stage: StageId,
    /// The probed language cell, `None` for series-scoped stages.
    pub language: Option<Language>,
    /// Whether anything exists at the artifact location.
    pub present: bool,
    /// Whether the stage's completion criterion holds.
    pub complete: bool,
    /// Schema version found on disk.
    pub schema_version: u32,
    /// Number of artifact files found (excluding the marker).
    pub file_count: usize,
}

impl ArtifactDescriptor {
    /// A descriptor for a location with nothing at it.
    #[must_use]
    pub fn absent(stage: StageId, language: Option<Language>) -> Self {
        Self {
            stage,
            language,
            present: false,
            complete: false,
            schema_version: SCHEMA_VERSION,
            file_count: 0,
        }
    }

    /// Whether this artifact satisfies a dependency on its stage: it
    /// exists, is complete, and was written with a compatible schema.
    #[must_use]
    pub fn is_satisfying(&self) -> bool {
        self.present && self.complete && self.schema_version == SCHEMA_VERSION
    }
}
