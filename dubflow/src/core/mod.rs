//! Core domain model types for dubflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage identifiers, ordering and the dependency graph
//! - Target languages and source-language detection
//! - Source units, series metadata and episode records

mod episode;
mod graph;
mod language;
mod source;
mod stage_id;

pub use episode::EpisodeRecord;
pub use graph::{GraphError, StageGraph};
pub use language::{detect_source_language, Language, ParseLanguageError};
pub use source::{clean_series_name, SeriesMetadata, SourceUnit, UNKNOWN_SEGMENT};
pub use stage_id::{ParseStageIdError, StageId, StageScope};
