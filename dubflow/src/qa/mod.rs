//! QA fragments and the consolidated pipeline report.

mod aggregate;
mod fragments;

pub use aggregate::{QaAggregator, QaSection, QaSummary, SectionVerdict, QA_SUMMARY_JSON, QA_SUMMARY_MD};
pub use fragments::{
    ChunkCheck, EpisodeChecks, EpisodeIssues, IssueKind, QaIssue, Severity,
    TranslationQaFragment, TtsQaFragment,
};
