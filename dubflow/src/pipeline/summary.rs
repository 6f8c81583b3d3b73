//! Per-cell run records and the final run summary.

use crate::core::{Language, StageId};
use crate::pipeline::plan::PlanAction;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of trailing log lines captured into a failed cell's record.
pub const LOG_TAIL_LINES: usize = 10;

/// How one plan entry ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellOutcome {
    /// The stage unit ran and returned success.
    Succeeded,
    /// The stage unit ran and returned an error.
    Failed {
        /// Display form of the unit's error.
        error: String,
    },
    /// A required predecessor artifact was not satisfying; the unit was
    /// never invoked.
    Blocked {
        /// The unsatisfied predecessor.
        missing: StageId,
    },
    /// Skipped at the operator's request.
    SkippedRequested,
    /// Skipped because a satisfying artifact already existed.
    SkippedSatisfied,
}

impl CellOutcome {
    /// True for outcomes that count as failures under `stop_on_error`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Blocked { .. })
    }

    /// Short column label for report tables.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "ok",
            Self::Failed { .. } => "failed",
            Self::Blocked { .. } => "blocked",
            Self::SkippedRequested => "skipped",
            Self::SkippedSatisfied => "reused",
        }
    }
}

/// One finalized record per plan entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRunRecord {
    /// The stage.
    pub stage: StageId,
    /// The language cell, `None` for series-scoped stages.
    pub language: Option<Language>,
    /// The planned action this record settles.
    pub action: PlanAction,
    /// How the cell ended.
    pub outcome: CellOutcome,
    /// ISO start timestamp.
    pub started_at: String,
    /// ISO end timestamp.
    pub finished_at: String,
    /// Wall-clock duration of the cell.
    pub duration_ms: u64,
    /// Rate-limit wait spent before this cell.
    pub api_wait_ms: u64,
    /// Service calls the unit reported making.
    pub api_calls: u64,
    /// Last lines of the cell log for a failed cell, or the dependency
    /// message for a blocked one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_tail: Vec<String>,
}

impl StageRunRecord {
    /// Label for the cell column of report tables.
    #[must_use]
    pub fn cell_label(&self) -> String {
        self.language
            .map_or_else(|| "series".to_string(), |l| l.to_string())
    }
}

/// The boundary at which a `stop_on_error` run halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltBoundary {
    /// The failing stage.
    pub stage: StageId,
    /// The failing language cell.
    pub language: Option<Language>,
}

/// Counts of settled records by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    /// Cells that ran and succeeded.
    pub succeeded: usize,
    /// Cells that ran and failed.
    pub failed: usize,
    /// Cells blocked on an unsatisfied predecessor.
    pub blocked: usize,
    /// Cells skipped at the operator's request.
    pub skipped_requested: usize,
    /// Cells skipped on a satisfying artifact.
    pub skipped_satisfied: usize,
}

/// The outcome of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// ISO start timestamp.
    pub started_at: String,
    /// ISO end timestamp.
    pub finished_at: String,
    /// Wall-clock duration of the whole run.
    pub duration_ms: u64,
    /// One record per plan entry, in plan order, up to the halt boundary.
    pub records: Vec<StageRunRecord>,
    /// Total service calls reported by the units.
    pub api_calls: u64,
    /// Total rate-limit wait across the run.
    pub api_wait_ms: u64,
    /// Set when `stop_on_error` halted the run after a failing cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<HaltBoundary>,
}

impl RunSummary {
    /// True when no cell failed or was blocked.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.records.iter().any(|r| r.outcome.is_failure())
    }

    /// Counts records by outcome.
    #[must_use]
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for record in &self.records {
            match record.outcome {
                CellOutcome::Succeeded => counts.succeeded += 1,
                CellOutcome::Failed { .. } => counts.failed += 1,
                CellOutcome::Blocked { .. } => counts.blocked += 1,
                CellOutcome::SkippedRequested => counts.skipped_requested += 1,
                CellOutcome::SkippedSatisfied => counts.skipped_satisfied += 1,
            }
        }
        counts
    }

    /// The records that ended in failure, plan order.
    pub fn failed_cells(&self) -> impl Iterator<Item = &StageRunRecord> {
        self.records.iter().filter(|r| r.outcome.is_failure())
    }

    /// Looks up the record for one cell.
    #[must_use]
    pub fn record(&self, stage: StageId, language: Option<Language>) -> Option<&StageRunRecord> {
        self.records
            .iter()
            .find(|r| r.stage == stage && r.language == language)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<6} {:<10} {:<16} {:<8} {:>9}",
            "stage", "cell", "action", "outcome", "duration"
        )?;
        for record in &self.records {
            writeln!(
                f,
                "{:<6} {:<10} {:<16} {:<8} {:>8.1}s",
                record.stage.to_string(),
                record.cell_label(),
                record.action.to_string(),
                record.outcome.label(),
                record.duration_ms as f64 / 1000.0,
            )?;
        }
        let counts = self.counts();
        writeln!(
            f,
            "run {} finished in {:.1}s: {} ok, {} failed, {} blocked, {} skipped, {} reused",
            self.run_id,
            self.duration_ms as f64 / 1000.0,
            counts.succeeded,
            counts.failed,
            counts.blocked,
            counts.skipped_requested,
            counts.skipped_satisfied,
        )?;
        writeln!(
            f,
            "api calls {}, api wait {:.1}s",
            self.api_calls,
            self.api_wait_ms as f64 / 1000.0,
        )?;
        if let Some(halt) = &self.halted_at {
            let cell = halt
                .language
                .map_or_else(|| "series".to_string(), |l| l.to_string());
            writeln!(f, "halted on error at stage {} ({cell})", halt.stage)?;
        }
        Ok(())
    }
}

/// Captures the last [`LOG_TAIL_LINES`] lines of a cell log.
#[must_use]
pub fn log_tail(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].iter().map(|l| (*l).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(stage: StageId, outcome: CellOutcome) -> StageRunRecord {
        StageRunRecord {
            stage,
            language: Some(Language::Korean),
            action: PlanAction::Run,
            outcome,
            started_at: "2026-01-01T00:00:00.000000+00:00".to_string(),
            finished_at: "2026-01-01T00:00:01.000000+00:00".to_string(),
            duration_ms: 1000,
            api_wait_ms: 0,
            api_calls: 0,
            log_tail: Vec::new(),
        }
    }

    fn summary(records: Vec<StageRunRecord>) -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at: "2026-01-01T00:00:00.000000+00:00".to_string(),
            finished_at: "2026-01-01T00:01:00.000000+00:00".to_string(),
            duration_ms: 60_000,
            records,
            api_calls: 3,
            api_wait_ms: 12_000,
            halted_at: None,
        }
    }

    #[test]
    fn test_success_requires_no_failed_or_blocked_cells() {
        let ok = summary(vec![
            record(StageId::Prepare, CellOutcome::Succeeded),
            record(StageId::Split, CellOutcome::SkippedSatisfied),
        ]);
        assert!(ok.success());

        let failed = summary(vec![record(
            StageId::Translate,
            CellOutcome::Failed { error: "boom".to_string() },
        )]);
        assert!(!failed.success());

        let blocked = summary(vec![record(
            StageId::TtsFormat,
            CellOutcome::Blocked { missing: StageId::Translate },
        )]);
        assert!(!blocked.success());
    }

    #[test]
    fn test_counts_by_outcome() {
        let s = summary(vec![
            record(StageId::Prepare, CellOutcome::Succeeded),
            record(StageId::Split, CellOutcome::Succeeded),
            record(StageId::Translate, CellOutcome::Failed { error: "x".to_string() }),
            record(StageId::TtsFormat, CellOutcome::Blocked { missing: StageId::Translate }),
            record(StageId::EmotionTagging, CellOutcome::SkippedRequested),
            record(StageId::AudioSetup, CellOutcome::SkippedSatisfied),
        ]);
        let counts = s.counts();
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.blocked, 1);
        assert_eq!(counts.skipped_requested, 1);
        assert_eq!(counts.skipped_satisfied, 1);
    }

    #[test]
    fn test_log_tail_keeps_last_ten_lines() {
        let text: String = (1..=14).map(|n| format!("line {n}\n")).collect();
        let tail = log_tail(&text);
        assert_eq!(tail.len(), LOG_TAIL_LINES);
        assert_eq!(tail[0], "line 5");
        assert_eq!(tail[9], "line 14");
    }

    #[test]
    fn test_log_tail_short_text_is_kept_whole() {
        assert_eq!(log_tail("only\ntwo"), vec!["only", "two"]);
        assert!(log_tail("").is_empty());
    }

    #[test]
    fn test_display_mentions_halt_boundary() {
        let mut s = summary(vec![record(
            StageId::Translate,
            CellOutcome::Failed { error: "x".to_string() },
        )]);
        s.halted_at = Some(HaltBoundary {
            stage: StageId::Translate,
            language: Some(Language::Korean),
        });
        let rendered = s.to_string();
        assert!(rendered.contains("halted on error at stage 2 (korean)"));
        assert!(rendered.contains("failed"));
    }

    #[test]
    fn test_record_lookup_by_cell() {
        let s = summary(vec![record(StageId::Prepare, CellOutcome::Succeeded)]);
        assert!(s.record(StageId::Prepare, Some(Language::Korean)).is_some());
        assert!(s.record(StageId::Prepare, None).is_none());
    }

    #[test]
    fn test_summary_serializes_round_trip() {
        let s = summary(vec![record(
            StageId::Split,
            CellOutcome::Failed { error: "no episodes".to_string() },
        )]);
        let json = serde_json::to_string(&s).unwrap();
        let back: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
