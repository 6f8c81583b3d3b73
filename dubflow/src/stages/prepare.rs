//! Stage 0: source ingestion and series folder preparation.

use super::{StageContext, StageReport, StageUnit};
use crate::core::{clean_series_name, detect_source_language, SeriesMetadata, StageId};
use crate::errors::StageError;
use async_trait::async_trait;

/// Ingests the source document, derives series metadata and creates the
/// series folder skeleton.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareStage;

#[async_trait]
impl StageUnit for PrepareStage {
    fn name(&self) -> &str {
        "prepare"
    }

    fn id(&self) -> StageId {
        StageId::Prepare
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let unit = ctx.source_unit();

        let series_name = clean_series_name(&unit.file_stem);
        ctx.log(format!("series: {series_name} ({}/{})", unit.territory, unit.publisher));

        let text = ctx.services().extractor.extract(&unit.path).await?;
        report.api_calls += 1;
        ctx.log(format!(
            "extracted {} characters from {}",
            text.chars().count(),
            unit.path.display()
        ));
        if text.trim().is_empty() {
            return Err(StageError::InvalidInput(format!(
                "source file {} contains no text",
                unit.path.display()
            )));
        }

        let source_language = detect_source_language(&text);
        ctx.log(format!("detected source language: {source_language}"));

        let metadata = SeriesMetadata::new(series_name, unit, source_language);
        ctx.store().write_metadata(&metadata)?;
        ctx.store().seal(StageId::Prepare, None, None)?;
        report.produced_files = 1;
        report.note(format!(
            "prepared series '{}' ({} source)",
            metadata.series_name, source_language
        ));
        Ok(report)
    }
}
