//! Local text extraction for plain-text sources.

use super::TextExtractor;
use crate::errors::StageError;
use async_trait::async_trait;
use std::path::Path;

const PLAIN_EXTENSIONS: [&str; 3] = ["txt", "md", "text"];

/// Reads UTF-8 plain-text sources directly from disk.
///
/// Binary document formats (docx, epub, pdf) need a document conversion
/// engine behind the [`TextExtractor`] seam; this implementation refuses
/// them instead of guessing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, StageError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !PLAIN_EXTENSIONS.contains(&extension.as_str()) {
            return Err(StageError::Service {
                service: "text_extractor".to_string(),
                message: format!(
                    "unsupported source format '{extension}'; connect a document conversion engine"
                ),
            });
        }
        let text = tokio::fs::read_to_string(path).await?;
        Ok(text)
    }
}
