// OCR Strategy - Screenshot Text Extraction
//
// Last resort: recognises the screenshot and parses numbered lines. Slow
// and noisy, so it is scheduled after the join barrier and skipped when a
// concurrent strategy already produced a confident result. 58 base
// confidence.

use super::parse::{parse_text_line, sanitize_entries, score_confidence};
use super::Strategy;
use crate::capture::{OcrEngine, PageCapture};
use crate::error::{ExtractionError, ExtractionResult};
use crate::priority::ExecutionHint;
use crate::types::{SourceKind, StrategyResult};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const BASE_CONFIDENCE: f64 = 58.0;

pub struct OcrStrategy {
    engine: Arc<dyn OcrEngine>,
}

impl OcrStrategy {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Strategy for OcrStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::Ocr
    }

    fn can_extract(&self, capture: &PageCapture) -> bool {
        capture.screenshot.as_ref().is_some_and(|s| !s.is_empty())
    }

    async fn extract(&self, capture: &PageCapture) -> ExtractionResult<Option<StrategyResult>> {
        let image = capture
            .screenshot
            .as_ref()
            .ok_or_else(|| ExtractionError::NotAvailable("screenshot".to_string()))?;
        let text = self.engine.recognize(image).await?;

        let rows: Vec<_> = text
            .lines()
            .filter_map(|line| parse_text_line(line, capture.hints.column_order, SourceKind::Ocr, 0))
            .filter(|row| row.explicit_rank)
            .collect();
        if rows.is_empty() {
            debug!(chars = text.len(), "No leaderboard lines in OCR text");
            return Ok(None);
        }

        let entries = sanitize_entries(rows.into_iter().map(|r| r.entry).collect());
        let confidence = score_confidence(BASE_CONFIDENCE, &entries);

        let mut result = StrategyResult::new(entries, confidence);
        result
            .metadata
            .insert("textLength".to_string(), json!(text.chars().count()));

        debug!(
            entries = result.entries.len(),
            confidence = result.confidence,
            "OCR extraction complete"
        );
        Ok(Some(result))
    }

    fn execution_hint(&self) -> ExecutionHint {
        ExecutionHint::AfterBarrier
    }
}
