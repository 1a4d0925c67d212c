// Geometric Strategy - Layout-Based Row Reconstruction
//
// For leaderboards rendered as cards or absolutely positioned divs: visible
// text boxes are clustered into rows by vertical centre, ordered left to
// right, then parsed like table cells. 68 base confidence.

use super::parse::{parse_row_cells, sanitize_entries, score_confidence};
use super::Strategy;
use crate::capture::{PageCapture, TextBox};
use crate::error::{ExtractionError, ExtractionResult};
use crate::types::{SourceKind, StrategyResult};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

const BASE_CONFIDENCE: f64 = 68.0;

/// Smallest vertical tolerance when grouping boxes into a row (px)
const MIN_ROW_TOLERANCE: f64 = 4.0;

#[derive(Debug, Default)]
pub struct GeometricStrategy;

impl GeometricStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Row tolerance: half the median box height
    fn row_tolerance(boxes: &[TextBox]) -> f64 {
        let mut heights: Vec<f64> = boxes
            .iter()
            .map(|b| b.height)
            .filter(|h| h.is_finite() && *h > 0.0)
            .collect();
        if heights.is_empty() {
            return MIN_ROW_TOLERANCE;
        }
        heights.sort_by(|a, b| a.total_cmp(b));
        (heights[heights.len() / 2] / 2.0).max(MIN_ROW_TOLERANCE)
    }

    /// Cluster boxes into rows of cell texts, top to bottom
    pub fn cluster_rows(boxes: &[TextBox]) -> Vec<Vec<String>> {
        let tolerance = Self::row_tolerance(boxes);
        let mut sorted: Vec<&TextBox> = boxes
            .iter()
            .filter(|b| !b.text.trim().is_empty() && b.center_y().is_finite() && b.x.is_finite())
            .collect();
        sorted.sort_by(|a, b| a.center_y().total_cmp(&b.center_y()));

        let mut rows: Vec<Vec<&TextBox>> = Vec::new();
        for text_box in sorted {
            let joins_last = rows.last().is_some_and(|row| {
                let mean = row.iter().map(|b| b.center_y()).sum::<f64>() / row.len() as f64;
                (text_box.center_y() - mean).abs() <= tolerance
            });
            match rows.last_mut() {
                Some(row) if joins_last => row.push(text_box),
                _ => rows.push(vec![text_box]),
            }
        }

        rows.into_iter()
            .map(|mut row| {
                row.sort_by(|a, b| a.x.total_cmp(&b.x));
                row.into_iter().map(|b| b.text.trim().to_string()).collect()
            })
            .collect()
    }
}

#[async_trait]
impl Strategy for GeometricStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::Geometric
    }

    fn can_extract(&self, capture: &PageCapture) -> bool {
        capture.page.is_some()
    }

    async fn extract(&self, capture: &PageCapture) -> ExtractionResult<Option<StrategyResult>> {
        let page = capture
            .page
            .as_ref()
            .ok_or_else(|| ExtractionError::NotAvailable("live page handle".to_string()))?;
        let boxes = page.text_boxes().await?;
        let rows = Self::cluster_rows(&boxes);

        let parsed: Vec<_> = rows
            .iter()
            .filter(|cells| cells.iter().any(|c| c.chars().any(|ch| ch.is_ascii_digit())))
            .filter_map(|cells| parse_row_cells(cells, capture.hints.column_order, SourceKind::Geometric, 0))
            .filter(|row| row.entry.wager > 0.0 || row.explicit_rank)
            .collect();
        if parsed.is_empty() {
            debug!(boxes = boxes.len(), rows = rows.len(), "No leaderboard rows in layout");
            return Ok(None);
        }

        let entries = sanitize_entries(parsed.into_iter().map(|r| r.entry).collect());
        let confidence = score_confidence(BASE_CONFIDENCE, &entries);

        let mut result = StrategyResult::new(entries, confidence);
        result.metadata.insert("rowCount".to_string(), json!(rows.len()));
        result.metadata.insert("boxCount".to_string(), json!(boxes.len()));

        debug!(
            entries = result.entries.len(),
            confidence = result.confidence,
            "Geometric extraction complete"
        );
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PageHandle;
    use std::sync::Arc;

    fn text_box(text: &str, x: f64, y: f64) -> TextBox {
        TextBox {
            text: text.to_string(),
            x,
            y,
            width: 80.0,
            height: 20.0,
        }
    }

    struct LayoutPage(Vec<TextBox>);

    #[async_trait]
    impl PageHandle for LayoutPage {
        async fn table_rows(&self) -> ExtractionResult<Vec<Vec<String>>> {
            Ok(Vec::new())
        }

        async fn text_boxes(&self) -> ExtractionResult<Vec<TextBox>> {
            Ok(self.0.clone())
        }
    }

    fn layout() -> Vec<TextBox> {
        vec![
            // Out of order on purpose, with slight vertical jitter
            text_box("$9,000", 300.0, 142.0),
            text_box("2", 10.0, 140.0),
            text_box("bob", 100.0, 139.0),
            text_box("1", 10.0, 100.0),
            text_box("alice", 100.0, 101.0),
            text_box("$12,000", 300.0, 99.0),
            text_box("3", 10.0, 180.0),
            text_box("carol", 100.0, 180.0),
            text_box("$4,500", 300.0, 181.0),
            text_box("Leaderboard", 10.0, 20.0),
        ]
    }

    #[test]
    fn test_cluster_rows() {
        let rows = GeometricStrategy::cluster_rows(&layout());
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], vec!["Leaderboard"]);
        assert_eq!(rows[1], vec!["1", "alice", "$12,000"]);
        assert_eq!(rows[2], vec!["2", "bob", "$9,000"]);
    }

    #[tokio::test]
    async fn test_extract_from_layout() {
        let capture = PageCapture::default().with_page(Arc::new(LayoutPage(layout())));
        let strategy = GeometricStrategy::new();
        assert!(strategy.can_extract(&capture));

        let result = strategy.extract(&capture).await.unwrap().unwrap();
        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.entries[2].username, "carol");
        assert_eq!(result.entries[2].wager, 4_500.0);
        assert_eq!(result.confidence, BASE_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_requires_page() {
        let strategy = GeometricStrategy::new();
        assert!(!strategy.can_extract(&PageCapture::default()));
        assert!(matches!(
            strategy.extract(&PageCapture::default()).await,
            Err(ExtractionError::NotAvailable(_))
        ));
    }
}
