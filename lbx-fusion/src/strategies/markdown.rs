// Markdown Strategy - Rendered Text Extraction
//
// Parses the markdown rendering of the page: pipe tables first, numbered
// lines as a fallback. Tables score 75 base confidence, lines 65.

use super::parse::{self, parse_money, parse_row_cells, parse_text_line, ParsedRow};
use super::Strategy;
use crate::capture::PageCapture;
use crate::error::ExtractionResult;
use crate::types::{PrizeEntry, SourceKind, StrategyResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::debug;

const TABLE_CONFIDENCE: f64 = 75.0;
const LINE_CONFIDENCE: f64 = 65.0;

static PRIZE_POOL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:total\s+prize(?:\s+pool)?|prize\s+pool)\s*[:\-]?\s*([$€£]?\s?[\d,]+(?:\.\d+)?\s?[km]?)")
        .expect("valid prize pool regex")
});

#[derive(Debug, Default)]
pub struct MarkdownStrategy;

impl MarkdownStrategy {
    pub fn new() -> Self {
        Self
    }

    fn table_rows(markdown: &str) -> Vec<Vec<String>> {
        markdown
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('|'))
            // Separator rows: |---|:---:|
            .filter(|line| !line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ')))
            .map(|line| {
                line.trim_matches('|')
                    .split('|')
                    .map(|cell| cell.trim().to_string())
                    .collect::<Vec<_>>()
            })
            // Header rows carry no digits
            .filter(|cells| cells.iter().any(|c| c.chars().any(|ch| ch.is_ascii_digit())))
            .collect()
    }

    fn parse_tables(capture: &PageCapture) -> Vec<ParsedRow> {
        let column_order = capture.hints.column_order;
        Self::table_rows(&capture.markdown)
            .iter()
            .enumerate()
            .filter_map(|(i, cells)| {
                parse_row_cells(cells, column_order, SourceKind::Markdown, i as u32 + 1)
            })
            .collect()
    }

    fn parse_lines(capture: &PageCapture) -> Vec<ParsedRow> {
        let column_order = capture.hints.column_order;
        capture
            .markdown
            .lines()
            .filter(|line| !line.trim_start().starts_with('|'))
            .filter_map(|line| parse_text_line(line, column_order, SourceKind::Markdown, 0))
            // Free text only counts when the line itself starts with a rank
            .filter(|row| row.explicit_rank)
            .collect()
    }

    fn prize_pool(markdown: &str) -> Option<f64> {
        PRIZE_POOL_RE
            .captures(markdown)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_money(m.as_str()))
            .filter(|v| *v > 0.0)
    }
}

#[async_trait]
impl Strategy for MarkdownStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::Markdown
    }

    fn can_extract(&self, capture: &PageCapture) -> bool {
        capture.markdown.chars().any(|c| c.is_ascii_digit())
    }

    async fn extract(&self, capture: &PageCapture) -> ExtractionResult<Option<StrategyResult>> {
        let table = Self::parse_tables(capture);
        let lines = Self::parse_lines(capture);

        let (rows, base, format) = if table.len() >= lines.len() {
            (table, TABLE_CONFIDENCE, "table")
        } else {
            (lines, LINE_CONFIDENCE, "lines")
        };

        if rows.is_empty() {
            debug!("No leaderboard rows in markdown");
            return Ok(None);
        }

        let entries = parse::sanitize_entries(rows.into_iter().map(|r| r.entry).collect());
        let prizes = entries
            .iter()
            .filter(|e| e.prize > 0.0)
            .map(|e| PrizeEntry {
                rank: e.rank,
                prize: e.prize,
            })
            .collect();
        let confidence = parse::score_confidence(base, &entries);

        let mut result = StrategyResult::new(entries, confidence)
            .with_prizes(prizes)
            .with_total_prize_pool(Self::prize_pool(&capture.markdown));
        result.metadata.insert("format".to_string(), json!(format));

        debug!(
            format,
            entries = result.entries.len(),
            confidence = result.confidence,
            "Markdown extraction complete"
        );
        Ok(Some(result))
    }
}
