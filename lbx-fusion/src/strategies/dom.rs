// DOM Strategy - Table Row Extraction
//
// Rows come from the live page handle when one is attached, otherwise from
// `<tr>`/`<td>` markup in the captured HTML. Live rows score 80 base
// confidence, static HTML 72.

use super::parse::{parse_row_cells, sanitize_entries, score_confidence, ParsedRow};
use super::Strategy;
use crate::capture::PageCapture;
use crate::error::ExtractionResult;
use crate::types::{PodiumLayout, PrizeEntry, SourceKind, StrategyResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::debug;

const PAGE_CONFIDENCE: f64 = 80.0;
const HTML_CONFIDENCE: f64 = 72.0;

static ROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("valid row regex"));
static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<t[dh]\b[^>]*>(.*?)</t[dh]>").expect("valid cell regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").expect("valid noise regex")
});

/// Rank order of the first three DOM rows under a center-first podium
const CENTER_FIRST_RANKS: [u32; 3] = [2, 1, 3];

#[derive(Debug, Default)]
pub struct DomStrategy;

impl DomStrategy {
    pub fn new() -> Self {
        Self
    }

    fn cell_text(fragment: &str) -> String {
        let text = TAG_RE.replace_all(fragment, " ");
        text.replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&#36;", "$")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .trim()
            .to_string()
    }

    /// Cell texts of every `<tr>` in static HTML
    pub fn html_rows(html: &str) -> Vec<Vec<String>> {
        let cleaned = NOISE_RE.replace_all(html, "");
        ROW_RE
            .captures_iter(&cleaned)
            .filter_map(|row| row.get(1))
            .map(|row| {
                CELL_RE
                    .captures_iter(row.as_str())
                    .filter_map(|cell| cell.get(1))
                    .map(|cell| Self::cell_text(cell.as_str()))
                    .collect::<Vec<_>>()
            })
            .filter(|cells| !cells.is_empty())
            .collect()
    }

    fn parse_rows(rows: &[Vec<String>], capture: &PageCapture) -> Vec<ParsedRow> {
        let mut parsed: Vec<ParsedRow> = rows
            .iter()
            .filter(|cells| cells.iter().any(|c| c.chars().any(|ch| ch.is_ascii_digit())))
            .filter_map(|cells| parse_row_cells(cells, capture.hints.column_order, SourceKind::Dom, 0))
            .collect();

        // Positional ranks for rows without their own
        for (i, row) in parsed.iter_mut().enumerate() {
            if !row.explicit_rank {
                row.entry.rank = i as u32 + 1;
            }
        }

        if capture.hints.podium_layout == Some(PodiumLayout::CenterFirst)
            && parsed.len() >= 3
            && parsed[..3].iter().all(|r| !r.explicit_rank)
        {
            for (row, rank) in parsed.iter_mut().zip(CENTER_FIRST_RANKS) {
                row.entry.rank = rank;
            }
        }
        parsed
    }
}

#[async_trait]
impl Strategy for DomStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::Dom
    }

    fn can_extract(&self, capture: &PageCapture) -> bool {
        capture.page.is_some() || capture.html.to_ascii_lowercase().contains("<tr")
    }

    async fn extract(&self, capture: &PageCapture) -> ExtractionResult<Option<StrategyResult>> {
        let (rows, base, origin) = match &capture.page {
            Some(page) => (page.table_rows().await?, PAGE_CONFIDENCE, "page"),
            None => (Self::html_rows(&capture.html), HTML_CONFIDENCE, "html"),
        };

        let parsed = Self::parse_rows(&rows, capture);
        if parsed.is_empty() {
            debug!(origin, rows = rows.len(), "No leaderboard rows in DOM");
            return Ok(None);
        }

        let entries = sanitize_entries(parsed.into_iter().map(|r| r.entry).collect());
        let prizes = entries
            .iter()
            .filter(|e| e.prize > 0.0)
            .map(|e| PrizeEntry {
                rank: e.rank,
                prize: e.prize,
            })
            .collect();
        let confidence = score_confidence(base, &entries);

        let mut result = StrategyResult::new(entries, confidence).with_prizes(prizes);
        result.metadata.insert("origin".to_string(), json!(origin));

        debug!(
            origin,
            entries = result.entries.len(),
            confidence = result.confidence,
            "DOM extraction complete"
        );
        Ok(Some(result))
    }
}
