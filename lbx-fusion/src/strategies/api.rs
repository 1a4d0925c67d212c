// API Strategy - Captured JSON Response Extraction
//
// Reads leaderboard rows straight out of the network responses the page
// made. Most reliable source when present: 85 base confidence.

use super::json_search::{self, RawEntry};
use super::parse::{ranks_sequential, score_confidence};
use super::Strategy;
use crate::capture::PageCapture;
use crate::error::ExtractionResult;
use crate::types::{LeaderboardEntry, PrizeEntry, SourceKind, StrategyResult};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

const BASE_CONFIDENCE: f64 = 85.0;

#[derive(Debug, Default)]
pub struct ApiStrategy;

impl ApiStrategy {
    pub fn new() -> Self {
        Self
    }

    fn to_entries(rows: Vec<RawEntry>) -> Vec<LeaderboardEntry> {
        rows.into_iter()
            .enumerate()
            .map(|(i, row)| {
                LeaderboardEntry::new(
                    row.rank.unwrap_or(i as u32 + 1),
                    row.username,
                    row.wager,
                    row.prize,
                    SourceKind::Api,
                )
            })
            .collect()
    }
}

#[async_trait]
impl Strategy for ApiStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    fn can_extract(&self, capture: &PageCapture) -> bool {
        !capture.api_responses.is_empty()
    }

    async fn extract(&self, capture: &PageCapture) -> ExtractionResult<Option<StrategyResult>> {
        let mappings = &capture.hints.field_mappings;

        // Pick the response yielding the most rows
        let best = capture
            .api_responses
            .iter()
            .map(|response| (response, json_search::find_entries(&response.body, mappings)))
            .filter(|(_, rows)| !rows.is_empty())
            .fold(None, |best: Option<(_, Vec<RawEntry>)>, candidate| match best {
                Some(current) if current.1.len() >= candidate.1.len() => Some(current),
                _ => Some(candidate),
            });

        let Some((response, rows)) = best else {
            debug!(
                responses = capture.api_responses.len(),
                "No leaderboard-shaped array in captured responses"
            );
            return Ok(None);
        };

        let explicit_ranks = rows.iter().all(|r| r.rank.is_some());
        let entries = Self::to_entries(rows);

        let mut prizes: Vec<PrizeEntry> = json_search::find_prize_table(&response.body)
            .into_iter()
            .map(|(rank, prize)| PrizeEntry { rank, prize })
            .collect();
        if prizes.is_empty() {
            prizes = entries
                .iter()
                .filter(|e| e.prize > 0.0)
                .map(|e| PrizeEntry {
                    rank: e.rank,
                    prize: e.prize,
                })
                .collect();
        }

        let mut confidence = score_confidence(BASE_CONFIDENCE, &entries);
        if explicit_ranks && !ranks_sequential(&entries) {
            // Explicit but gapped ranks from an API usually mean a filtered view
            confidence -= 5.0;
        }

        let mut result = StrategyResult::new(entries, confidence.clamp(0.0, 100.0))
            .with_prizes(prizes)
            .with_total_prize_pool(json_search::find_prize_pool(&response.body))
            .with_api_url(response.url.clone());
        result
            .metadata
            .insert("responseCount".to_string(), json!(capture.api_responses.len()));
        result
            .metadata
            .insert("explicitRanks".to_string(), json!(explicit_ranks));

        debug!(
            url = %response.url,
            entries = result.entries.len(),
            confidence = result.confidence,
            "API extraction complete"
        );
        Ok(Some(result))
    }
}
