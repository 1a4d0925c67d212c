// Prize Table Fusion
//
// The prize table is chosen as a whole (most complete table wins) rather
// than merged row by row. The total prize pool is propagated from whichever
// source knows it. Fused entries without a prize then take the table prize
// for their rank.

use super::merge::is_garbage_dom_prize;
use crate::priority::compare_priority;
use crate::types::{EntryField, FieldSource, FusedEntry, PrizeEntry, SourceKind, StrategyResult};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Winning prize table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusedPrizeTable {
    pub prizes: Vec<PrizeEntry>,
    pub source: Option<FieldSource>,
    pub total_prize_pool: Option<f64>,
}

impl FusedPrizeTable {
    pub fn prize_for(&self, rank: u32) -> Option<f64> {
        self.prizes.iter().find(|p| p.rank == rank).map(|p| p.prize)
    }
}

/// Valid, unique-by-rank prize rows of one source, sorted by rank
fn clean_table(source: SourceKind, prizes: &[PrizeEntry]) -> Vec<PrizeEntry> {
    let mut seen = HashSet::new();
    let mut table: Vec<PrizeEntry> = prizes
        .iter()
        .filter(|p| p.rank > 0 && p.prize.is_finite() && p.prize > 0.0)
        .filter(|p| !(source == SourceKind::Dom && is_garbage_dom_prize(p.rank, p.prize)))
        .filter(|p| seen.insert(p.rank))
        .copied()
        .collect();
    table.sort_by_key(|p| p.rank);
    table
}

/// Pick the most complete prize table; ties by confidence, then priority
pub fn fuse_prize_tables(results: &BTreeMap<SourceKind, StrategyResult>) -> FusedPrizeTable {
    let winner = results
        .iter()
        .map(|(kind, result)| (*kind, result.confidence, clean_table(*kind, &result.prizes)))
        .filter(|(_, _, table)| !table.is_empty())
        .max_by(|a, b| {
            a.2.len()
                .cmp(&b.2.len())
                .then_with(|| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                .then_with(|| compare_priority(a.0, b.0))
        });

    let winner_pool = winner
        .as_ref()
        .and_then(|(kind, _, _)| results.get(kind))
        .and_then(|r| r.total_prize_pool);
    let total_prize_pool = winner_pool
        .or_else(|| results.values().find_map(|r| r.total_prize_pool))
        .filter(|pool| pool.is_finite() && *pool > 0.0);

    match winner {
        Some((source, confidence, prizes)) => {
            debug!(source = %source, rows = prizes.len(), ?total_prize_pool, "Prize table selected");
            FusedPrizeTable {
                prizes,
                source: Some(FieldSource { source, confidence }),
                total_prize_pool,
            }
        }
        None => FusedPrizeTable {
            total_prize_pool,
            ..Default::default()
        },
    }
}

/// Fill zero prizes from the table; returns how many entries were filled
pub fn inject_prizes(entries: &mut [FusedEntry], table: &FusedPrizeTable) -> usize {
    let Some(source) = table.source else {
        return 0;
    };
    let mut injected = 0;
    for fused in entries.iter_mut().filter(|e| e.entry.prize == 0.0) {
        if let Some(prize) = table.prize_for(fused.entry.rank) {
            fused.entry.prize = prize;
            fused.fusion.prize_injected = true;
            fused.fusion.field_sources.insert(EntryField::Prize, source);
            injected += 1;
        }
    }
    injected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FusionProvenance, LeaderboardEntry, VerificationStatus};

    fn with_prizes(prizes: &[(u32, f64)], confidence: f64, pool: Option<f64>) -> StrategyResult {
        StrategyResult::new(Vec::new(), confidence)
            .with_prizes(prizes.iter().map(|(rank, prize)| PrizeEntry { rank: *rank, prize: *prize }).collect())
            .with_total_prize_pool(pool)
    }

    #[test]
    fn test_most_complete_table_wins_and_pool_propagates() {
        let results: BTreeMap<_, _> = [
            (SourceKind::Api, with_prizes(&[(1, 500.0)], 90.0, None)),
            (
                SourceKind::Markdown,
                with_prizes(&[(1, 500.0), (2, 250.0), (3, 100.0)], 70.0, None),
            ),
            (SourceKind::Ocr, with_prizes(&[], 60.0, Some(1000.0))),
        ]
        .into_iter()
        .collect();

        let table = fuse_prize_tables(&results);
        assert_eq!(table.prizes.len(), 3);
        assert_eq!(table.source.map(|s| s.source), Some(SourceKind::Markdown));
        assert_eq!(table.total_prize_pool, Some(1000.0));
    }

    #[test]
    fn test_dom_garbage_rows_not_counted() {
        let results: BTreeMap<_, _> = [
            (SourceKind::Dom, with_prizes(&[(1, 2.0), (2, 3.0), (3, 4.0)], 90.0, None)),
            (SourceKind::Markdown, with_prizes(&[(1, 500.0)], 70.0, None)),
        ]
        .into_iter()
        .collect();

        let table = fuse_prize_tables(&results);
        assert_eq!(table.prizes, vec![PrizeEntry { rank: 1, prize: 500.0 }]);
    }

    #[test]
    fn test_injection_marks_provenance() {
        let table = FusedPrizeTable {
            prizes: vec![PrizeEntry { rank: 1, prize: 500.0 }, PrizeEntry { rank: 2, prize: 250.0 }],
            source: Some(FieldSource { source: SourceKind::Api, confidence: 85.0 }),
            total_prize_pool: None,
        };
        let fused = |rank, prize| FusedEntry {
            entry: LeaderboardEntry::new(rank, "x", 10.0, prize, SourceKind::Dom),
            fusion: FusionProvenance {
                sources: vec![SourceKind::Dom],
                agreement_score: 0.0,
                verification_status: VerificationStatus::SingleSource,
                field_sources: BTreeMap::new(),
                prize_injected: false,
            },
        };
        let mut entries = vec![fused(1, 0.0), fused(2, 99.0), fused(3, 0.0)];

        assert_eq!(inject_prizes(&mut entries, &table), 1);
        assert_eq!(entries[0].entry.prize, 500.0);
        assert!(entries[0].fusion.prize_injected);
        assert_eq!(entries[0].fusion.field_sources[&EntryField::Prize].source, SourceKind::Api);
        assert_eq!(entries[1].entry.prize, 99.0);
        assert!(!entries[2].fusion.prize_injected);
    }
}
