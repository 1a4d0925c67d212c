// Entry Merge - Field-Level Fusion with Provenance
//
// Entries from all surviving sources are grouped by `rank|wager` key and
// merged field by field. Then noise is suppressed:
// - DOM prizes that are really the rank number are rejected
// - single-source entries beyond the trusted rank range are dropped
// - single-source entries duplicating a verified entry's wager are dropped
// - empty prizes are filled from the fused prize table
// - colliding ranks keep their best-supported entry

use super::prizes::{inject_prizes, FusedPrizeTable};
use crate::config::FusionConfig;
use crate::priority::compare_priority;
use crate::types::{
    CrossValidationReport, EntryField, EntryKey, EntryStatus, FieldSource, FusedEntry,
    FusionProvenance, LeaderboardEntry, SourceKind, StrategyResult, VerificationStatus,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Agreement score at or above which a multi-source entry is verified
const VERIFIED_AGREEMENT: f64 = 0.75;

/// DOM prizes below this are suspect when close to the rank
const GARBAGE_PRIZE_CEILING: f64 = 100.0;
const GARBAGE_RANK_DISTANCE: f64 = 15.0;

/// Whether a DOM-parsed prize is the rank number captured by mistake
pub fn is_garbage_dom_prize(rank: u32, prize: f64) -> bool {
    if prize <= 0.0 {
        return false;
    }
    let rank = rank as f64;
    prize == rank
        || (prize < GARBAGE_PRIZE_CEILING && (prize - rank).abs() <= GARBAGE_RANK_DISTANCE)
}

/// One source's entry under a key
#[derive(Debug, Clone, Copy)]
struct Contribution<'a> {
    source: SourceKind,
    entry: &'a LeaderboardEntry,
    confidence: f64,
}

impl Contribution<'_> {
    fn field_source(&self) -> FieldSource {
        FieldSource {
            source: self.source,
            confidence: self.confidence,
        }
    }

    /// Prize after DOM garbage rejection
    fn usable_prize(&self) -> f64 {
        if self.source == SourceKind::Dom && is_garbage_dom_prize(self.entry.rank, self.entry.prize) {
            0.0
        } else {
            self.entry.prize
        }
    }
}

/// Highest confidence first, ties by source priority
fn strongest_first(a: &Contribution<'_>, b: &Contribution<'_>) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| compare_priority(b.source, a.source))
}

pub fn agreement_score(status: Option<EntryStatus>) -> f64 {
    match status {
        Some(EntryStatus::Agreed) => 1.0,
        Some(EntryStatus::Disputed) => 0.5,
        _ => 0.0,
    }
}

/// Majority rank; ties go to the strongest contributor among the tied group
fn vote_rank(sorted: &[Contribution<'_>]) -> u32 {
    let mut votes: HashMap<u32, usize> = HashMap::new();
    for c in sorted {
        *votes.entry(c.entry.rank).or_default() += 1;
    }
    let top = votes.values().copied().max().unwrap_or(0);
    sorted
        .iter()
        .map(|c| c.entry.rank)
        .find(|rank| votes.get(rank).copied() == Some(top))
        .unwrap_or(0)
}

fn fuse_key(
    key: EntryKey,
    mut contributions: Vec<Contribution<'_>>,
    cv: Option<&CrossValidationReport>,
) -> Option<FusedEntry> {
    contributions.sort_by(strongest_first);
    let strongest = *contributions.first()?;
    let agreement = agreement_score(cv.and_then(|report| report.status_of(&key)));
    let mut field_sources = BTreeMap::new();

    if contributions.len() == 1 {
        let mut entry = strongest.entry.clone();
        entry.source = strongest.source;
        entry.prize = strongest.usable_prize();

        field_sources.insert(EntryField::Rank, strongest.field_source());
        field_sources.insert(EntryField::Username, strongest.field_source());
        field_sources.insert(EntryField::Wager, strongest.field_source());
        if entry.prize > 0.0 || strongest.entry.prize == 0.0 {
            field_sources.insert(EntryField::Prize, strongest.field_source());
        }

        return Some(FusedEntry {
            entry,
            fusion: FusionProvenance {
                sources: vec![strongest.source],
                agreement_score: agreement,
                verification_status: VerificationStatus::SingleSource,
                field_sources,
                prize_injected: false,
            },
        });
    }

    field_sources.insert(EntryField::Username, strongest.field_source());

    let rank = vote_rank(&contributions);
    if let Some(c) = contributions.iter().find(|c| c.entry.rank == rank) {
        field_sources.insert(EntryField::Rank, c.field_source());
    }

    let wager = match contributions.iter().find(|c| c.entry.wager > 0.0) {
        Some(c) => {
            field_sources.insert(EntryField::Wager, c.field_source());
            c.entry.wager
        }
        None => 0.0,
    };

    let prize = match contributions.iter().find(|c| c.usable_prize() > 0.0) {
        Some(c) => {
            field_sources.insert(EntryField::Prize, c.field_source());
            c.usable_prize()
        }
        None => 0.0,
    };

    let mut sources: Vec<SourceKind> = contributions.iter().map(|c| c.source).collect();
    sources.sort();
    sources.dedup();

    Some(FusedEntry {
        entry: LeaderboardEntry::new(rank, strongest.entry.username.clone(), wager, prize, strongest.source),
        fusion: FusionProvenance {
            sources,
            agreement_score: agreement,
            verification_status: if agreement >= VERIFIED_AGREEMENT {
                VerificationStatus::Verified
            } else {
                VerificationStatus::Disputed
            },
            field_sources,
            prize_injected: false,
        },
    })
}

/// Highest rank the fused list can be trusted up to, 0 when unknown
pub fn trusted_max_rank(
    fused: &[FusedEntry],
    results: &BTreeMap<SourceKind, StrategyResult>,
    config: &FusionConfig,
) -> u32 {
    let max_verified = fused
        .iter()
        .filter(|e| e.is_multi_source())
        .map(|e| e.entry.rank)
        .max()
        .unwrap_or(0);
    let max_api = results
        .get(&SourceKind::Api)
        .map(StrategyResult::max_rank)
        .unwrap_or(0);
    let trusted = max_verified.max(max_api);
    if trusted == 0 {
        return 0;
    }

    // A confident, more complete parser must not be truncated
    let extended = results
        .iter()
        .filter(|(kind, result)| match kind {
            SourceKind::Markdown => result.confidence >= config.markdown_trusted_confidence,
            SourceKind::Dom => {
                result.confidence >= config.dom_trusted_confidence
                    && result.entries.len() >= config.dom_trusted_min_entries
            }
            _ => false,
        })
        .map(|(kind, result)| (*kind, result.max_rank()))
        .filter(|(_, max)| *max >= trusted.saturating_add(config.material_rank_margin))
        .max_by_key(|(_, max)| *max);

    match extended {
        Some((kind, max)) => {
            info!(source = %kind, from = trusted, to = max, "Extending trusted rank range");
            max
        }
        None => trusted,
    }
}

fn is_exempt_from_range(
    entry: &FusedEntry,
    results: &BTreeMap<SourceKind, StrategyResult>,
    config: &FusionConfig,
) -> bool {
    match entry.entry.source {
        SourceKind::Api => true,
        SourceKind::Markdown => results
            .get(&SourceKind::Markdown)
            .is_some_and(|r| r.confidence >= config.markdown_trusted_confidence),
        _ => false,
    }
}

/// Best-supported entry first: most sources, best field confidence, priority
fn best_supported_first(a: &FusedEntry, b: &FusedEntry) -> Ordering {
    b.fusion
        .sources
        .len()
        .cmp(&a.fusion.sources.len())
        .then_with(|| {
            b.best_field_confidence()
                .partial_cmp(&a.best_field_confidence())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| compare_priority(b.entry.source, a.entry.source))
}

/// Merge every surviving source into one ranked list
pub fn merge_entries(
    results: &BTreeMap<SourceKind, StrategyResult>,
    cv: Option<&CrossValidationReport>,
    prize_table: &FusedPrizeTable,
    config: &FusionConfig,
) -> Vec<FusedEntry> {
    let mut by_key: BTreeMap<EntryKey, Vec<Contribution<'_>>> = BTreeMap::new();
    for (kind, result) in results {
        for entry in &result.entries {
            by_key.entry(entry.key()).or_default().push(Contribution {
                source: *kind,
                entry,
                confidence: result.confidence,
            });
        }
    }

    let mut fused: Vec<FusedEntry> = by_key
        .into_iter()
        .filter_map(|(key, contributions)| fuse_key(key, contributions, cv))
        .collect();
    let merged = fused.len();

    let trusted = trusted_max_rank(&fused, results, config);
    if trusted > 0 {
        fused.retain(|e| {
            e.is_multi_source() || e.entry.rank <= trusted || is_exempt_from_range(e, results, config)
        });
    }
    let after_range = fused.len();

    let verified_wagers: HashSet<i64> = fused
        .iter()
        .filter(|e| e.is_multi_source() && e.fusion.verification_status == VerificationStatus::Verified)
        .filter(|e| e.entry.wager > 0.0)
        .map(|e| e.entry.key().wager_cents)
        .collect();
    fused.retain(|e| {
        e.is_multi_source()
            || e.entry.wager <= 0.0
            || !verified_wagers.contains(&e.entry.key().wager_cents)
    });
    let after_duplicates = fused.len();

    let injected = inject_prizes(&mut fused, prize_table);

    fused.sort_by(|a, b| a.entry.rank.cmp(&b.entry.rank).then_with(|| best_supported_first(a, b)));
    fused.dedup_by_key(|e| e.entry.rank);

    debug!(
        merged,
        trusted_max_rank = trusted,
        out_of_range = merged - after_range,
        duplicate_wagers = after_range - after_duplicates,
        rank_collisions = after_duplicates - fused.len(),
        prizes_injected = injected,
        "Entry merge complete"
    );
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::prizes::fuse_prize_tables;
    use crate::types::PrizeEntry;
    use crate::validators::cross_validate;

    fn result(source: SourceKind, rows: &[(u32, &str, f64, f64)], confidence: f64) -> StrategyResult {
        StrategyResult::new(
            rows.iter()
                .map(|(r, n, w, p)| LeaderboardEntry::new(*r, *n, *w, *p, source))
                .collect(),
            confidence,
        )
    }

    fn merge(items: Vec<StrategyResult>) -> Vec<FusedEntry> {
        let results: BTreeMap<_, _> = items
            .into_iter()
            .map(|r| (r.entries[0].source, r))
            .collect();
        let cv = cross_validate(&results);
        let table = fuse_prize_tables(&results);
        merge_entries(&results, cv.as_ref(), &table, &FusionConfig::default())
    }

    #[test]
    fn test_garbage_dom_prize_rule() {
        assert!(is_garbage_dom_prize(32, 21.0));
        assert!(is_garbage_dom_prize(5, 5.0));
        assert!(is_garbage_dom_prize(150, 150.0));
        assert!(!is_garbage_dom_prize(32, 500.0));
        assert!(!is_garbage_dom_prize(1, 50.0));
        assert!(!is_garbage_dom_prize(3, 0.0));
    }

    #[test]
    fn test_field_level_selection() {
        let fused = merge(vec![
            result(SourceKind::Api, &[(1, "John123", 50_000.0, 0.0)], 85.0),
            result(SourceKind::Dom, &[(1, "Joh***", 50_000.0, 1_000.0)], 90.0),
        ]);

        assert_eq!(fused.len(), 1);
        let e = &fused[0];
        assert_eq!(e.entry.username, "Joh***");
        assert_eq!(e.entry.prize, 1_000.0);
        assert_eq!(e.fusion.sources, vec![SourceKind::Api, SourceKind::Dom]);
        assert_eq!(e.fusion.agreement_score, 1.0);
        assert_eq!(e.fusion.verification_status, VerificationStatus::Verified);
        assert_eq!(e.fusion.field_sources[&EntryField::Prize].source, SourceKind::Dom);
    }

    #[test]
    fn test_garbage_prize_never_wins() {
        let fused = merge(vec![
            result(SourceKind::Dom, &[(32, "x", 10.0, 21.0)], 95.0),
            result(SourceKind::Markdown, &[(32, "x", 10.0, 0.0)], 70.0),
        ]);
        assert_eq!(fused[0].entry.prize, 0.0);
        assert!(!fused[0].fusion.field_sources.contains_key(&EntryField::Prize));
    }

    #[test]
    fn test_out_of_range_single_source_dropped() {
        let api_rows: Vec<_> = (1..=10).map(|r| (r, "p", 1000.0 - r as f64, 0.0)).collect();
        let fused = merge(vec![
            result(SourceKind::Api, &api_rows, 85.0),
            result(SourceKind::Dom, &[(1, "p", 999.0, 0.0), (11, "late", 5.0, 0.0)], 75.0),
        ]);
        assert_eq!(fused.len(), 10);
        assert!(fused.iter().all(|e| e.entry.rank <= 10));
    }

    #[test]
    fn test_confident_markdown_extends_range() {
        let md_rows: Vec<_> = (1..=20).map(|r| (r, "m", 2000.0 - r as f64, 0.0)).collect();
        let fused = merge(vec![
            result(SourceKind::Api, &[(1, "m", 1999.0, 0.0), (2, "m", 1998.0, 0.0)], 85.0),
            result(SourceKind::Markdown, &md_rows, 72.0),
            result(SourceKind::Dom, &[(25, "dom", 1.0, 0.0)], 86.0),
        ]);
        // Markdown's 20 ranks survive; the DOM rank 25 is beyond the extended range
        assert_eq!(fused.len(), 20);
        assert_eq!(fused.last().unwrap().entry.rank, 20);
    }

    #[test]
    fn test_duplicate_wager_artifact_dropped() {
        let fused = merge(vec![
            result(SourceKind::Api, &[(1, "a", 500.0, 0.0), (2, "b", 400.0, 0.0)], 85.0),
            result(SourceKind::Dom, &[(1, "a", 500.0, 0.0), (2, "a", 500.0, 0.0)], 80.0),
        ]);
        // DOM rank 2 wager 500 repeats the verified rank-1 wager; API rank 2 stays
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[1].entry.wager, 400.0);
        assert_eq!(fused[1].entry.source, SourceKind::Api);
    }

    #[test]
    fn test_rank_collision_keeps_best_supported() {
        let fused = merge(vec![
            result(SourceKind::Api, &[(1, "a", 500.0, 0.0), (2, "b", 400.0, 0.0)], 85.0),
            result(SourceKind::Markdown, &[(1, "a", 500.0, 0.0), (2, "b", 400.0, 0.0)], 75.0),
            result(SourceKind::Ocr, &[(2, "b", 40.0, 0.0)], 95.0),
        ]);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[1].entry.wager, 400.0);
        assert_eq!(fused[1].fusion.sources.len(), 2);
    }

    #[test]
    fn test_table_prizes_filled_before_ordering() {
        let table = vec![PrizeEntry { rank: 1, prize: 100.0 }, PrizeEntry { rank: 2, prize: 50.0 }];
        let fused = merge(vec![
            result(SourceKind::Api, &[(2, "b", 400.0, 0.0), (1, "a", 500.0, 0.0)], 85.0)
                .with_prizes(table),
        ]);

        let prizes: Vec<_> = fused.iter().map(|e| (e.entry.rank, e.entry.prize)).collect();
        assert_eq!(prizes, vec![(1, 100.0), (2, 50.0)]);
        assert!(fused.iter().all(|e| e.fusion.prize_injected));
    }

    #[test]
    fn test_vote_rank_tie_goes_to_strongest() {
        let a = LeaderboardEntry::new(3, "x", 1.0, 0.0, SourceKind::Dom);
        let b = LeaderboardEntry::new(4, "x", 1.0, 0.0, SourceKind::Ocr);
        let mut contributions = vec![
            Contribution { source: SourceKind::Ocr, entry: &b, confidence: 90.0 },
            Contribution { source: SourceKind::Dom, entry: &a, confidence: 60.0 },
        ];
        contributions.sort_by(strongest_first);
        assert_eq!(vote_rank(&contributions), 4);
    }
}
