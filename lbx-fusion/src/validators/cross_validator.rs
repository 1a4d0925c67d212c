// Cross-Validator - Entry-Level Agreement Between Sources
//
// Lines entries up by `rank|wager` key. Usernames are masked inconsistently
// across sources, so they only serve as a secondary hint for spotting
// conflicting keys.

use crate::priority::compare_priority;
use crate::strategies::parse::{normalize_username, usernames_compatible};
use crate::types::{
    CrossValidationReport, EntryAgreement, EntryKey, EntryStatus, LeaderboardEntry, SourceKind,
    StrategyResult, MIN_SOURCES_FOR_VERIFICATION,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Confidence bonus for the overall agreement level
pub fn agreement_adjustment(overall_agreement: f64) -> f64 {
    if overall_agreement >= 0.9 {
        10.0
    } else if overall_agreement >= 0.7 {
        5.0
    } else {
        0.0
    }
}

/// Whether `entry` (seen only in `source`) conflicts with what another source reports
fn conflicts_elsewhere(
    entry: &LeaderboardEntry,
    source: SourceKind,
    results: &BTreeMap<SourceKind, StrategyResult>,
) -> bool {
    let key = entry.key();
    results
        .iter()
        .filter(|(kind, _)| **kind != source)
        .flat_map(|(_, result)| result.entries.iter())
        .any(|other| {
            let other_key = other.key();
            if other_key == key {
                return false;
            }
            // Same slot, different wager
            other.rank == entry.rank
                // Same player, different slot or wager
                || usernames_compatible(&other.username, &entry.username)
        })
}

/// Cross-validate two or more strategy results
///
/// # Returns
/// * `None` when fewer than two results are given
pub fn cross_validate(
    results: &BTreeMap<SourceKind, StrategyResult>,
) -> Option<CrossValidationReport> {
    if results.len() < MIN_SOURCES_FOR_VERIFICATION {
        return None;
    }

    // key -> (sources, first entry seen), sources in priority order
    let mut index: BTreeMap<EntryKey, (Vec<SourceKind>, &LeaderboardEntry)> = BTreeMap::new();
    for (kind, result) in results {
        for entry in &result.entries {
            let slot = index.entry(entry.key()).or_insert_with(|| (Vec::new(), entry));
            if !slot.0.contains(kind) {
                slot.0.push(*kind);
            }
        }
    }

    let mut entry_agreement = BTreeMap::new();
    let mut agreed_per_source: HashMap<SourceKind, usize> = HashMap::new();
    let (mut agreed, mut disputed) = (0usize, 0usize);

    for (key, (sources, entry)) in &index {
        let status = if sources.len() >= MIN_SOURCES_FOR_VERIFICATION {
            agreed += 1;
            for source in sources {
                *agreed_per_source.entry(*source).or_default() += 1;
            }
            EntryStatus::Agreed
        } else if conflicts_elsewhere(entry, sources[0], results) {
            disputed += 1;
            EntryStatus::Disputed
        } else {
            EntryStatus::Unique
        };

        entry_agreement.insert(
            key.to_string(),
            EntryAgreement {
                status,
                username: normalize_username(&entry.username),
                sources: sources.clone(),
            },
        );
    }

    let cross_referenced = agreed + disputed;
    let overall_agreement = if cross_referenced == 0 {
        0.0
    } else {
        agreed as f64 / cross_referenced as f64
    };

    let recommended_source = results
        .iter()
        .map(|(kind, result)| {
            (
                *kind,
                agreed_per_source.get(kind).copied().unwrap_or(0),
                result.confidence,
            )
        })
        .max_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
                .then_with(|| compare_priority(a.0, b.0))
        })
        .map(|(kind, _, _)| kind)?;

    let confidence_adjustment = agreement_adjustment(overall_agreement);

    debug!(
        sources = results.len(),
        keys = index.len(),
        agreed,
        disputed,
        overall_agreement,
        recommended = %recommended_source,
        "Cross-validation complete"
    );

    Some(CrossValidationReport {
        overall_agreement,
        entry_agreement,
        recommended_source,
        confidence_adjustment,
    })
}
