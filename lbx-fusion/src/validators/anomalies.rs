// Anomaly Detection - Validity Dimension
//
// Structural sanity checks over fused entries. The validity score is 100
// minus the penalties of every detected anomaly, floored at 0.

use crate::strategies::parse::{is_masked, normalize_username};
use crate::types::{Anomaly, AnomalyKind, LeaderboardEntry};
use std::collections::HashSet;

const NON_MONOTONIC_PENALTY: f64 = 5.0;
const NON_SEQUENTIAL_PENALTY: f64 = 10.0;
const OUTLIER_PENALTY: f64 = 15.0;
const DUPLICATE_PENALTY: f64 = 20.0;
const ALL_ZERO_PENALTY: f64 = 25.0;

/// A wager this many times the median non-zero wager is an outlier
const OUTLIER_FACTOR: f64 = 100.0;

/// All-zero wagers only count as an anomaly above this many entries
const ALL_ZERO_MIN_ENTRIES: usize = 3;

fn median(sorted: &[f64]) -> Option<f64> {
    match sorted.len() {
        0 => None,
        n if n % 2 == 1 => Some(sorted[n / 2]),
        n => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

/// Detect anomalies and compute the validity score
///
/// # Returns
/// * (validity score 0-100, detected anomalies)
pub fn detect_anomalies(entries: &[&LeaderboardEntry]) -> (f64, Vec<Anomaly>) {
    let mut anomalies = Vec::new();
    let mut penalty = 0.0;

    let mut by_rank: Vec<&LeaderboardEntry> = entries.to_vec();
    by_rank.sort_by_key(|e| e.rank);

    // Wager must not increase as rank increases
    for pair in by_rank.windows(2) {
        if pair[1].wager > pair[0].wager {
            penalty += NON_MONOTONIC_PENALTY;
            anomalies.push(Anomaly {
                kind: AnomalyKind::NonMonotonicWager,
                message: format!(
                    "Rank {} wager {:.2} exceeds rank {} wager {:.2}",
                    pair[1].rank, pair[1].wager, pair[0].rank, pair[0].wager
                ),
            });
        }
    }

    let sequential = by_rank
        .iter()
        .enumerate()
        .all(|(i, e)| e.rank as usize == i + 1);
    if !by_rank.is_empty() && !sequential {
        penalty += NON_SEQUENTIAL_PENALTY;
        anomalies.push(Anomaly {
            kind: AnomalyKind::NonSequentialRanks,
            message: format!("Ranks are not exactly 1..{}", by_rank.len()),
        });
    }

    let mut non_zero: Vec<f64> = entries
        .iter()
        .map(|e| e.wager)
        .filter(|w| *w > 0.0)
        .collect();
    non_zero.sort_by(|a, b| a.total_cmp(b));
    if let Some(median) = median(&non_zero) {
        let limit = median * OUTLIER_FACTOR;
        if let Some(outlier) = entries.iter().find(|e| e.wager > limit) {
            penalty += OUTLIER_PENALTY;
            anomalies.push(Anomaly {
                kind: AnomalyKind::WagerOutlier,
                message: format!(
                    "Rank {} wager {:.2} is more than {}x the median {:.2}",
                    outlier.rank, outlier.wager, OUTLIER_FACTOR, median
                ),
            });
        }
    }

    // Masked names legitimately collide ("a***" twice)
    let mut seen = HashSet::new();
    let duplicate = entries
        .iter()
        .filter(|e| !is_masked(&e.username))
        .map(|e| normalize_username(&e.username))
        .filter(|n| !n.is_empty())
        .find(|n| !seen.insert(n.clone()));
    if let Some(name) = duplicate {
        penalty += DUPLICATE_PENALTY;
        anomalies.push(Anomaly {
            kind: AnomalyKind::DuplicateUsername,
            message: format!("Username '{}' appears more than once", name),
        });
    }

    if entries.len() > ALL_ZERO_MIN_ENTRIES && entries.iter().all(|e| e.wager == 0.0) {
        penalty += ALL_ZERO_PENALTY;
        anomalies.push(Anomaly {
            kind: AnomalyKind::AllZeroWagers,
            message: format!("All {} entries report a zero wager", entries.len()),
        });
    }

    ((100.0 - penalty).max(0.0), anomalies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceKind;

    fn entries(rows: &[(u32, &str, f64)]) -> Vec<LeaderboardEntry> {
        rows.iter()
            .map(|(r, n, w)| LeaderboardEntry::new(*r, *n, *w, 0.0, SourceKind::Dom))
            .collect()
    }

    fn detect(rows: &[(u32, &str, f64)]) -> (f64, Vec<AnomalyKind>) {
        let owned = entries(rows);
        let refs: Vec<&LeaderboardEntry> = owned.iter().collect();
        let (score, anomalies) = detect_anomalies(&refs);
        (score, anomalies.into_iter().map(|a| a.kind).collect())
    }

    #[test]
    fn test_clean_board() {
        let (score, kinds) = detect(&[(1, "a", 300.0), (2, "b", 200.0), (3, "c", 100.0)]);
        assert_eq!(score, 100.0);
        assert!(kinds.is_empty());
    }

    #[test]
    fn test_monotonic_and_sequence_penalties() {
        let (score, kinds) = detect(&[(1, "a", 100.0), (2, "b", 200.0), (4, "c", 300.0)]);
        assert_eq!(
            kinds,
            vec![
                AnomalyKind::NonMonotonicWager,
                AnomalyKind::NonMonotonicWager,
                AnomalyKind::NonSequentialRanks
            ]
        );
        assert_eq!(score, 80.0);
    }

    #[test]
    fn test_outlier_against_median() {
        let (score, kinds) = detect(&[
            (1, "a", 1_000_000.0),
            (2, "b", 100.0),
            (3, "c", 90.0),
            (4, "d", 80.0),
        ]);
        assert_eq!(kinds, vec![AnomalyKind::WagerOutlier]);
        assert_eq!(score, 85.0);
    }

    #[test]
    fn test_duplicates_ignore_masked_names() {
        let (_, kinds) = detect(&[(1, "Joh***", 3.0), (2, "joh***", 2.0), (3, "c", 1.0)]);
        assert!(kinds.is_empty());

        let (score, kinds) = detect(&[(1, "Alice", 3.0), (2, "alice!", 2.0), (3, "c", 1.0)]);
        assert_eq!(kinds, vec![AnomalyKind::DuplicateUsername]);
        assert_eq!(score, 80.0);
    }

    #[test]
    fn test_all_zero_wagers_needs_more_than_three_entries() {
        let (_, kinds) = detect(&[(1, "a", 0.0), (2, "b", 0.0), (3, "c", 0.0)]);
        assert!(kinds.is_empty());

        let (score, kinds) = detect(&[(1, "a", 0.0), (2, "b", 0.0), (3, "c", 0.0), (4, "d", 0.0)]);
        assert_eq!(kinds, vec![AnomalyKind::AllZeroWagers]);
        assert_eq!(score, 75.0);
    }
}
