// Teacher Validation Adjustment
//
// The vision teacher reports what rank 1 looks like on the rendered page.
// Each source's own rank-1 entry is compared against it; matching sources
// gain confidence, mismatching ones lose it. Sources are re-weighted, never
// removed here.

use super::stale::within_tolerance;
use crate::config::FusionConfig;
use crate::types::{ExpectedRank1, LeaderboardEntry, SourceKind, StrategyResult};
use std::collections::BTreeMap;
use tracing::info;

/// Outcome of comparing one source against the expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeacherMatch {
    Matched,
    Mismatched,
}

/// Compare a rank-1 entry against the expectation
///
/// Only non-zero expected wager and prize values are comparable. Returns
/// `None` when nothing is comparable.
pub fn compare_rank1(
    entry: &LeaderboardEntry,
    expected: &ExpectedRank1,
    tolerance: f64,
) -> Option<TeacherMatch> {
    let checks: Vec<bool> = [(expected.wager, entry.wager), (expected.prize, entry.prize)]
        .into_iter()
        .filter_map(|(want, got)| {
            want.filter(|w| w.is_finite() && *w > 0.0)
                .map(|w| within_tolerance(got, w, tolerance))
        })
        .collect();

    if checks.is_empty() {
        return None;
    }
    Some(if checks.iter().all(|ok| *ok) {
        TeacherMatch::Matched
    } else {
        TeacherMatch::Mismatched
    })
}

/// Adjust every source's confidence in place
///
/// Sources without a rank-1 entry are left untouched.
pub fn apply_teacher_adjustment(
    results: &mut BTreeMap<SourceKind, StrategyResult>,
    expected: &ExpectedRank1,
    config: &FusionConfig,
) -> BTreeMap<SourceKind, TeacherMatch> {
    let mut outcomes = BTreeMap::new();
    for (kind, result) in results.iter_mut() {
        let Some(outcome) = result
            .rank_one()
            .and_then(|entry| compare_rank1(entry, expected, config.teacher_tolerance))
        else {
            continue;
        };

        let before = result.confidence;
        let delta = match outcome {
            TeacherMatch::Matched => config.teacher_match_bonus,
            TeacherMatch::Mismatched => -config.teacher_mismatch_penalty,
        };
        result.confidence = (before + delta).clamp(0.0, 100.0);
        info!(
            source = %kind,
            ?outcome,
            before,
            after = result.confidence,
            "Teacher rank-1 validation"
        );
        outcomes.insert(*kind, outcome);
    }
    outcomes
}
