// Quality Scorer - Multi-Dimensional Grade of a Fused Result
//
// Post-hoc only: the score grades a fused result and drives
// recommendations, it never feeds back into fusion.

use super::anomalies::detect_anomalies;
use crate::config::QualityWeights;
use crate::strategies::parse::normalize_username;
use crate::types::{
    Anomaly, FlagKind, FusedResult, LearnedPattern, LeaderboardEntry, QualityDimension,
    QualityFlag, QualityScoreReport, QualityStatus, Severity, SourceKind, TeacherVerification,
};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Score used when a dimension has nothing to compare against
const NEUTRAL_AGREEMENT: f64 = 50.0;
const NEUTRAL_HISTORY: f64 = 70.0;
const NEUTRAL_PATTERN: f64 = 50.0;
const NEUTRAL_TEACHER: f64 = 50.0;

/// Optional external baselines for one scoring pass
#[derive(Debug, Clone, Default)]
pub struct QualityContext {
    /// Usernames of the prior extraction of the same leaderboard
    pub previous_usernames: Option<Vec<String>>,
    pub learned: Option<LearnedPattern>,
    pub teacher_verification: Option<TeacherVerification>,
}

impl QualityContext {
    pub fn with_previous_result(mut self, previous: &FusedResult) -> Self {
        self.previous_usernames = Some(
            previous
                .entries
                .iter()
                .map(|e| e.entry.username.clone())
                .collect(),
        );
        self
    }
}

/// Weighted overall score, rounded half away from zero
pub fn weighted_overall(
    breakdown: &BTreeMap<QualityDimension, f64>,
    weights: &QualityWeights,
) -> f64 {
    let sum: f64 = breakdown
        .iter()
        .map(|(dimension, score)| score * weights.weight(*dimension))
        .sum();
    // Snap float noise first so exact halves round consistently
    ((sum * 1e6).round() / 1e6).round()
}

pub fn status_for(overall: f64) -> QualityStatus {
    if overall >= 80.0 {
        QualityStatus::Pass
    } else if overall >= 60.0 {
        QualityStatus::Warning
    } else {
        QualityStatus::Fail
    }
}

/// Fraction of fully populated entries (70) plus wager (20) and prize (10) coverage
fn is_amount(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

pub fn completeness_score(entries: &[&LeaderboardEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    let n = entries.len() as f64;
    let complete = entries
        .iter()
        // Zero counts as populated for both money fields
        .filter(|e| {
            e.rank > 0
                && !e.username.trim().is_empty()
                && is_amount(e.wager)
                && is_amount(e.prize)
        })
        .count() as f64;
    let with_wager = entries.iter().filter(|e| e.wager > 0.0).count() as f64;
    let with_prize = entries.iter().filter(|e| e.prize > 0.0).count() as f64;

    (complete / n * 70.0 + with_wager / n * 20.0 + with_prize / n * 10.0).clamp(0.0, 100.0)
}

pub fn agreement_score(overall_agreement: Option<f64>) -> f64 {
    match overall_agreement {
        None => NEUTRAL_AGREEMENT,
        Some(a) if a >= 0.9 => 100.0,
        Some(a) if a >= 0.8 => 90.0,
        Some(a) if a >= 0.7 => 80.0,
        Some(a) if a >= 0.5 => 60.0,
        Some(a) if a >= 0.3 => 40.0,
        Some(_) => 20.0,
    }
}

/// Username overlap with the prior extraction
///
/// Moderate churn (50-90%) is healthy; near-total overlap suggests a frozen
/// or cached board, very low overlap a different board altogether.
pub fn historical_score(entries: &[&LeaderboardEntry], previous: Option<&[String]>) -> f64 {
    let previous: HashSet<String> = match previous {
        Some(names) if !names.is_empty() => names
            .iter()
            .map(|n| normalize_username(n))
            .filter(|n| !n.is_empty())
            .collect(),
        _ => return NEUTRAL_HISTORY,
    };
    let current: HashSet<String> = entries
        .iter()
        .map(|e| normalize_username(&e.username))
        .filter(|n| !n.is_empty())
        .collect();
    if current.is_empty() {
        return 40.0;
    }

    let overlap = current.intersection(&previous).count() as f64 / current.len() as f64;
    if overlap > 0.9 {
        60.0
    } else if overlap >= 0.5 {
        90.0
    } else if overlap >= 0.3 {
        70.0
    } else {
        40.0
    }
}

pub fn pattern_score(
    extraction_method: Option<SourceKind>,
    entry_count: usize,
    learned: Option<&LearnedPattern>,
) -> f64 {
    let Some(learned) = learned else {
        return NEUTRAL_PATTERN;
    };
    let mut score = NEUTRAL_PATTERN;

    if let Some(preferred) = learned.preferred_source {
        score += if extraction_method == Some(preferred) {
            30.0
        } else {
            -10.0
        };
    }

    if let Some(expected) = learned.expected_entries {
        let diff = entry_count.abs_diff(expected);
        score += match diff {
            0 => 20.0,
            1..=3 => 10.0,
            d if d > 10 => -10.0,
            _ => 0.0,
        };
    }

    score.clamp(0.0, 100.0)
}

pub fn teacher_score(verification: Option<&TeacherVerification>) -> f64 {
    match verification {
        None => NEUTRAL_TEACHER,
        Some(v) if v.verified => 95.0,
        Some(v) => match v.confidence {
            None => NEUTRAL_TEACHER,
            Some(c) if c >= 80.0 => 85.0,
            Some(c) if c >= 60.0 => 70.0,
            Some(_) => 40.0,
        },
    }
}

/// Flag rules: dimension, threshold, kind, severity, recommendation
const FLAG_RULES: [(QualityDimension, f64, FlagKind, Severity, &str); 5] = [
    (
        QualityDimension::SourceAgreement,
        50.0,
        FlagKind::LowAgreement,
        Severity::High,
        "Sources disagree; review the site's selectors and API mapping before trusting this result",
    ),
    (
        QualityDimension::Completeness,
        60.0,
        FlagKind::Incomplete,
        Severity::Medium,
        "Many entries lack wager or prize values; check column order hints",
    ),
    (
        QualityDimension::HistoricalConsistency,
        40.0,
        FlagKind::HistoricalDrift,
        Severity::Medium,
        "Entries differ sharply from the previous run; confirm the correct leaderboard period was captured",
    ),
    (
        QualityDimension::Validity,
        60.0,
        FlagKind::InvalidData,
        Severity::High,
        "Entries contain structural anomalies; inspect rank ordering and wager parsing",
    ),
    (
        QualityDimension::PatternMatch,
        40.0,
        FlagKind::PatternMismatch,
        Severity::Low,
        "Result deviates from the learned site pattern; consider re-learning the site configuration",
    ),
];

/// Grades fused results with configurable dimension weights
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    weights: QualityWeights,
}

impl QualityScorer {
    pub fn new(weights: QualityWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, result: &FusedResult, context: &QualityContext) -> QualityScoreReport {
        let entries: Vec<&LeaderboardEntry> = result.entries.iter().map(|e| &e.entry).collect();
        let (validity, anomalies) = detect_anomalies(&entries);

        let mut breakdown = BTreeMap::new();
        breakdown.insert(QualityDimension::Completeness, completeness_score(&entries));
        breakdown.insert(
            QualityDimension::SourceAgreement,
            agreement_score(result.cross_validation.as_ref().map(|cv| cv.overall_agreement)),
        );
        breakdown.insert(QualityDimension::Validity, validity);
        breakdown.insert(
            QualityDimension::HistoricalConsistency,
            historical_score(&entries, context.previous_usernames.as_deref()),
        );
        breakdown.insert(
            QualityDimension::PatternMatch,
            pattern_score(result.extraction_method, entries.len(), context.learned.as_ref()),
        );
        breakdown.insert(
            QualityDimension::TeacherVerification,
            teacher_score(context.teacher_verification.as_ref()),
        );

        let report = Self::report(breakdown, &self.weights, anomalies);
        debug!(
            run_id = %result.metadata.run_id,
            overall = report.overall,
            status = %report.status,
            flags = report.flags.len(),
            "Quality scoring complete"
        );
        report
    }

    /// Assemble a report from dimension scores
    pub fn report(
        breakdown: BTreeMap<QualityDimension, f64>,
        weights: &QualityWeights,
        anomalies: Vec<Anomaly>,
    ) -> QualityScoreReport {
        let overall = weighted_overall(&breakdown, weights).clamp(0.0, 100.0);

        let mut flags = Vec::new();
        let mut recommendations = Vec::new();
        for (dimension, threshold, kind, severity, recommendation) in FLAG_RULES {
            let Some(score) = breakdown.get(&dimension).copied() else {
                continue;
            };
            if score < threshold {
                flags.push(QualityFlag {
                    kind,
                    severity,
                    message: format!("{:?} score {:.0} is below {:.0}", dimension, score, threshold),
                });
                recommendations.push(recommendation.to_string());
            }
        }

        QualityScoreReport {
            overall,
            status: status_for(overall),
            weights: weights.as_map(),
            breakdown,
            anomalies,
            flags,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(rows: &[(u32, &str, f64, f64)]) -> Vec<LeaderboardEntry> {
        rows.iter()
            .map(|(r, n, w, p)| LeaderboardEntry::new(*r, *n, *w, *p, SourceKind::Api))
            .collect()
    }

    #[test]
    fn test_weighted_overall() {
        let breakdown: BTreeMap<_, _> = QualityDimension::ALL
            .into_iter()
            .zip([70.0, 80.0, 60.0, 70.0, 50.0, 50.0])
            .collect();
        // 14 + 20 + 12 + 10.5 + 5 + 5 = 66.5
        assert_eq!(weighted_overall(&breakdown, &QualityWeights::default()), 67.0);
    }

    #[test]
    fn test_completeness() {
        let owned = entries(&[(1, "a", 100.0, 10.0), (2, "b", 50.0, 0.0), (3, "c", 0.0, 0.0), (4, "d", 10.0, 0.0)]);
        let refs: Vec<_> = owned.iter().collect();
        // 4/4 * 70 + 3/4 * 20 + 1/4 * 10
        assert!((completeness_score(&refs) - 87.5).abs() < 1e-9);
        assert_eq!(completeness_score(&[]), 0.0);
    }

    #[test]
    fn test_money_fields_count_alike() {
        let zero_wager = entries(&[(1, "a", 0.0, 50.0)]);
        let zero_prize = entries(&[(1, "a", 50.0, 0.0)]);
        let unranked = entries(&[(0, "a", 50.0, 50.0)]);

        // 70 base plus the single non-zero bonus
        assert_eq!(completeness_score(&zero_wager.iter().collect::<Vec<_>>()), 80.0);
        assert_eq!(completeness_score(&zero_prize.iter().collect::<Vec<_>>()), 90.0);
        assert_eq!(completeness_score(&unranked.iter().collect::<Vec<_>>()), 30.0);
    }

    #[test]
    fn test_agreement_step_curve() {
        assert_eq!(agreement_score(None), 50.0);
        assert_eq!(agreement_score(Some(1.0)), 100.0);
        assert_eq!(agreement_score(Some(0.85)), 90.0);
        assert_eq!(agreement_score(Some(0.7)), 80.0);
        assert_eq!(agreement_score(Some(0.5)), 60.0);
        assert_eq!(agreement_score(Some(0.3)), 40.0);
        assert_eq!(agreement_score(Some(0.1)), 20.0);
    }

    #[test]
    fn test_historical_overlap_bands() {
        let owned = entries(&[(1, "a", 1.0, 0.0), (2, "b", 1.0, 0.0), (3, "c", 1.0, 0.0), (4, "d", 1.0, 0.0)]);
        let refs: Vec<_> = owned.iter().collect();
        let prior = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(historical_score(&refs, None), 70.0);
        assert_eq!(historical_score(&refs, Some(&prior(&["a", "b", "c", "d"]))), 60.0);
        assert_eq!(historical_score(&refs, Some(&prior(&["A", "b", "x"]))), 90.0);
        assert_eq!(historical_score(&refs, Some(&prior(&["a", "x"]))), 40.0);
        assert_eq!(historical_score(&[], Some(&prior(&["a"]))), 40.0);
    }

    #[test]
    fn test_pattern_match() {
        let learned = LearnedPattern {
            preferred_source: Some(SourceKind::Api),
            expected_entries: Some(10),
            ..Default::default()
        };
        assert_eq!(pattern_score(Some(SourceKind::Api), 10, Some(&learned)), 100.0);
        assert_eq!(pattern_score(Some(SourceKind::Dom), 12, Some(&learned)), 50.0);
        assert_eq!(pattern_score(Some(SourceKind::Dom), 25, Some(&learned)), 30.0);
        assert_eq!(pattern_score(None, 0, None), 50.0);
    }

    #[test]
    fn test_teacher_verification() {
        let v = |verified, confidence| TeacherVerification { verified, confidence };
        assert_eq!(teacher_score(None), 50.0);
        assert_eq!(teacher_score(Some(&v(true, None))), 95.0);
        assert_eq!(teacher_score(Some(&v(false, Some(85.0)))), 85.0);
        assert_eq!(teacher_score(Some(&v(false, Some(65.0)))), 70.0);
        assert_eq!(teacher_score(Some(&v(false, Some(20.0)))), 40.0);
        assert_eq!(teacher_score(Some(&v(false, None))), 50.0);
    }

    #[test]
    fn test_flags_and_recommendations() {
        let breakdown: BTreeMap<_, _> = QualityDimension::ALL
            .into_iter()
            .zip([50.0, 20.0, 40.0, 70.0, 30.0, 50.0])
            .collect();
        let report = QualityScorer::report(breakdown, &QualityWeights::default(), Vec::new());

        let kinds: Vec<_> = report.flags.iter().map(|f| (f.kind, f.severity)).collect();
        assert_eq!(
            kinds,
            vec![
                (FlagKind::LowAgreement, Severity::High),
                (FlagKind::Incomplete, Severity::Medium),
                (FlagKind::InvalidData, Severity::High),
                (FlagKind::PatternMismatch, Severity::Low),
            ]
        );
        assert_eq!(report.recommendations.len(), report.flags.len());
        assert_eq!(report.status, QualityStatus::Fail);
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(status_for(80.0), QualityStatus::Pass);
        assert_eq!(status_for(79.0), QualityStatus::Warning);
        assert_eq!(status_for(60.0), QualityStatus::Warning);
        assert_eq!(status_for(59.0), QualityStatus::Fail);
    }
}
