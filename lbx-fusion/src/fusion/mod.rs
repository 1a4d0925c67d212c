//! Fusion Engine
//!
//! Orchestrates one extraction run end to end:
//! 1. Pre-process captured API responses (alternate boards, pagination)
//! 2. Run every applicable strategy (OCR behind the join barrier)
//! 3. Drop results below the confidence threshold
//! 4. Drop a stale API result
//! 5. Re-weight sources against the teacher's rank-1 expectation
//! 6. Cross-validate
//! 7. Merge entries and prize tables
//! 8. Compute the final confidence
//! 9. Report the extraction method
//!
//! Nothing here fails the run: every problem degrades to a lower confidence
//! or an explicit empty result.

pub mod merge;
pub mod preprocess;
pub mod prizes;
pub mod stale;
pub mod teacher;

use crate::capture::{PageCapture, SiteHints};
use crate::config::{FallbackMode, FusionConfig};
use crate::priority::pick_best;
use crate::strategies::{StrategyRegistry, StrategyRun};
use crate::types::{
    DiscardReason, DiscardedSource, ExpectedRank1, FusedResult, FusionMetadata, LearnedPattern,
    SourceKind, SourceSummary, StrategyResult, TeacherHints,
};
use crate::validators::cross_validate;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bonus for how many sources survived into the merge
pub fn source_count_bonus(count: usize) -> f64 {
    match count {
        0 => 0.0,
        1 => -5.0,
        2 => 10.0,
        _ => 20.0,
    }
}

/// round(mean confidence + source-count bonus + cross-validation bonus), clamped
pub fn final_confidence(confidences: &[f64], cv_adjustment: f64) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
    (mean + source_count_bonus(confidences.len()) + cv_adjustment)
        .round()
        .clamp(0.0, 100.0)
}

/// Multi-source fusion engine
pub struct FusionEngine {
    registry: StrategyRegistry,
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(registry: StrategyRegistry, config: FusionConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Run every step against one captured page
    pub async fn run(
        &self,
        capture: &PageCapture,
        hints: Option<&TeacherHints>,
        learned: Option<&LearnedPattern>,
    ) -> FusedResult {
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, strategies = self.registry.count(), "Starting fusion run");

        let (mut prepared, report) =
            preprocess::preprocess(capture, &self.config.alternate_leaderboard_keywords);
        if !report.discarded_urls.is_empty() || report.merged_pages > 0 {
            debug!(
                run_id = %run_id,
                discarded = report.discarded_urls.len(),
                merged_pages = report.merged_pages,
                "Pre-processed API responses"
            );
        }
        prepared.hints = SiteHints::from_sources(hints, learned);

        let run = match self.config.fallback_mode {
            FallbackMode::FuseAll => self.registry.run_all(&prepared, &self.config).await,
            FallbackMode::FirstMatch => self.registry.run_first_match(&prepared, &self.config).await,
        };

        self.fuse_run(run, hints.and_then(|h| h.expected_rank1.as_ref()), run_id)
    }

    /// Fuse already-collected strategy results (steps 3 to 9)
    ///
    /// Entries are normalised first, as the registry does for its own runs.
    pub fn fuse(&self, run: StrategyRun, expected_rank1: Option<&ExpectedRank1>) -> FusedResult {
        self.fuse_run(run.normalized(), expected_rank1, Uuid::new_v4())
    }

    fn fuse_run(
        &self,
        run: StrategyRun,
        expected_rank1: Option<&ExpectedRank1>,
        run_id: Uuid,
    ) -> FusedResult {
        let StrategyRun {
            mut results,
            mut discarded,
            errors,
        } = run;

        // Step 3: low-confidence noise never enters fusion
        results.retain(|kind, result| {
            if result.confidence >= self.config.min_confidence {
                return true;
            }
            debug!(
                source = %kind,
                confidence = result.confidence,
                min = self.config.min_confidence,
                "Discarding below-threshold result"
            );
            discarded.push(DiscardedSource {
                source: *kind,
                reason: DiscardReason::BelowThreshold,
                detail: format!(
                    "confidence {:.0} < {:.0}",
                    result.confidence, self.config.min_confidence
                ),
            });
            false
        });

        // Step 4
        if let Some(detail) = stale::detect_stale_api(&results, self.config.stale_wager_tolerance) {
            info!(run_id = %run_id, %detail, "Dropping stale API result");
            results.remove(&SourceKind::Api);
            discarded.push(DiscardedSource {
                source: SourceKind::Api,
                reason: DiscardReason::Stale,
                detail,
            });
        }

        // Step 5
        if let Some(expected) = expected_rank1 {
            teacher::apply_teacher_adjustment(&mut results, expected, &self.config);
        }

        if results.is_empty() {
            warn!(run_id = %run_id, errors = errors.len(), "No usable extraction result");
            return FusedResult::empty(run_id, discarded, errors);
        }

        // Step 6
        let cross_validation = cross_validate(&results);

        // Step 7
        let table = prizes::fuse_prize_tables(&results);
        let entries =
            merge::merge_entries(&results, cross_validation.as_ref(), &table, &self.config);
        let injected = entries.iter().filter(|e| e.fusion.prize_injected).count();

        // Step 8
        let confidences: Vec<f64> = results.values().map(|r| r.confidence).collect();
        let cv_adjustment = cross_validation
            .as_ref()
            .map(|cv| cv.confidence_adjustment)
            .unwrap_or(0.0);
        let confidence = final_confidence(&confidences, cv_adjustment);

        // Step 9
        let extraction_method = cross_validation
            .as_ref()
            .map(|cv| cv.recommended_source)
            .or_else(|| pick_best(results.iter().map(|(kind, r)| (*kind, r.confidence))));

        let source_breakdown: BTreeMap<SourceKind, SourceSummary> = results
            .iter()
            .map(|(kind, r)| (*kind, summarize(r)))
            .collect();
        let sources_used: Vec<SourceKind> = results.keys().copied().collect();

        info!(
            run_id = %run_id,
            entries = entries.len(),
            sources = sources_used.len(),
            prizes_injected = injected,
            confidence,
            method = ?extraction_method,
            "Fusion complete"
        );

        FusedResult {
            entries,
            prizes: table.prizes,
            total_prize_pool: table.total_prize_pool,
            confidence,
            extraction_method,
            cross_validation,
            source_breakdown,
            metadata: FusionMetadata {
                fused_at: Utc::now(),
                run_id,
                source_count: sources_used.len(),
                sources_used,
                discarded_sources: discarded,
            },
            errors,
        }
    }
}

fn summarize(result: &StrategyResult) -> SourceSummary {
    SourceSummary {
        entry_count: result.entries.len(),
        prize_count: result.prizes.len(),
        confidence: result.confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LeaderboardEntry;

    fn engine() -> FusionEngine {
        FusionEngine::new(StrategyRegistry::new(), FusionConfig::default())
    }

    fn result(source: SourceKind, wagers: &[f64], confidence: f64) -> StrategyResult {
        StrategyResult::new(
            wagers
                .iter()
                .enumerate()
                .map(|(i, w)| LeaderboardEntry::new(i as u32 + 1, format!("user{}", i + 1), *w, 0.0, source))
                .collect(),
            confidence,
        )
    }

    fn run(items: Vec<(SourceKind, StrategyResult)>) -> StrategyRun {
        StrategyRun {
            results: items.into_iter().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_final_confidence_formula() {
        assert_eq!(final_confidence(&[80.0], 0.0), 75.0);
        assert_eq!(final_confidence(&[80.0, 70.0], 10.0), 95.0);
        assert_eq!(final_confidence(&[90.0, 90.0, 90.0], 10.0), 100.0);
        assert_eq!(final_confidence(&[], 10.0), 0.0);
    }

    #[test]
    fn test_all_below_threshold_is_explicit_empty() {
        let fused = engine().fuse(run(vec![(SourceKind::Dom, result(SourceKind::Dom, &[3.0, 2.0], 40.0))]), None);

        assert!(fused.is_empty());
        assert_eq!(fused.extraction_method, None);
        assert_eq!(fused.confidence, 0.0);
        assert_eq!(fused.metadata.discarded_sources[0].reason, DiscardReason::BelowThreshold);
    }

    #[test]
    fn test_two_agreeing_sources() {
        let wagers = [500.0, 400.0, 300.0];
        let fused = engine().fuse(
            run(vec![
                (SourceKind::Api, result(SourceKind::Api, &wagers, 85.0)),
                (SourceKind::Dom, result(SourceKind::Dom, &wagers, 75.0)),
            ]),
            None,
        );

        assert_eq!(fused.entries.len(), 3);
        // mean 80 + 2 sources 10 + full agreement 10
        assert_eq!(fused.confidence, 100.0);
        assert_eq!(fused.extraction_method, Some(SourceKind::Api));
        assert_eq!(fused.metadata.source_count, 2);
        assert_eq!(fused.source_breakdown[&SourceKind::Dom].entry_count, 3);
    }

    #[test]
    fn test_teacher_adjustment_reweights_method() {
        let hints = ExpectedRank1 {
            username: None,
            wager: Some(900.0),
            prize: None,
        };
        let fused = engine().fuse(
            run(vec![
                (SourceKind::Api, result(SourceKind::Api, &[500.0, 400.0], 80.0)),
                (SourceKind::Dom, result(SourceKind::Dom, &[900.0, 800.0], 70.0)),
            ]),
            Some(&hints),
        );

        assert_eq!(fused.source_breakdown[&SourceKind::Api].confidence, 60.0);
        assert_eq!(fused.source_breakdown[&SourceKind::Dom].confidence, 85.0);
        // No agreed keys: recommendation falls to the higher confidence
        assert_eq!(fused.extraction_method, Some(SourceKind::Dom));
    }
}
