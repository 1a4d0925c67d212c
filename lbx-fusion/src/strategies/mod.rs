//! Extraction Strategies
//!
//! Every strategy reads the same [`PageCapture`] and reports a candidate
//! [`StrategyResult`]. The [`StrategyRegistry`] runs them all concurrently
//! with per-strategy error isolation: a failed strategy is logged and
//! recorded, the others keep going.
//!
//! # Strategies
//! 1. **api** - captured JSON responses (bounded structural search)
//! 2. **markdown** - markdown tables and numbered lines
//! 3. **dom** - table rows from the live page or raw HTML
//! 4. **geometric** - positioned text boxes clustered into rows
//! 5. **ocr** - screenshot text, scheduled after the join barrier
//!
//! # Scheduling
//! Strategies with [`ExecutionHint::AfterBarrier`] start only once every
//! concurrent strategy has finished, and are skipped when one of those
//! already produced a usable result.

pub mod api;
pub mod dom;
pub mod geometric;
pub mod json_search;
pub mod markdown;
pub mod ocr;
pub mod parse;

use crate::capture::PageCapture;
use crate::config::FusionConfig;
use crate::error::ExtractionResult;
use crate::priority::{compare_priority, ExecutionHint};
use crate::types::{DiscardReason, DiscardedSource, SourceKind, StrategyResult};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use api::ApiStrategy;
pub use dom::DomStrategy;
pub use geometric::GeometricStrategy;
pub use markdown::MarkdownStrategy;
pub use ocr::OcrStrategy;

/// Strategy trait - all extraction techniques implement this
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Source tag stamped on every entry this strategy produces
    fn kind(&self) -> SourceKind;

    /// Pure capability check, no side effects
    fn can_extract(&self, capture: &PageCapture) -> bool;

    /// Produce a candidate result
    ///
    /// # Returns
    /// * `Ok(Some(_))` - candidate entries with self-assessed confidence
    /// * `Ok(None)` - ran, found nothing
    /// * `Err(_)` - failed (logged and recorded, never aborts the run)
    async fn extract(&self, capture: &PageCapture) -> ExtractionResult<Option<StrategyResult>>;

    fn execution_hint(&self) -> ExecutionHint {
        ExecutionHint::Concurrent
    }
}

/// Everything the registry learned from one pass
#[derive(Debug, Clone, Default)]
pub struct StrategyRun {
    /// Non-empty, normalised results by source
    pub results: BTreeMap<SourceKind, StrategyResult>,
    pub discarded: Vec<DiscardedSource>,
    pub errors: Vec<String>,
}

impl StrategyRun {
    fn discard(&mut self, source: SourceKind, reason: DiscardReason, detail: impl Into<String>) {
        self.discarded.push(DiscardedSource {
            source,
            reason,
            detail: detail.into(),
        });
    }

    /// Re-apply entry normalisation to results collected elsewhere
    ///
    /// Idempotent for results the registry already recorded.
    pub fn normalized(self) -> Self {
        let StrategyRun {
            results,
            discarded,
            errors,
        } = self;
        let mut run = StrategyRun {
            results: BTreeMap::new(),
            discarded,
            errors,
        };
        for (source, result) in results {
            run.record(source, Ok(Some(result)));
        }
        run
    }

    /// Record one strategy's outcome
    fn record(&mut self, source: SourceKind, outcome: ExtractionResult<Option<StrategyResult>>) {
        match outcome {
            Ok(Some(mut result)) => {
                result.entries = parse::sanitize_entries(result.entries);
                for entry in &mut result.entries {
                    entry.source = source;
                }
                result.confidence = if result.confidence.is_finite() {
                    result.confidence.clamp(0.0, 100.0)
                } else {
                    0.0
                };

                if result.entries.is_empty() {
                    debug!(source = %source, "Strategy returned no usable entries");
                    self.discard(source, DiscardReason::Empty, "no usable entries");
                } else {
                    debug!(
                        source = %source,
                        entries = result.entries.len(),
                        confidence = result.confidence,
                        "Extraction successful"
                    );
                    self.results.insert(source, result);
                }
            }
            Ok(None) => {
                debug!(source = %source, "Strategy found nothing");
                self.discard(source, DiscardReason::Empty, "no result");
            }
            Err(e) => {
                warn!(
                    source = %source,
                    error = %e,
                    "Extraction failed (per-strategy error isolation)"
                );
                self.errors.push(format!("{}: {}", source, e));
                self.discard(source, DiscardReason::Failed, e.to_string());
            }
        }
    }

    /// Whether some result already makes the after-barrier strategies redundant
    fn has_confident_result(&self, config: &FusionConfig) -> Option<SourceKind> {
        self.results
            .iter()
            .find(|(_, r)| {
                r.entries.len() >= config.ocr_skip_min_entries
                    && r.confidence >= config.ocr_skip_min_confidence
            })
            .map(|(kind, _)| *kind)
    }
}

/// Holds every registered strategy, one per source kind
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategies that need nothing beyond the capture itself
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ApiStrategy::new()));
        registry.register(Arc::new(MarkdownStrategy::new()));
        registry.register(Arc::new(DomStrategy::new()));
        registry.register(Arc::new(GeometricStrategy::new()));
        registry
    }

    /// Add a strategy, replacing any registered one of the same kind
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        let kind = strategy.kind();
        if let Some(existing) = self.strategies.iter_mut().find(|s| s.kind() == kind) {
            warn!(source = %kind, "Replacing registered strategy");
            *existing = strategy;
        } else {
            self.strategies.push(strategy);
        }
        self.strategies
            .sort_by(|a, b| compare_priority(b.kind(), a.kind()));
    }

    pub fn count(&self) -> usize {
        self.strategies.len()
    }

    /// Registered kinds, highest priority first
    pub fn kinds(&self) -> Vec<SourceKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    async fn run_batch(
        strategies: &[Arc<dyn Strategy>],
        capture: &PageCapture,
    ) -> Vec<(SourceKind, ExtractionResult<Option<StrategyResult>>)> {
        let futures = strategies.iter().map(|strategy| {
            let strategy = Arc::clone(strategy);
            async move {
                let kind = strategy.kind();
                (kind, strategy.extract(capture).await)
            }
        });
        join_all(futures).await
    }

    /// Run every applicable strategy
    ///
    /// Concurrent strategies run together; after-barrier strategies run once
    /// all of those finished, unless a result already has enough entries at
    /// enough confidence.
    pub async fn run_all(&self, capture: &PageCapture, config: &FusionConfig) -> StrategyRun {
        let (concurrent, deferred): (Vec<_>, Vec<_>) = self
            .strategies
            .iter()
            .filter(|s| {
                let applicable = s.can_extract(capture);
                if !applicable {
                    debug!(source = %s.kind(), "Strategy not applicable");
                }
                applicable
            })
            .cloned()
            .partition(|s| s.execution_hint() == ExecutionHint::Concurrent);

        let mut run = StrategyRun::default();
        for (kind, outcome) in Self::run_batch(&concurrent, capture).await {
            run.record(kind, outcome);
        }

        // Join barrier: everything above has completed
        if deferred.is_empty() {
            return run;
        }
        if let Some(confident) = run.has_confident_result(config) {
            for strategy in &deferred {
                info!(
                    source = %strategy.kind(),
                    confident_source = %confident,
                    "Skipping after-barrier strategy, a confident result already exists"
                );
                run.discard(
                    strategy.kind(),
                    DiscardReason::Skipped,
                    format!("{} already returned a confident result", confident),
                );
            }
            return run;
        }

        for (kind, outcome) in Self::run_batch(&deferred, capture).await {
            run.record(kind, outcome);
        }
        run
    }

    /// Legacy mode: priority order, stop at the first result meeting the threshold
    pub async fn run_first_match(&self, capture: &PageCapture, config: &FusionConfig) -> StrategyRun {
        let mut run = StrategyRun::default();
        let mut winner: Option<SourceKind> = None;

        for strategy in &self.strategies {
            let kind = strategy.kind();
            if let Some(first) = winner {
                run.discard(kind, DiscardReason::Skipped, format!("first match was {}", first));
                continue;
            }
            if !strategy.can_extract(capture) {
                continue;
            }

            run.record(kind, strategy.extract(capture).await);
            let Some(result) = run.results.get(&kind) else {
                continue;
            };
            if result.confidence >= config.min_confidence {
                debug!(source = %kind, confidence = result.confidence, "First match");
                winner = Some(kind);
            } else if let Some(result) = run.results.remove(&kind) {
                run.discard(
                    kind,
                    DiscardReason::BelowThreshold,
                    format!("confidence {:.0} < {:.0}", result.confidence, config.min_confidence),
                );
            }
        }
        run
    }
}

// ============================================================================
// Mock Strategy for Testing
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::error::ExtractionError;
    use crate::types::LeaderboardEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed result, or fails
    pub struct MockStrategy {
        pub kind: SourceKind,
        pub result: Option<StrategyResult>,
        pub should_fail: bool,
        pub hint: ExecutionHint,
        pub calls: AtomicUsize,
    }

    impl MockStrategy {
        pub fn new(kind: SourceKind, entries: Vec<LeaderboardEntry>, confidence: f64) -> Self {
            Self {
                kind,
                result: Some(StrategyResult::new(entries, confidence)),
                should_fail: false,
                hint: ExecutionHint::Concurrent,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(kind: SourceKind) -> Self {
            Self {
                kind,
                result: None,
                should_fail: true,
                hint: ExecutionHint::Concurrent,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn after_barrier(mut self) -> Self {
            self.hint = ExecutionHint::AfterBarrier;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Strategy for MockStrategy {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn can_extract(&self, _capture: &PageCapture) -> bool {
            true
        }

        async fn extract(&self, _capture: &PageCapture) -> ExtractionResult<Option<StrategyResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(ExtractionError::Internal("Mock failure".to_string()))
            } else {
                Ok(self.result.clone())
            }
        }

        fn execution_hint(&self) -> ExecutionHint {
            self.hint
        }
    }

    pub fn entries(source: SourceKind, wagers: &[f64]) -> Vec<LeaderboardEntry> {
        wagers
            .iter()
            .enumerate()
            .map(|(i, w)| LeaderboardEntry::new(i as u32 + 1, format!("user{}", i + 1), *w, 0.0, source))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
