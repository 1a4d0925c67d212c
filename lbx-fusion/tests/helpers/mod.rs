//! Test Helper Utilities
//!
//! Canned strategies and result builders shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lbx_fusion::priority::ExecutionHint;
use lbx_fusion::{
    ExtractionError, ExtractionResult, LeaderboardEntry, PageCapture, SourceKind, Strategy,
    StrategyResult, StrategyRun,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Strategy returning a fixed result
pub struct CannedStrategy {
    kind: SourceKind,
    result: Option<StrategyResult>,
    fail: bool,
    hint: ExecutionHint,
    calls: AtomicUsize,
}

impl CannedStrategy {
    pub fn returning(result: StrategyResult) -> Self {
        let kind = result
            .entries
            .first()
            .map(|e| e.source)
            .unwrap_or(SourceKind::Dom);
        Self {
            kind,
            result: Some(result),
            fail: false,
            hint: ExecutionHint::Concurrent,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(kind: SourceKind) -> Self {
        Self {
            kind,
            result: None,
            fail: true,
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
impl Strategy for CannedStrategy {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn can_extract(&self, _capture: &PageCapture) -> bool {
        true
    }

    async fn extract(&self, _capture: &PageCapture) -> ExtractionResult<Option<StrategyResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ExtractionError::Internal("canned failure".to_string()));
        }
        Ok(self.result.clone())
    }

    fn execution_hint(&self) -> ExecutionHint {
        self.hint
    }
}

/// Ranked entries `1..=n` with the given wagers and no prizes
pub fn ranked(source: SourceKind, wagers: &[f64]) -> Vec<LeaderboardEntry> {
    wagers
        .iter()
        .enumerate()
        .map(|(i, w)| LeaderboardEntry::new(i as u32 + 1, format!("player{}", i + 1), *w, 0.0, source))
        .collect()
}

pub fn result(source: SourceKind, wagers: &[f64], confidence: f64) -> StrategyResult {
    StrategyResult::new(ranked(source, wagers), confidence)
}

/// A strategy run holding exactly these results
pub fn run_of(results: Vec<StrategyResult>) -> StrategyRun {
    StrategyRun {
        results: results
            .into_iter()
            .filter_map(|r| r.entries.first().map(|e| e.source).map(|kind| (kind, r)))
            .collect(),
        ..Default::default()
    }
}

/// Descending wagers: `top`, `top - step`, ...
pub fn descending(top: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| top - step * i as f64).collect()
}
