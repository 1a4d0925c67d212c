//! Fusion configuration
//!
//! Every tuned threshold of the engine lives here. The stale-source and
//! teacher tolerances in particular are heuristics that need per-deployment
//! validation, so none of them is hard-coded in the algorithms.

use crate::types::QualityDimension;
use lbx_common::logging::LoggingConfig;
use lbx_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How strategy results are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Run every applicable strategy and fuse
    #[default]
    FuseAll,
    /// Legacy: run in priority order, stop at the first usable result
    FirstMatch,
}

/// `[fusion]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Results below this confidence never enter fusion
    pub min_confidence: f64,
    /// OCR is skipped when another result has at least this many entries...
    pub ocr_skip_min_entries: usize,
    /// ...at or above this confidence
    pub ocr_skip_min_confidence: f64,
    /// Relative tolerance for API vs markdown wager matches
    pub stale_wager_tolerance: f64,
    /// Relative tolerance for rank-1 comparison against the teacher's expectation
    pub teacher_tolerance: f64,
    pub teacher_match_bonus: f64,
    pub teacher_mismatch_penalty: f64,
    /// Markdown at or above this confidence may extend the trusted rank range
    pub markdown_trusted_confidence: f64,
    /// DOM at or above this confidence (with enough entries) may extend it too
    pub dom_trusted_confidence: f64,
    pub dom_trusted_min_entries: usize,
    /// Ranks a confident source must exceed the trusted max by to extend it
    pub material_rank_margin: u32,
    /// URL/content markers of other leaderboards on the same site
    pub alternate_leaderboard_keywords: Vec<String>,
    pub fallback_mode: FallbackMode,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 50.0,
            ocr_skip_min_entries: 2,
            ocr_skip_min_confidence: 65.0,
            stale_wager_tolerance: 0.01,
            teacher_tolerance: 0.05,
            teacher_match_bonus: 15.0,
            teacher_mismatch_penalty: 20.0,
            markdown_trusted_confidence: 70.0,
            dom_trusted_confidence: 85.0,
            dom_trusted_min_entries: 5,
            material_rank_margin: 3,
            alternate_leaderboard_keywords: [
                "previous",
                "prev-",
                "past-",
                "last-month",
                "lastmonth",
                "last_month",
                "history",
                "archive",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            fallback_mode: FallbackMode::FuseAll,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        let confidences = [
            ("min_confidence", self.min_confidence),
            ("ocr_skip_min_confidence", self.ocr_skip_min_confidence),
            ("markdown_trusted_confidence", self.markdown_trusted_confidence),
            ("dom_trusted_confidence", self.dom_trusted_confidence),
            ("teacher_match_bonus", self.teacher_match_bonus),
            ("teacher_mismatch_penalty", self.teacher_mismatch_penalty),
        ];
        for (name, value) in confidences {
            if !(0.0..=100.0).contains(&value) {
                return Err(Error::Config(format!(
                    "fusion.{} must be within 0-100, got {}",
                    name, value
                )));
            }
        }

        for (name, value) in [
            ("stale_wager_tolerance", self.stale_wager_tolerance),
            ("teacher_tolerance", self.teacher_tolerance),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "fusion.{} must be within [0, 1), got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

/// `[quality]` table: dimension weights, must sum to 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub completeness: f64,
    pub source_agreement: f64,
    pub validity: f64,
    pub historical_consistency: f64,
    pub pattern_match: f64,
    pub teacher_verification: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 0.20,
            source_agreement: 0.25,
            validity: 0.20,
            historical_consistency: 0.15,
            pattern_match: 0.10,
            teacher_verification: 0.10,
        }
    }
}

impl QualityWeights {
    pub fn weight(&self, dimension: QualityDimension) -> f64 {
        match dimension {
            QualityDimension::Completeness => self.completeness,
            QualityDimension::SourceAgreement => self.source_agreement,
            QualityDimension::Validity => self.validity,
            QualityDimension::HistoricalConsistency => self.historical_consistency,
            QualityDimension::PatternMatch => self.pattern_match,
            QualityDimension::TeacherVerification => self.teacher_verification,
        }
    }

    pub fn as_map(&self) -> BTreeMap<QualityDimension, f64> {
        QualityDimension::ALL
            .into_iter()
            .map(|d| (d, self.weight(d)))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let weights = self.as_map();
        if let Some((dimension, w)) = weights.iter().find(|(_, w)| !(0.0..=1.0).contains(*w)) {
            return Err(Error::Config(format!(
                "quality weight {:?} must be within 0-1, got {}",
                dimension, w
            )));
        }
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > 0.001 {
            return Err(Error::Config(format!(
                "quality weights must sum to 1.0, got {:.3}",
                sum
            )));
        }
        Ok(())
    }
}

/// Whole config file: `[logging]`, `[fusion]`, `[quality]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub fusion: FusionConfig,
    pub quality: QualityWeights,
}

impl AppConfig {
    /// Load and validate; a missing file yields defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: AppConfig = lbx_common::config::load_toml(path)?;
        config.fusion.validate()?;
        config.quality.validate()?;
        Ok(config)
    }
}
