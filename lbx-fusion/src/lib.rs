//! lbx-fusion - Multi-Source Leaderboard Extraction Fusion
//!
//! Several independent strategies extract leaderboard entries from the same
//! captured page. Their partially overlapping, sometimes contradictory
//! results are reconciled into one result with per-field provenance and a
//! calibrated confidence, then graded by a six-dimension quality scorer.
//!
//! # Architecture
//! - **Strategies:** extract candidate results (`strategies`)
//! - **Fusion:** validate, merge and score confidence (`fusion`)
//! - **Validation:** cross-validation and quality grading (`validators`)

pub mod capture;
pub mod config;
pub mod error;
pub mod fusion;
pub mod priority;
pub mod strategies;
pub mod types;
pub mod validators;

pub use crate::capture::{ApiResponse, OcrEngine, PageCapture, PageHandle, SiteHints, TextBox};
pub use crate::config::{AppConfig, FallbackMode, FusionConfig, QualityWeights};
pub use crate::error::{ExtractionError, ExtractionResult};
pub use crate::fusion::FusionEngine;
pub use crate::strategies::{Strategy, StrategyRegistry, StrategyRun};
pub use crate::types::*;
pub use crate::validators::{cross_validate, QualityContext, QualityScorer};
