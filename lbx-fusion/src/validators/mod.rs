//! Validation
//!
//! - **cross_validator:** agreement between strategy results, before fusion
//! - **quality_scorer:** six-dimension grade of a fused result, after fusion
//! - **anomalies:** structural checks feeding the validity dimension

pub mod anomalies;
pub mod cross_validator;
pub mod quality_scorer;

pub use cross_validator::cross_validate;
pub use quality_scorer::{QualityContext, QualityScorer};
