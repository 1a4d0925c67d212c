//! Error types for lbx-fusion
//!
//! Only the strategy boundary can fail. Everything downstream of it degrades
//! to a lower-confidence or empty `FusedResult` instead of erroring.

use thiserror::Error;

/// Failure inside one strategy
///
/// Caught by the registry, logged, and recorded in `FusedResult::errors`;
/// other strategies keep running.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Captured content could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Live page query failed
    #[error("Page error: {0}")]
    Page(String),

    /// OCR engine failed
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Required collaborator (page handle, OCR engine, screenshot) is missing
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// Malformed JSON body
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal processing error
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;
