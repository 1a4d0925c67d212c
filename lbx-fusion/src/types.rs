//! Core Types for LBX-Fusion
//!
//! Data model shared by the three stages of the pipeline:
//! - **Strategies:** produce `StrategyResult` candidates
//! - **Fusion:** merges candidates into `FusedResult` with per-field provenance
//! - **Validation:** cross-validation report and post-hoc `QualityScoreReport`
//!
//! Field names serialize in camelCase; these names are the contract callers
//! (persistence, reporting) depend on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Maximum username length kept on an entry
pub const MAX_USERNAME_CHARS: usize = 100;

/// Cross-validation needs at least this many strategy results
pub const MIN_SOURCES_FOR_VERIFICATION: usize = 2;

// ============================================================================
// Sources
// ============================================================================

/// Extraction technique that produced a candidate result
///
/// Declaration order is the fixed tie-break priority (api highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Api,
    Markdown,
    Dom,
    Geometric,
    Ocr,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Api,
        SourceKind::Markdown,
        SourceKind::Dom,
        SourceKind::Geometric,
        SourceKind::Ocr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Api => "api",
            SourceKind::Markdown => "markdown",
            SourceKind::Dom => "dom",
            SourceKind::Geometric => "geometric",
            SourceKind::Ocr => "ocr",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entries
// ============================================================================

/// One leaderboard row as reported by a single strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub username: String,
    pub wager: f64,
    pub prize: f64,
    pub source: SourceKind,
}

impl LeaderboardEntry {
    pub fn new(
        rank: u32,
        username: impl Into<String>,
        wager: f64,
        prize: f64,
        source: SourceKind,
    ) -> Self {
        Self {
            rank,
            username: username.into(),
            wager,
            prize,
            source,
        }
    }

    /// Cross-source identity of this row
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.rank, self.wager)
    }
}

/// `rank|wager` key used to line entries up across sources
///
/// Usernames are not part of the key: sources mask them inconsistently
/// (`Joh***` vs `John123`). Wager is compared at cent precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub rank: u32,
    pub wager_cents: i64,
}

impl EntryKey {
    pub fn new(rank: u32, wager: f64) -> Self {
        Self {
            rank,
            wager_cents: (wager * 100.0).round() as i64,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wager_cents % 100 == 0 {
            write!(f, "{}|{}", self.rank, self.wager_cents / 100)
        } else {
            write!(f, "{}|{:.2}", self.rank, self.wager_cents as f64 / 100.0)
        }
    }
}

/// Prize table row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrizeEntry {
    pub rank: u32,
    pub prize: f64,
}

/// Candidate result produced by one strategy
///
/// Confidence is strategy-local (0-100); the fusion engine adjusts it
/// before comparing across strategy types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResult {
    pub entries: Vec<LeaderboardEntry>,
    pub prizes: Vec<PrizeEntry>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_prize_pool: Option<f64>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl StrategyResult {
    pub fn new(entries: Vec<LeaderboardEntry>, confidence: f64) -> Self {
        Self {
            entries,
            confidence,
            ..Default::default()
        }
    }

    pub fn with_prizes(mut self, prizes: Vec<PrizeEntry>) -> Self {
        self.prizes = prizes;
        self
    }

    pub fn with_total_prize_pool(mut self, total: Option<f64>) -> Self {
        self.total_prize_pool = total;
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn max_rank(&self) -> u32 {
        self.entries.iter().map(|e| e.rank).max().unwrap_or(0)
    }

    /// The entry this strategy reports at rank 1, if any
    pub fn rank_one(&self) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|e| e.rank == 1)
    }
}

// ============================================================================
// Cross-validation
// ============================================================================

/// Agreement classification for one entry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Agreed,
    Disputed,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryAgreement {
    pub status: EntryStatus,
    /// Normalized username reported under this key (first source wins)
    pub username: String,
    pub sources: Vec<SourceKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossValidationReport {
    /// Agreed keys over all cross-referenced keys (0.0-1.0)
    pub overall_agreement: f64,
    /// Keyed by `rank|wager` entry key
    pub entry_agreement: BTreeMap<String, EntryAgreement>,
    pub recommended_source: SourceKind,
    pub confidence_adjustment: f64,
}

impl CrossValidationReport {
    pub fn status_of(&self, key: &EntryKey) -> Option<EntryStatus> {
        self.entry_agreement.get(&key.to_string()).map(|a| a.status)
    }
}

// ============================================================================
// Fused output
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    SingleSource,
    Verified,
    Disputed,
}

/// Entry field for provenance tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryField {
    Rank,
    Username,
    Wager,
    Prize,
}

/// Source that supplied the winning value of a field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSource {
    pub source: SourceKind,
    pub confidence: f64,
}

/// Provenance attached to every fused entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionProvenance {
    pub sources: Vec<SourceKind>,
    /// 1.0 agreed, 0.5 disputed, 0.0 otherwise
    pub agreement_score: f64,
    pub verification_status: VerificationStatus,
    pub field_sources: BTreeMap<EntryField, FieldSource>,
    /// Prize came from the fused prize table rather than the row itself
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub prize_injected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedEntry {
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
    #[serde(rename = "_fusion")]
    pub fusion: FusionProvenance,
}

impl FusedEntry {
    pub fn is_multi_source(&self) -> bool {
        self.fusion.sources.len() >= 2
    }

    /// Highest confidence among the field winners
    pub fn best_field_confidence(&self) -> f64 {
        self.fusion
            .field_sources
            .values()
            .map(|f| f.confidence)
            .fold(0.0, f64::max)
    }
}

/// Per-source summary of what entered the merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub entry_count: usize,
    pub prize_count: usize,
    pub confidence: f64,
}

/// Why a source did not take part in the merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    Failed,
    Empty,
    BelowThreshold,
    Stale,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscardedSource {
    pub source: SourceKind,
    pub reason: DiscardReason,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionMetadata {
    pub fused_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub sources_used: Vec<SourceKind>,
    pub source_count: usize,
    #[serde(default)]
    pub discarded_sources: Vec<DiscardedSource>,
}

/// Terminal artifact handed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedResult {
    pub entries: Vec<FusedEntry>,
    pub prizes: Vec<PrizeEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_prize_pool: Option<f64>,
    pub confidence: f64,
    /// Winning source, or "none" when nothing usable was extracted
    #[serde(with = "extraction_method")]
    pub extraction_method: Option<SourceKind>,
    pub cross_validation: Option<CrossValidationReport>,
    pub source_breakdown: BTreeMap<SourceKind, SourceSummary>,
    pub metadata: FusionMetadata,
    pub errors: Vec<String>,
}

impl FusedResult {
    /// Explicit "ran but found nothing" result
    pub fn empty(run_id: Uuid, discarded: Vec<DiscardedSource>, errors: Vec<String>) -> Self {
        Self {
            entries: Vec::new(),
            prizes: Vec::new(),
            total_prize_pool: None,
            confidence: 0.0,
            extraction_method: None,
            cross_validation: None,
            source_breakdown: BTreeMap::new(),
            metadata: FusionMetadata {
                fused_at: Utc::now(),
                run_id,
                sources_used: Vec::new(),
                source_count: 0,
                discarded_sources: discarded,
            },
            errors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

mod extraction_method {
    use super::SourceKind;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<SourceKind>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.map(|k| k.as_str()).unwrap_or("none"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SourceKind>, D::Error> {
        let raw = String::deserialize(d)?;
        if raw == "none" {
            return Ok(None);
        }
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown extraction method '{}'", raw)))
    }
}

// ============================================================================
// External inputs
// ============================================================================

/// Money column order learned by the vision teacher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnOrder {
    PrizeBeforeWager,
    WagerBeforePrize,
    WagerOnly,
}

/// Visual order of the top-three podium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodiumLayout {
    CenterFirst,
    LeftToRight,
    NoPodium,
}

/// Rank-1 values observed out-of-band by the vision teacher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRank1 {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub wager: Option<f64>,
    #[serde(default)]
    pub prize: Option<f64>,
}

/// Layout hints from the external vision/teacher service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeacherHints {
    #[serde(default)]
    pub column_order: Option<ColumnOrder>,
    #[serde(default)]
    pub podium_layout: Option<PodiumLayout>,
    #[serde(default, rename = "expectedRank1")]
    pub expected_rank1: Option<ExpectedRank1>,
}

/// Per-site pattern learned from earlier runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearnedPattern {
    pub preferred_source: Option<SourceKind>,
    pub expected_entries: Option<usize>,
    /// Semantic field ("username", "wager", "prize", "rank") -> site JSON field name
    pub field_mappings: HashMap<String, String>,
}

/// Result of the teacher's LLM verification of a fused result
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeacherVerification {
    pub verified: bool,
    pub confidence: Option<f64>,
}

// ============================================================================
// Quality report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Completeness,
    SourceAgreement,
    Validity,
    HistoricalConsistency,
    PatternMatch,
    TeacherVerification,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 6] = [
        QualityDimension::Completeness,
        QualityDimension::SourceAgreement,
        QualityDimension::Validity,
        QualityDimension::HistoricalConsistency,
        QualityDimension::PatternMatch,
        QualityDimension::TeacherVerification,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    NonMonotonicWager,
    NonSequentialRanks,
    WagerOutlier,
    DuplicateUsername,
    AllZeroWagers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    LowAgreement,
    Incomplete,
    HistoricalDrift,
    InvalidData,
    PatternMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFlag {
    #[serde(rename = "type")]
    pub kind: FlagKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityStatus {
    Pass,
    Warning,
    Fail,
}

impl fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityStatus::Pass => write!(f, "Pass"),
            QualityStatus::Warning => write!(f, "Warning"),
            QualityStatus::Fail => write!(f, "Fail"),
        }
    }
}

/// Post-hoc grade of one fused result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScoreReport {
    /// Weighted overall score (0-100, rounded)
    pub overall: f64,
    pub status: QualityStatus,
    pub breakdown: BTreeMap<QualityDimension, f64>,
    pub weights: BTreeMap<QualityDimension, f64>,
    pub anomalies: Vec<Anomaly>,
    pub flags: Vec<QualityFlag>,
    pub recommendations: Vec<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_key_display() {
        assert_eq!(EntryKey::new(1, 50000.0).to_string(), "1|50000");
        assert_eq!(EntryKey::new(3, 12.5).to_string(), "3|12.50");
        assert_eq!(EntryKey::new(2, 99.999), EntryKey::new(2, 100.0));
    }

    #[test]
    fn test_source_kind_order_is_priority() {
        let mut kinds = vec![SourceKind::Ocr, SourceKind::Dom, SourceKind::Api, SourceKind::Markdown];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![SourceKind::Api, SourceKind::Markdown, SourceKind::Dom, SourceKind::Ocr]
        );
    }

    #[test]
    fn test_fused_entry_serializes_provenance_as_fusion_field() {
        let mut field_sources = BTreeMap::new();
        field_sources.insert(
            EntryField::Wager,
            FieldSource {
                source: SourceKind::Api,
                confidence: 90.0,
            },
        );
        let fused = FusedEntry {
            entry: LeaderboardEntry::new(1, "alice", 100.0, 50.0, SourceKind::Api),
            fusion: FusionProvenance {
                sources: vec![SourceKind::Api],
                agreement_score: 0.0,
                verification_status: VerificationStatus::SingleSource,
                field_sources,
                prize_injected: false,
            },
        };

        let json = serde_json::to_value(&fused).unwrap();
        assert_eq!(json["rank"], 1);
        assert_eq!(json["source"], "api");
        assert_eq!(json["_fusion"]["verificationStatus"], "single_source");
        assert_eq!(json["_fusion"]["fieldSources"]["wager"]["source"], "api");
        assert!(json["_fusion"].get("prizeInjected").is_none());
    }

    #[test]
    fn test_empty_result_reports_none_method() {
        let result = FusedResult::empty(Uuid::new_v4(), vec![], vec![]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["extractionMethod"], "none");

        let back: FusedResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.extraction_method, None);
    }

    #[test]
    fn test_teacher_hints_wire_names() {
        let hints: TeacherHints = serde_json::from_str(
            r#"{"column_order":"prize_before_wager","podium_layout":"center_first",
                "expectedRank1":{"username":"top","wager":50000,"prize":1000}}"#,
        )
        .unwrap();
        assert_eq!(hints.column_order, Some(ColumnOrder::PrizeBeforeWager));
        assert_eq!(hints.podium_layout, Some(PodiumLayout::CenterFirst));
        assert_eq!(hints.expected_rank1.unwrap().wager, Some(50000.0));
    }
}
