//! Page capture input and collaborator interfaces
//!
//! The page-automation layer fills a [`PageCapture`] once per scrape cycle.
//! Strategies only read it; the fusion engine is the only writer, and only
//! to inject [`SiteHints`] before strategies run.

use crate::error::ExtractionResult;
use crate::types::{ColumnOrder, ExpectedRank1, LearnedPattern, PodiumLayout, TeacherHints};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Raw JSON body observed on the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub url: String,
    pub body: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Text box with its rendered position (CSS pixels)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl TextBox {
    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

/// Live page handle owned by the page-automation collaborator
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Cell texts of every table-like row, in document order
    async fn table_rows(&self) -> ExtractionResult<Vec<Vec<String>>>;

    /// Every visible text node with its bounding box
    async fn text_boxes(&self) -> ExtractionResult<Vec<TextBox>>;
}

/// Optical character recognition collaborator
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> ExtractionResult<String>;
}

/// Site-specific hints injected by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteHints {
    pub column_order: Option<ColumnOrder>,
    pub podium_layout: Option<PodiumLayout>,
    pub expected_rank1: Option<ExpectedRank1>,
    /// Semantic field -> site JSON field name
    pub field_mappings: HashMap<String, String>,
}

impl SiteHints {
    pub fn from_sources(teacher: Option<&TeacherHints>, learned: Option<&LearnedPattern>) -> Self {
        Self {
            column_order: teacher.and_then(|t| t.column_order),
            podium_layout: teacher.and_then(|t| t.podium_layout),
            expected_rank1: teacher.and_then(|t| t.expected_rank1.clone()),
            field_mappings: learned
                .map(|l| l.field_mappings.clone())
                .unwrap_or_default(),
        }
    }
}

/// Everything captured from one page load
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageCapture {
    pub html: String,
    pub markdown: String,
    pub api_calls: Vec<String>,
    pub api_responses: Vec<ApiResponse>,
    /// Name of the leaderboard being scraped (e.g. "stake monthly")
    pub leaderboard_name: Option<String>,
    #[serde(skip)]
    pub screenshot: Option<Arc<[u8]>>,
    #[serde(skip)]
    pub page: Option<Arc<dyn PageHandle>>,
    #[serde(skip)]
    pub hints: SiteHints,
}

impl PageCapture {
    pub fn with_page(mut self, page: Arc<dyn PageHandle>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = Some(bytes.into());
        self
    }
}

impl fmt::Debug for PageCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCapture")
            .field("html_len", &self.html.len())
            .field("markdown_len", &self.markdown.len())
            .field("api_calls", &self.api_calls.len())
            .field("api_responses", &self.api_responses.len())
            .field("leaderboard_name", &self.leaderboard_name)
            .field("screenshot", &self.screenshot.as_ref().map(|s| s.len()))
            .field("page", &self.page.is_some())
            .field("hints", &self.hints)
            .finish()
    }
}
