// Response Pre-Processing
//
// Runs before any strategy sees the capture:
// - responses from other leaderboards on the same site (previous month,
//   archive) are discarded by URL or body markers
// - paginated responses of the same leaderboard are merged into one body

use crate::capture::{ApiResponse, PageCapture};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info};

/// Query parameters that only select a page of the same leaderboard
const PAGINATION_PARAMS: &[&str] = &[
    "page", "offset", "limit", "cursor", "skip", "per_page", "perpage", "pagesize", "page_size",
];

/// Top-level body fields that name the board or period
const SIGNATURE_FIELDS: &[&str] = &["period", "type", "name", "title", "status", "range"];

const MAX_ARRAY_DEPTH: usize = 6;

/// What pre-processing changed
#[derive(Debug, Default)]
pub struct PreprocessReport {
    pub discarded_urls: Vec<String>,
    pub merged_pages: usize,
}

/// URL without fragment and pagination parameters
pub fn leaderboard_identity(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let Some((base, query)) = without_fragment.split_once('?') else {
        return without_fragment.to_string();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("").to_ascii_lowercase();
            !PAGINATION_PARAMS.contains(&key.as_str())
        })
        .collect();
    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, kept.join("&"))
    }
}

/// Keyword marking `response` as another leaderboard, if any
///
/// A keyword that also appears in the scraped leaderboard's own name is
/// ignored (scraping "previous month" on purpose).
pub fn alternate_marker<'a>(
    response: &ApiResponse,
    keywords: &'a [String],
    leaderboard_name: Option<&str>,
) -> Option<&'a str> {
    let own_name = leaderboard_name.unwrap_or("").to_ascii_lowercase();
    let url = response.url.to_ascii_lowercase();
    let signature: Vec<String> = match &response.body {
        Value::Object(map) => SIGNATURE_FIELDS
            .iter()
            .filter_map(|field| map.get(*field).and_then(Value::as_str))
            .map(|s| s.to_ascii_lowercase())
            .collect(),
        _ => Vec::new(),
    };

    keywords
        .iter()
        .map(|k| k.as_str())
        .filter(|k| !k.is_empty())
        .find(|keyword| {
            let keyword_lower = keyword.to_ascii_lowercase();
            !own_name.contains(&keyword_lower)
                && (url.contains(&keyword_lower) || signature.iter().any(|s| s.contains(&keyword_lower)))
        })
}

fn escape_pointer_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// JSON pointer and length of the largest array of objects
fn largest_object_array(value: &Value, pointer: String, depth: usize) -> Option<(String, usize)> {
    if depth > MAX_ARRAY_DEPTH {
        return None;
    }
    match value {
        Value::Array(items) => {
            let objects = items.iter().filter(|i| i.is_object()).count();
            let own = (objects > 0).then(|| (pointer.clone(), objects));
            let nested = items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| largest_object_array(item, format!("{}/{}", pointer, i), depth + 1));
            own.into_iter().chain(nested).max_by_key(|(_, len)| *len)
        }
        Value::Object(map) => map
            .iter()
            .filter_map(|(key, child)| {
                largest_object_array(child, format!("{}/{}", pointer, escape_pointer_token(key)), depth + 1)
            })
            .max_by_key(|(_, len)| *len),
        _ => None,
    }
}

/// Append the row array of every later page into the first page's body
fn merge_group(mut pages: Vec<ApiResponse>) -> ApiResponse {
    let mut base = pages.remove(0);
    let Some((base_pointer, _)) = largest_object_array(&base.body, String::new(), 0) else {
        return base;
    };

    for page in pages {
        if let (Some(ts), Some(base_ts)) = (page.timestamp, base.timestamp) {
            base.timestamp = Some(base_ts.max(ts));
        }
        let Some((pointer, _)) = largest_object_array(&page.body, String::new(), 0) else {
            continue;
        };
        let Some(Value::Array(rows)) = page.body.pointer(&pointer) else {
            continue;
        };
        if let Some(Value::Array(target)) = base.body.pointer_mut(&base_pointer) {
            for row in rows {
                if !target.contains(row) {
                    target.push(row.clone());
                }
            }
        }
    }
    base
}

/// Filter alternate leaderboards and merge paginated responses
pub fn preprocess_responses(
    responses: &[ApiResponse],
    keywords: &[String],
    leaderboard_name: Option<&str>,
) -> (Vec<ApiResponse>, PreprocessReport) {
    let mut report = PreprocessReport::default();

    let mut groups: Vec<(String, Vec<ApiResponse>)> = Vec::new();
    for response in responses {
        if let Some(keyword) = alternate_marker(response, keywords, leaderboard_name) {
            info!(url = %response.url, keyword, "Discarding response from another leaderboard");
            report.discarded_urls.push(response.url.clone());
            continue;
        }
        let identity = leaderboard_identity(&response.url);
        match groups.iter_mut().find(|(id, _)| *id == identity) {
            Some((_, pages)) => pages.push(response.clone()),
            None => groups.push((identity, vec![response.clone()])),
        }
    }

    let merged = groups
        .into_iter()
        .map(|(identity, mut pages)| {
            // Identical re-fetches are not pages
            let mut seen = HashSet::new();
            pages.retain(|p| seen.insert(p.body.to_string()));
            if pages.len() > 1 {
                debug!(identity = %identity, pages = pages.len(), "Merging paginated responses");
                report.merged_pages += pages.len() - 1;
            }
            merge_group(pages)
        })
        .collect();

    (merged, report)
}

/// Capture copy with pre-processed responses
pub fn preprocess(capture: &PageCapture, keywords: &[String]) -> (PageCapture, PreprocessReport) {
    let (responses, report) = preprocess_responses(
        &capture.api_responses,
        keywords,
        capture.leaderboard_name.as_deref(),
    );
    let mut prepared = capture.clone();
    prepared.api_responses = responses;
    (prepared, report)
}
