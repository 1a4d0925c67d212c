// Stale Source Detection
//
// An API response can be cached or belong to another period while the
// rendered page shows the live board. When the API and markdown results
// share no wager value (within tolerance), the API result is dropped unless
// it is the larger of the two.

use crate::types::{SourceKind, StrategyResult};
use std::collections::BTreeMap;

fn wagers(result: &StrategyResult) -> Vec<f64> {
    result
        .entries
        .iter()
        .map(|e| e.wager)
        .filter(|w| *w > 0.0)
        .collect()
}

/// Whether `a` and `b` are equal within a relative tolerance
pub fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * a.abs().max(b.abs())
}

/// Number of API wagers matching some markdown wager
pub fn matching_wagers(api: &StrategyResult, markdown: &StrategyResult, tolerance: f64) -> usize {
    let markdown_wagers = wagers(markdown);
    wagers(api)
        .into_iter()
        .filter(|w| markdown_wagers.iter().any(|m| within_tolerance(*w, *m, tolerance)))
        .count()
}

/// Reason the API result should be treated as stale, if it should
///
/// Zero wagers carry no period information and are ignored; when either side
/// has no non-zero wager there is nothing to compare and the API is kept.
pub fn detect_stale_api(
    results: &BTreeMap<SourceKind, StrategyResult>,
    tolerance: f64,
) -> Option<String> {
    let api = results.get(&SourceKind::Api)?;
    let markdown = results.get(&SourceKind::Markdown)?;
    if wagers(api).is_empty() || wagers(markdown).is_empty() {
        return None;
    }

    if matching_wagers(api, markdown, tolerance) > 0 {
        return None;
    }
    if api.entries.len() > markdown.entries.len() {
        // More complete than the text; the markdown parse may be truncated
        return None;
    }

    Some(format!(
        "no API wager within {:.1}% of a markdown wager ({} API vs {} markdown entries)",
        tolerance * 100.0,
        api.entries.len(),
        markdown.entries.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LeaderboardEntry;

    fn result(source: SourceKind, wagers: &[f64]) -> StrategyResult {
        StrategyResult::new(
            wagers
                .iter()
                .enumerate()
                .map(|(i, w)| LeaderboardEntry::new(i as u32 + 1, format!("u{}", i), *w, 0.0, source))
                .collect(),
            80.0,
        )
    }

    fn pair(api: &[f64], markdown: &[f64]) -> BTreeMap<SourceKind, StrategyResult> {
        [
            (SourceKind::Api, result(SourceKind::Api, api)),
            (SourceKind::Markdown, result(SourceKind::Markdown, markdown)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_no_overlap_smaller_api_is_stale() {
        let results = pair(&[500.0, 400.0], &[900.0, 800.0, 700.0]);
        assert!(detect_stale_api(&results, 0.01).is_some());
    }

    #[test]
    fn test_near_match_keeps_api() {
        // 1004 is within 1% of 1000
        let results = pair(&[1004.0, 400.0], &[1000.0, 800.0, 700.0]);
        assert!(detect_stale_api(&results, 0.01).is_none());
        assert_eq!(matching_wagers(&results[&SourceKind::Api], &results[&SourceKind::Markdown], 0.01), 1);
    }

    #[test]
    fn test_larger_api_is_kept() {
        let results = pair(&[500.0, 400.0, 300.0, 200.0], &[900.0, 800.0]);
        assert!(detect_stale_api(&results, 0.01).is_none());
    }

    #[test]
    fn test_needs_both_sources_with_wagers() {
        let mut results = pair(&[500.0], &[0.0, 0.0]);
        assert!(detect_stale_api(&results, 0.01).is_none());
        results.remove(&SourceKind::Markdown);
        assert!(detect_stale_api(&results, 0.01).is_none());
    }
}
