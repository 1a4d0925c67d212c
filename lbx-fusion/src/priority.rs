//! Source priority policies
//!
//! Priority used to serve three purposes at once. They are kept apart:
//! - [`ExecutionHint`]: when a strategy may be scheduled
//! - [`compare_priority`] / [`pick_best`]: tie-break between sources
//! - [`crate::config::FallbackMode`]: legacy first-match mode

use crate::types::SourceKind;
use std::cmp::Ordering;

/// Scheduling hint a strategy gives the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionHint {
    /// Runs alongside every other concurrent strategy
    #[default]
    Concurrent,
    /// Runs only after all concurrent strategies completed (join barrier),
    /// and may be skipped based on their results
    AfterBarrier,
}

impl SourceKind {
    /// Fixed tie-break rank, 0 is highest (`api > markdown > dom > geometric > ocr`)
    pub fn priority(&self) -> u8 {
        match self {
            SourceKind::Api => 0,
            SourceKind::Markdown => 1,
            SourceKind::Dom => 2,
            SourceKind::Geometric => 3,
            SourceKind::Ocr => 4,
        }
    }
}

/// `Ordering::Greater` when `a` wins the tie-break over `b`
pub fn compare_priority(a: SourceKind, b: SourceKind) -> Ordering {
    b.priority().cmp(&a.priority())
}

/// Highest score wins; equal scores fall back to source priority
pub fn pick_best<I>(candidates: I) -> Option<SourceKind>
where
    I: IntoIterator<Item = (SourceKind, f64)>,
{
    candidates
        .into_iter()
        .max_by(|(ka, sa), (kb, sb)| {
            sa.partial_cmp(sb)
                .unwrap_or(Ordering::Equal) // Treat NaN as equal
                .then_with(|| compare_priority(*ka, *kb))
        })
        .map(|(kind, _)| kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert_eq!(compare_priority(SourceKind::Api, SourceKind::Ocr), Ordering::Greater);
        assert_eq!(compare_priority(SourceKind::Dom, SourceKind::Markdown), Ordering::Less);
        assert_eq!(compare_priority(SourceKind::Dom, SourceKind::Dom), Ordering::Equal);
    }

    #[test]
    fn test_pick_best_by_score_then_priority() {
        let best = pick_best(vec![(SourceKind::Dom, 90.0), (SourceKind::Api, 80.0)]);
        assert_eq!(best, Some(SourceKind::Dom));

        let tied = pick_best(vec![
            (SourceKind::Ocr, 80.0),
            (SourceKind::Markdown, 80.0),
            (SourceKind::Geometric, 80.0),
        ]);
        assert_eq!(tied, Some(SourceKind::Markdown));

        assert_eq!(pick_best(Vec::<(SourceKind, f64)>::new()), None);
    }
}
