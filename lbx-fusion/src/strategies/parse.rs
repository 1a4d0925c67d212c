//! Shared row parsing helpers
//!
//! Money/rank/username recognition used by every text-based strategy, plus
//! the entry normalisation the registry applies to every strategy result.

use crate::types::{ColumnOrder, LeaderboardEntry, SourceKind, MAX_USERNAME_CHARS};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static MONEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*([kmb])?\b").expect("valid money regex")
});

static RANK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:#|no\.?\s*)?\s*(\d{1,4})\s*(?:st|nd|rd|th|\.|\))?\s*$")
        .expect("valid rank regex")
});

/// Money token inside free text: must start at a word boundary and carry a
/// currency symbol, a thousands separator, a decimal part or a K/M suffix
static MONEY_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s|:(])([$€£¥]\s?\d[\d,]*(?:\.\d+)?(?:\s?[km]\b)?|\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?\s?[km]\b|\d+\.\d+)",
    )
    .expect("valid money token regex")
});

const CURRENCY_CHARS: [char; 4] = ['$', '€', '£', '¥'];

/// Parse a money amount: `$1,234.56`, `1.2K`, `3M`, `€ 900`
pub fn parse_money(text: &str) -> Option<f64> {
    let caps = MONEY_RE.captures(text)?;
    let number: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(s) if s == "k" => 1_000.0,
        Some(s) if s == "m" => 1_000_000.0,
        Some(s) if s == "b" => 1_000_000_000.0,
        _ => 1.0,
    };
    let value = number * multiplier;
    value.is_finite().then_some(value)
}

/// Parse a rank cell: `1`, `#1`, `1st`, `2.`, medal emoji
pub fn parse_rank(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    match trimmed {
        "🥇" => return Some(1),
        "🥈" => return Some(2),
        "🥉" => return Some(3),
        _ => {}
    }
    let caps = RANK_RE.captures(trimmed)?;
    let rank: u32 = caps.get(1)?.as_str().parse().ok()?;
    (rank > 0).then_some(rank)
}

/// Whether a cell reads as an amount rather than a name
pub fn looks_like_money(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    if trimmed.contains(CURRENCY_CHARS) {
        return true;
    }
    // Digits plus separators and an optional K/M/B suffix only
    let body = trimmed.trim_end_matches(|c: char| matches!(c, 'k' | 'K' | 'm' | 'M' | 'b' | 'B'));
    body.chars()
        .all(|c| c.is_ascii_digit() || c == ',' || c == '.' || c.is_whitespace())
}

/// Trim, strip a leading `@`, collapse whitespace, cap length
pub fn clean_username(text: &str) -> Option<String> {
    let collapsed = text
        .trim()
        .trim_start_matches('@')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.is_empty() {
        return None;
    }
    // Masked names like "***" still carry a slot; require some visible char
    if !collapsed.chars().any(|c| c.is_alphanumeric() || c == '*') {
        return None;
    }
    Some(collapsed.chars().take(MAX_USERNAME_CHARS).collect())
}

/// Case-fold and strip non-alphanumerics (`Joh***` -> `joh`)
pub fn normalize_username(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Whether the raw name carries masking characters
pub fn is_masked(name: &str) -> bool {
    name.contains('*') || name.contains('•')
}

/// Visible characters a masked name needs before it can match anything
const MIN_MASKED_PREFIX: usize = 3;

/// Highest rank accepted from any source
pub const MAX_RANK: u32 = 100_000;

/// `raw` is masked and its visible prefix starts `other`
fn masked_prefix_matches(raw: &str, visible: &str, other: &str) -> bool {
    is_masked(raw) && visible.chars().count() >= MIN_MASKED_PREFIX && other.starts_with(visible)
}

/// Lower-priority username agreement hint
///
/// Equal after normalisation, or a masked name (`Joh***`) whose visible
/// prefix of at least three characters starts the other name.
pub fn usernames_compatible(a: &str, b: &str) -> bool {
    let na = normalize_username(a);
    let nb = normalize_username(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    na == nb || masked_prefix_matches(a, &na, &nb) || masked_prefix_matches(b, &nb, &na)
}

/// One parsed row before rank normalisation
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub entry: LeaderboardEntry,
    /// The rank came from the row itself rather than its position
    pub explicit_rank: bool,
}

/// Assign money values to wager/prize by column order
fn assign_money(values: &[f64], column_order: Option<ColumnOrder>) -> (f64, f64) {
    match (column_order, values) {
        (_, []) => (0.0, 0.0),
        (_, [only]) => (*only, 0.0),
        (Some(ColumnOrder::WagerOnly), [wager, ..]) => (*wager, 0.0),
        (Some(ColumnOrder::PrizeBeforeWager), [prize, wager, ..]) => (*wager, *prize),
        (_, [wager, prize, ..]) => (*wager, *prize),
    }
}

/// Parse one row of cell texts
///
/// `fallback_rank` is used when no cell reads as a rank.
pub fn parse_row_cells(
    cells: &[String],
    column_order: Option<ColumnOrder>,
    source: SourceKind,
    fallback_rank: u32,
) -> Option<ParsedRow> {
    let mut rank = None;
    let mut username = None;
    let mut money = Vec::new();

    for cell in cells {
        let text = cell.trim();
        if text.is_empty() {
            continue;
        }
        if rank.is_none() && username.is_none() && money.is_empty() {
            if let Some(r) = parse_rank(text) {
                rank = Some(r);
                continue;
            }
        }
        if looks_like_money(text) {
            if let Some(value) = parse_money(text) {
                money.push(value);
            }
            continue;
        }
        if username.is_none() {
            username = clean_username(text);
        }
    }

    let username = username?;
    let (wager, prize) = assign_money(&money, column_order);
    Some(ParsedRow {
        explicit_rank: rank.is_some(),
        entry: LeaderboardEntry::new(rank.unwrap_or(fallback_rank), username, wager, prize, source),
    })
}

/// Parse one free-text line: `1. alice - $12,345 wagered - $500`
pub fn parse_text_line(
    line: &str,
    column_order: Option<ColumnOrder>,
    source: SourceKind,
    fallback_rank: u32,
) -> Option<ParsedRow> {
    static LEADING_RANK_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\s*(?:[-*]\s+)?#?(\d{1,4})(?:st|nd|rd|th)?[.):]?\s+(.+)$")
            .expect("valid leading rank regex")
    });

    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (rank, rest) = match LEADING_RANK_RE.captures(line) {
        Some(caps) => (
            caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()),
            caps.get(2).map(|m| m.as_str()).unwrap_or(""),
        ),
        None => (None, line),
    };

    let first_money = MONEY_TOKEN_RE.captures(rest)?.get(1)?.start();
    let values: Vec<f64> = MONEY_TOKEN_RE
        .captures_iter(rest)
        .filter_map(|c| c.get(1))
        .filter_map(|m| parse_money(m.as_str()))
        .collect();

    let name_part = rest[..first_money]
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '|' | ':' | '·' | '(' | '—'));
    let username = clean_username(name_part)?;
    if parse_rank(&username).is_some() {
        return None;
    }

    let (wager, prize) = assign_money(&values, column_order);
    Some(ParsedRow {
        explicit_rank: rank.is_some(),
        entry: LeaderboardEntry::new(
            rank.filter(|r| *r > 0).unwrap_or(fallback_rank),
            username,
            wager,
            prize,
            source,
        ),
    })
}

/// Enforce the per-result entry invariants
///
/// Drops rows without a usable username or with non-finite numbers, clamps
/// negative money to 0, caps username length. Ranks must be unique: if any
/// rank is 0 or repeated, rows are renumbered in descending-wager order
/// starting at the smallest reported rank. Unique ranks are only sorted;
/// gaps are kept because partial captures are legitimate.
pub fn sanitize_entries(entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    let mut cleaned: Vec<LeaderboardEntry> = entries
        .into_iter()
        .filter(|e| e.wager.is_finite() && e.prize.is_finite())
        .filter_map(|mut e| {
            e.username = clean_username(&e.username)?;
            e.wager = e.wager.max(0.0);
            e.prize = e.prize.max(0.0);
            Some(e)
        })
        .collect();

    let mut seen = HashSet::new();
    let needs_renumber = cleaned.iter().any(|e| e.rank == 0 || !seen.insert(e.rank));

    if needs_renumber {
        let count = u32::try_from(cleaned.len()).unwrap_or(u32::MAX);
        // Restart at 1 when the reported ranks leave no room to renumber
        let start = cleaned
            .iter()
            .map(|e| e.rank)
            .filter(|r| *r > 0)
            .min()
            .filter(|start| start.checked_add(count).is_some())
            .unwrap_or(1);
        cleaned.sort_by(|a, b| b.wager.partial_cmp(&a.wager).unwrap_or(std::cmp::Ordering::Equal));
        for (i, entry) in cleaned.iter_mut().enumerate() {
            entry.rank = start.saturating_add(u32::try_from(i).unwrap_or(u32::MAX));
        }
    } else {
        cleaned.sort_by_key(|e| e.rank);
    }

    cleaned
}

/// Ranks are exactly 1..=N in order
pub fn ranks_sequential(entries: &[LeaderboardEntry]) -> bool {
    entries
        .iter()
        .enumerate()
        .all(|(i, e)| e.rank as usize == i + 1)
}

/// Self-assessed confidence shared by the text strategies
pub fn score_confidence(base: f64, entries: &[LeaderboardEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    let mut score = base;
    if entries.len() >= 5 && ranks_sequential(entries) {
        score += 5.0;
    }
    if entries.iter().all(|e| e.wager == 0.0) {
        score -= 15.0;
    }
    if entries.len() < 3 {
        score -= 10.0;
    }
    score.clamp(0.0, 100.0)
}
