//! Bounded structural search over arbitrary JSON bodies
//!
//! Leaderboard APIs nest their rows under unpredictable keys and name the
//! same field a dozen ways. The search walks the tree (depth and node
//! budget bounded), scores every array of objects by how many elements
//! resolve a username and a wager, and maps fields through ranked synonym
//! lists. Learned per-site field mappings are tried before the synonyms.

use super::parse::{clean_username, parse_money, parse_rank, MAX_RANK};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Deepest nesting level inspected
pub const MAX_DEPTH: usize = 6;

/// Upper bound on visited nodes per body
pub const MAX_NODES: usize = 20_000;

/// Semantic field an entry needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticField {
    Username,
    Wager,
    Prize,
    Rank,
}

impl SemanticField {
    pub fn key(&self) -> &'static str {
        match self {
            SemanticField::Username => "username",
            SemanticField::Wager => "wager",
            SemanticField::Prize => "prize",
            SemanticField::Rank => "rank",
        }
    }

    /// Known field names, most specific first
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            SemanticField::Username => &[
                "username",
                "userName",
                "user_name",
                "displayName",
                "display_name",
                "nickname",
                "nickName",
                "name",
                "player",
                "playerName",
                "login",
                "handle",
                "user",
            ],
            SemanticField::Wager => &[
                "wagered",
                "wager",
                "wageredAmount",
                "wagered_amount",
                "totalWagered",
                "total_wagered",
                "wagerAmount",
                "wager_amount",
                "totalWager",
                "volume",
                "amount",
                "points",
                "score",
                "value",
            ],
            SemanticField::Prize => &[
                "prize",
                "prizeAmount",
                "prize_amount",
                "reward",
                "rewardAmount",
                "payout",
                "winnings",
                "award",
            ],
            SemanticField::Rank => &["rank", "position", "place", "pos", "rankPosition", "standing"],
        }
    }
}

const PRIZE_TABLE_KEYS: &[&str] = &[
    "prizes",
    "rewards",
    "prizeDistribution",
    "prize_distribution",
    "prizeTable",
    "payouts",
];

const PRIZE_POOL_KEYS: &[&str] = &[
    "totalPrizePool",
    "total_prize_pool",
    "prizePool",
    "prize_pool",
    "totalPrize",
    "total_prize",
    "totalRewards",
];

/// Row located by the search, before rank assignment
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub rank: Option<u32>,
    pub username: String,
    pub wager: f64,
    pub prize: f64,
}

/// Field name candidates: learned mapping first, then synonyms
fn candidates(field: SemanticField, mappings: &HashMap<String, String>) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    if let Some(mapped) = mappings.get(field.key()) {
        names.push(mapped.as_str());
    }
    names.extend(field.synonyms().iter().copied());
    names
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_money(s),
        _ => None,
    }
}

/// Look a field up on the object, then one level down in nested objects
/// (`{"user": {"name": ...}}`)
fn lookup<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    for name in names {
        if let Some(v) = obj.get(*name) {
            if !v.is_null() && !v.is_object() {
                return Some(v);
            }
        }
    }
    for name in names {
        if let Some(Value::Object(inner)) = obj.get(*name) {
            for inner_name in names {
                if let Some(v) = inner.get(*inner_name) {
                    if !v.is_null() && !v.is_object() {
                        return Some(v);
                    }
                }
            }
        }
    }
    None
}

fn username_of(obj: &Map<String, Value>, mappings: &HashMap<String, String>) -> Option<String> {
    let names = candidates(SemanticField::Username, mappings);
    match lookup(obj, &names)? {
        Value::String(s) => clean_username(s),
        _ => None,
    }
}

fn field_number(
    obj: &Map<String, Value>,
    field: SemanticField,
    mappings: &HashMap<String, String>,
) -> Option<f64> {
    let names = candidates(field, mappings);
    lookup(obj, &names).and_then(number_of)
}

fn rank_of(obj: &Map<String, Value>, mappings: &HashMap<String, String>) -> Option<u32> {
    let names = candidates(SemanticField::Rank, mappings);
    match lookup(obj, &names)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|r| u32::try_from(r).ok())
            .filter(|r| (1..=MAX_RANK).contains(r)),
        Value::String(s) => parse_rank(s),
        _ => None,
    }
}

/// Map one JSON object to a row, if it has a username and a wager
pub fn entry_from_object(
    obj: &Map<String, Value>,
    mappings: &HashMap<String, String>,
) -> Option<RawEntry> {
    let username = username_of(obj, mappings)?;
    let wager = field_number(obj, SemanticField::Wager, mappings)?;
    Some(RawEntry {
        rank: rank_of(obj, mappings),
        username,
        wager,
        prize: field_number(obj, SemanticField::Prize, mappings).unwrap_or(0.0),
    })
}

struct Walker<'a> {
    visited: usize,
    mappings: &'a HashMap<String, String>,
    best: Option<(usize, Vec<RawEntry>)>,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, value: &Value, depth: usize) {
        if depth > MAX_DEPTH || self.visited >= MAX_NODES {
            return;
        }
        self.visited += 1;

        match value {
            Value::Array(items) => {
                let rows: Vec<RawEntry> = items
                    .iter()
                    .filter_map(|item| item.as_object())
                    .filter_map(|obj| entry_from_object(obj, self.mappings))
                    .collect();
                let better = match &self.best {
                    Some((score, _)) => rows.len() > *score,
                    None => !rows.is_empty(),
                };
                if better {
                    self.best = Some((rows.len(), rows));
                }
                for item in items {
                    self.walk(item, depth + 1);
                }
            }
            Value::Object(map) => {
                for child in map.values() {
                    self.walk(child, depth + 1);
                }
            }
            _ => {}
        }
    }
}

/// Find the array that best looks like leaderboard rows
///
/// Returns an empty vec when nothing qualifies. The largest qualifying
/// array wins; the first one found wins ties.
pub fn find_entries(body: &Value, mappings: &HashMap<String, String>) -> Vec<RawEntry> {
    let mut walker = Walker {
        visited: 0,
        mappings,
        best: None,
    };
    walker.walk(body, 0);
    walker.best.map(|(_, rows)| rows).unwrap_or_default()
}

/// Depth-first search for the first value under any of `keys`
fn find_key<'a>(value: &'a Value, keys: &[&str], depth: usize) -> Option<&'a Value> {
    if depth > MAX_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            for key in keys {
                if let Some(v) = map.get(*key) {
                    return Some(v);
                }
            }
            map.values().find_map(|v| find_key(v, keys, depth + 1))
        }
        Value::Array(items) => items.iter().find_map(|v| find_key(v, keys, depth + 1)),
        _ => None,
    }
}

/// Separate prize table: an array of amounts (index = rank - 1) or of
/// `{rank, prize}` objects
pub fn find_prize_table(body: &Value) -> Vec<(u32, f64)> {
    let Some(Value::Array(items)) = find_key(body, PRIZE_TABLE_KEYS, 0) else {
        return Vec::new();
    };

    let prize_names = SemanticField::Prize.synonyms();
    let rank_names = SemanticField::Rank.synonyms();
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match item {
            Value::Object(obj) => {
                let prize = lookup(obj, prize_names)
                    .or_else(|| lookup(obj, &["amount", "value"]))
                    .and_then(number_of)?;
                let rank = lookup(obj, rank_names)
                    .and_then(|v| v.as_u64())
                    .and_then(|r| u32::try_from(r).ok())
                    .unwrap_or(i as u32 + 1);
                Some((rank, prize))
            }
            other => number_of(other).map(|prize| (i as u32 + 1, prize)),
        })
        .filter(|(rank, prize)| *rank > 0 && *prize > 0.0)
        .collect()
}

/// Total prize pool, wherever it appears
pub fn find_prize_pool(body: &Value) -> Option<f64> {
    find_key(body, PRIZE_POOL_KEYS, 0)
        .and_then(number_of)
        .filter(|v| *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_mappings() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_finds_nested_array() {
        let body = json!({
            "status": "ok",
            "data": {
                "leaderboard": {
                    "entries": [
                        {"position": 1, "user": {"name": "alice"}, "wagered": "50,000.00", "reward": 1000},
                        {"position": 2, "user": {"name": "bob"}, "wagered": 40000, "reward": 500}
                    ]
                }
            }
        });

        let rows = find_entries(&body, &no_mappings());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rank, Some(1));
        assert_eq!(rows[0].username, "alice");
        assert_eq!(rows[0].wager, 50_000.0);
        assert_eq!(rows[0].prize, 1000.0);
    }

    #[test]
    fn test_absurd_rank_ignored() {
        let body = json!([
            {"rank": 4294967295u64, "username": "a", "wager": 5},
            {"rank": 2, "username": "b", "wager": 4}
        ]);

        let rows = find_entries(&body, &no_mappings());
        assert_eq!(rows[0].rank, None);
        assert_eq!(rows[1].rank, Some(2));
    }

    #[test]
    fn test_largest_array_wins() {
        let body = json!({
            "top": [{"username": "a", "wager": 5}],
            "rows": [
                {"username": "a", "wager": 5},
                {"username": "b", "wager": 4},
                {"username": "c", "wager": 3}
            ]
        });
        assert_eq!(find_entries(&body, &no_mappings()).len(), 3);
    }

    #[test]
    fn test_learned_mapping_takes_precedence() {
        let body = json!([{"nick": "carol", "turnover": 123, "amount": 9}]);
        let mut mappings = HashMap::new();
        mappings.insert("username".to_string(), "nick".to_string());
        mappings.insert("wager".to_string(), "turnover".to_string());

        let rows = find_entries(&body, &mappings);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].username, "carol");
        assert_eq!(rows[0].wager, 123.0);
    }

    #[test]
    fn test_depth_bound() {
        let mut body = json!([{"username": "deep", "wager": 1}]);
        for _ in 0..(MAX_DEPTH + 2) {
            body = json!({ "wrap": body });
        }
        assert!(find_entries(&body, &no_mappings()).is_empty());
    }

    #[test]
    fn test_prize_table_and_pool() {
        let body = json!({
            "meta": {"prizePool": "$10,000"},
            "prizes": [5000, 3000, {"place": 3, "amount": 2000}]
        });
        assert_eq!(find_prize_table(&body), vec![(1, 5000.0), (2, 3000.0), (3, 2000.0)]);
        assert_eq!(find_prize_pool(&body), Some(10_000.0));
    }
}
