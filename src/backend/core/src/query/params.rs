//! Raw query-string parameters.
//!
//! Parameters arrive as the flat `(key, value)` list produced by the HTTP
//! layer. Keys may carry one bracketed operator suffix (`age[gte]`), and a
//! repeated key keeps every value in arrival order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys consumed by sort, projection and pagination rather than filtering.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "fields", "limit"];

// ═══════════════════════════════════════════════════════════════════════════════
// Query Params
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered list of raw query-string pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Create an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any iterator of key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Append a pair.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// First value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key` in arrival order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Pairs whose key is not reserved for sort, projection or pagination.
    pub fn filter_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .filter(|(k, _)| !is_reserved(key_field(k)))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

impl From<Vec<(String, String)>> for QueryParams {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

/// Flatten a JSON object; array values become repeated keys.
impl From<Value> for QueryParams {
    fn from(value: Value) -> Self {
        let mut params = QueryParams::new();
        if let Value::Object(map) = value {
            for (key, value) in map {
                match value {
                    Value::String(s) => params.push(key, s),
                    Value::Array(items) => {
                        for item in items {
                            params.push(key.clone(), scalar_text(item));
                        }
                    }
                    other => params.push(key, scalar_text(other)),
                }
            }
        }
        params
    }
}

fn scalar_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Whether a key is handled outside of filtering.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Field part of a raw key: everything before the first bracket.
fn key_field(key: &str) -> &str {
    key.find('[').map_or(key, |open| &key[..open])
}

// ═══════════════════════════════════════════════════════════════════════════════
// Key Parsing
// ═══════════════════════════════════════════════════════════════════════════════

/// Shape of a filter key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKey<'a> {
    /// `field` or `field[]`
    Plain(&'a str),
    /// `field[op]`
    Operator { field: &'a str, operator: &'a str },
    /// Anything else: nested brackets, unbalanced brackets, empty field.
    Malformed,
}

/// Split a raw key into its field and optional operator suffix.
pub fn parse_key(key: &str) -> FilterKey<'_> {
    let Some(open) = key.find('[') else {
        if key.is_empty() || key.contains(']') {
            return FilterKey::Malformed;
        }
        return FilterKey::Plain(key);
    };

    let field = &key[..open];
    let rest = &key[open + 1..];

    let Some(operator) = rest.strip_suffix(']') else {
        return FilterKey::Malformed;
    };

    if field.is_empty() || field.contains(']') || operator.contains(['[', ']']) {
        return FilterKey::Malformed;
    }

    if operator.is_empty() {
        FilterKey::Plain(field)
    } else {
        FilterKey::Operator { field, operator }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Numeric Parsing
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse the leading decimal integer of `raw`.
///
/// Leading whitespace and one sign are accepted, and parsing stops at the
/// first non-digit, so `"5abc"` is 5 and `"abc"` is `None`.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse a positive page number or size; anything else is `None`.
pub fn parse_positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(parse_leading_int)
        .filter(|n| *n > 0)
        .map(|n| n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_shapes() {
        assert_eq!(parse_key("name"), FilterKey::Plain("name"));
        assert_eq!(parse_key("tags[]"), FilterKey::Plain("tags"));
        assert_eq!(
            parse_key("age[gte]"),
            FilterKey::Operator { field: "age", operator: "gte" }
        );
        assert_eq!(parse_key("a[b][c]"), FilterKey::Malformed);
        assert_eq!(parse_key("a[b"), FilterKey::Malformed);
        assert_eq!(parse_key("[gte]"), FilterKey::Malformed);
        assert_eq!(parse_key(""), FilterKey::Malformed);
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(parse_leading_int("5"), Some(5));
        assert_eq!(parse_leading_int("  12abc"), Some(12));
        assert_eq!(parse_leading_int("-3"), Some(-3));
        assert_eq!(parse_leading_int("2.9"), Some(2));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("-"), None);
    }

    #[test]
    fn test_parse_positive() {
        assert_eq!(parse_positive(Some("4")), Some(4));
        assert_eq!(parse_positive(Some("0")), None);
        assert_eq!(parse_positive(Some("-1")), None);
        assert_eq!(parse_positive(Some("x")), None);
        assert_eq!(parse_positive(None), None);
    }

    #[test]
    fn test_filter_pairs_skip_reserved() {
        let params = QueryParams::from_pairs([
            ("page", "2"),
            ("title", "standup"),
            ("sort", "-createdAt"),
            ("fields", "title"),
            ("limit", "5"),
        ]);

        let pairs: Vec<_> = params.filter_pairs().collect();
        assert_eq!(pairs, vec![("title", "standup")]);
        assert_eq!(params.get("page"), Some("2"));
    }

    #[test]
    fn test_filter_pairs_skip_bracketed_reserved_keys() {
        let params = QueryParams::from_pairs([
            ("limit[gt]", "1"),
            ("page[gte]", "2"),
            ("sort[x]", "name"),
            ("fields[a][b]", "x"),
            ("age[gte]", "18"),
        ]);

        let pairs: Vec<_> = params.filter_pairs().collect();
        assert_eq!(pairs, vec![("age[gte]", "18")]);
        assert_eq!(key_field("limit[gt]"), "limit");
        assert_eq!(key_field("title"), "title");
    }

    #[test]
    fn test_repeated_keys_keep_order() {
        let params = QueryParams::from_pairs([("id", "1"), ("id", "3")]);
        assert_eq!(params.get("id"), Some("1"));
        assert_eq!(params.get_all("id"), vec!["1", "3"]);
    }
}
