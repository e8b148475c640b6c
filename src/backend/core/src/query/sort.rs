//! Sort directives and record ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field used when a request carries no sort directive.
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

// ═══════════════════════════════════════════════════════════════════════════════
// Sort Direction
// ═══════════════════════════════════════════════════════════════════════════════

/// Sort direction for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortDirection {
    /// Get the SQL keyword for this direction.
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Apply this direction to an ascending ordering.
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sort Field
// ═══════════════════════════════════════════════════════════════════════════════

/// A field to sort by, with direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortField {
    /// The name of the record field.
    pub name: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl SortField {
    /// Create a new sort field with ascending order.
    pub fn asc(name: impl Into<String>) -> Self {
        Self::new(name, SortDirection::Asc)
    }

    /// Create a new sort field with descending order.
    pub fn desc(name: impl Into<String>) -> Self {
        Self::new(name, SortDirection::Desc)
    }

    /// Create a new sort field with the specified direction.
    pub fn new(name: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }

    /// Newest records first.
    pub fn default_order() -> Vec<Self> {
        vec![Self::desc(DEFAULT_SORT_FIELD)]
    }
}

/// Parse a `sort` parameter such as `"title,-startTime"`.
///
/// Entries are trimmed and empty ones skipped. A leading `-` sorts
/// descending, a leading `+` or no prefix ascending.
pub fn parse_sort(raw: &str) -> Vec<SortField> {
    raw.split(',')
        .map(str::trim)
        .filter_map(|part| {
            let (name, direction) = if let Some(stripped) = part.strip_prefix('-') {
                (stripped, SortDirection::Desc)
            } else if let Some(stripped) = part.strip_prefix('+') {
                (stripped, SortDirection::Asc)
            } else {
                (part, SortDirection::Asc)
            };

            let name = name.trim();
            (!name.is_empty()).then(|| SortField::new(name, direction))
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ordering
// ═══════════════════════════════════════════════════════════════════════════════

// null < string < number < boolean < array < object, as jsonb orders them
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Compare two records key by key; a missing field sorts as null.
pub fn compare_records(sort: &[SortField], a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
    for field in sort {
        let left = a.get(&field.name).unwrap_or(&Value::Null);
        let right = b.get(&field.name).unwrap_or(&Value::Null);
        let ord = field.direction.apply(compare_values(left, right));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sort() {
        let fields = parse_sort("title, -startTime,,+id");
        assert_eq!(
            fields,
            vec![
                SortField::asc("title"),
                SortField::desc("startTime"),
                SortField::asc("id"),
            ]
        );
    }

    #[test]
    fn test_parse_sort_skips_bare_prefix() {
        assert!(parse_sort("-, ,").is_empty());
    }

    #[test]
    fn test_default_order() {
        assert_eq!(SortField::default_order(), vec![SortField::desc("createdAt")]);
    }

    #[test]
    fn test_value_order() {
        assert_eq!(compare_values(&json!(null), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!("z"), &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(compare_values(&json!(false), &json!(true)), Ordering::Less);
    }

    #[test]
    fn test_multi_key_compare() {
        let a = json!({"city": "Oslo", "age": 30});
        let b = json!({"city": "Oslo", "age": 20});
        let sort = vec![SortField::asc("city"), SortField::desc("age")];
        assert_eq!(
            compare_records(&sort, a.as_object().unwrap(), b.as_object().unwrap()),
            Ordering::Less
        );
    }
}
