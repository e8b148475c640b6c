//! Filter predicates built from query-string pairs.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ═══════════════════════════════════════════════════════════════════════════════
// Scalar
// ═══════════════════════════════════════════════════════════════════════════════

/// Typed interpretation of a raw query-string value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ScalarKind {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text,
}

/// A query-string value together with its typed reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    raw: String,
    kind: ScalarKind,
}

impl Scalar {
    /// Type a raw value: integer, then float, then boolean, else text.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let kind = if let Ok(i) = raw.parse::<i64>() {
            ScalarKind::Integer(i)
        } else if looks_numeric(&raw) {
            match raw.parse::<f64>() {
                Ok(f) if f.is_finite() => ScalarKind::Float(f),
                _ => ScalarKind::Text,
            }
        } else {
            match raw.as_str() {
                "true" => ScalarKind::Boolean(true),
                "false" => ScalarKind::Boolean(false),
                _ => ScalarKind::Text,
            }
        };

        Self { raw, kind }
    }

    /// The value exactly as it appeared in the query string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Numeric reading, if the value is an integer or float.
    pub fn as_f64(&self) -> Option<f64> {
        match self.kind {
            ScalarKind::Integer(i) => Some(i as f64),
            ScalarKind::Float(f) => Some(f),
            _ => None,
        }
    }

    /// JSON reading of the value.
    pub fn to_json(&self) -> Value {
        match self.kind {
            ScalarKind::Integer(i) => Value::from(i),
            ScalarKind::Float(f) => Value::from(f),
            ScalarKind::Boolean(b) => Value::Bool(b),
            ScalarKind::Text => Value::String(self.raw.clone()),
        }
    }

    /// Whether a stored value equals this scalar.
    ///
    /// Strings compare against the raw text, numbers numerically, booleans
    /// only against `true`/`false`. An array matches when any element does.
    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => s == &self.raw,
            Value::Number(n) => match (n.as_f64(), self.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            Value::Bool(b) => self.kind == ScalarKind::Boolean(*b),
            Value::Null => self.raw == "null",
            Value::Array(items) => items.iter().any(|item| self.matches(item)),
            Value::Object(_) => false,
        }
    }

    /// Order a stored value against this scalar.
    ///
    /// Numbers compare numerically against numeric scalars and strings
    /// compare lexically against the raw text, which orders RFC 3339
    /// timestamps correctly. Other pairings are incomparable.
    pub fn compare(&self, value: &Value) -> Option<Ordering> {
        match value {
            Value::Number(n) => n.as_f64()?.partial_cmp(&self.as_f64()?),
            Value::String(s) => Some(s.as_str().cmp(self.raw.as_str())),
            _ => None,
        }
    }
}

fn looks_numeric(raw: &str) -> bool {
    !raw.is_empty()
        && raw.bytes().any(|b| b.is_ascii_digit())
        && raw
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Comparison
// ═══════════════════════════════════════════════════════════════════════════════

/// Range operator accepted in `field[op]` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    /// Parse an operator suffix; unknown operators yield `None`.
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }

    /// SQL operator for this comparison.
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Whether `ordering` (stored value relative to bound) satisfies this operator.
    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Predicate
// ═══════════════════════════════════════════════════════════════════════════════

/// One condition on a record field. A filter is the conjunction of its predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Eq { field: String, value: Scalar },
    AnyOf { field: String, values: Vec<Scalar> },
    Range { field: String, op: Comparison, value: Scalar },
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::AnyOf { field, .. } | Self::Range { field, .. } => field,
        }
    }

    /// Evaluate against a record field value; a missing field is `None`.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let value = value.unwrap_or(&Value::Null);
        match self {
            Self::Eq { value: expected, .. } => expected.matches(value),
            Self::AnyOf { values, .. } => values.iter().any(|v| v.matches(value)),
            Self::Range { op, value: bound, .. } => bound
                .compare(value)
                .map(|ordering| op.accepts(ordering))
                .unwrap_or(false),
        }
    }
}

/// Whether `record` satisfies every predicate.
pub fn matches_all(predicates: &[Predicate], record: &serde_json::Map<String, Value>) -> bool {
    predicates
        .iter()
        .all(|p| p.matches(record.get(p.field())))
}
