//! The query feature builder.
//!
//! Turns flat query-string parameters into a [`QueryRequest`] through four
//! independent steps (filter, sort, project, paginate) that may be applied
//! in any order before the request is built or executed.
//!
//! ```rust,ignore
//! let records = QueryFeatures::new(params, &config)
//!     .filter()?
//!     .sort()
//!     .project()
//!     .paginate()
//!     .execute(store.as_ref())
//!     .await?;
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::filter::{Comparison, Predicate, Scalar};
use super::pagination::{OffsetPagination, DEFAULT_LIMIT, DEFAULT_PAGE};
use super::params::{parse_key, parse_positive, FilterKey, QueryParams};
use super::sort::{parse_sort, SortField};
use crate::error::{CalendarError, Result};
use crate::store::{Record, RecordStore, ID_FIELD};

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Handling of `field[op]` keys whose operator is not a range operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorPolicy {
    /// Drop the condition and keep going.
    #[default]
    Ignore,
    /// Fail the request with a 400.
    Reject,
}

/// Builder defaults and limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Page size used when `limit` is absent or invalid
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Upper bound on the page size, unbounded when unset
    #[serde(default)]
    pub max_limit: Option<u64>,

    /// What to do with unknown operators and malformed keys
    #[serde(default)]
    pub unknown_operators: OperatorPolicy,
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: None,
            unknown_operators: OperatorPolicy::Ignore,
        }
    }
}

impl QueryConfig {
    pub fn with_max_limit(mut self, max_limit: u64) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    pub fn with_policy(mut self, policy: OperatorPolicy) -> Self {
        self.unknown_operators = policy;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Query Request
// ═══════════════════════════════════════════════════════════════════════════════

/// A complete data-retrieval request, consumed by [`RecordStore::find_many`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Conjunctive predicates.
    pub filter: Vec<Predicate>,
    /// Multi-key sort in listed order; empty keeps store order.
    pub sort: Vec<SortField>,
    /// Allow-listed fields, `None` for all fields.
    pub projection: Option<Vec<String>>,
    /// Page window, `None` for every match.
    pub pagination: Option<OffsetPagination>,
}

impl QueryRequest {
    /// Request matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Request matching records whose `field` equals `value`.
    pub fn where_eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            filter: vec![Predicate::Eq {
                field: field.into(),
                value: Scalar::parse(value),
            }],
            ..Self::default()
        }
    }

    /// Add a predicate.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.filter.push(predicate);
        self
    }

    /// Keep only the projected fields of `record`. The id always survives.
    pub fn project(&self, record: Record) -> Record {
        match &self.projection {
            None => record,
            Some(fields) => record
                .into_iter()
                .filter(|(key, _)| key == ID_FIELD || fields.iter().any(|f| f == key))
                .collect(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Query Features
// ═══════════════════════════════════════════════════════════════════════════════

/// Builder from query-string parameters to a [`QueryRequest`].
#[derive(Debug, Clone)]
pub struct QueryFeatures {
    params: QueryParams,
    config: QueryConfig,
    request: QueryRequest,
}

impl QueryFeatures {
    pub fn new(params: impl Into<QueryParams>, config: &QueryConfig) -> Self {
        Self {
            params: params.into(),
            config: config.clone(),
            request: QueryRequest::default(),
        }
    }

    /// Apply filter, sort, projection and pagination in one go.
    pub fn all(self) -> Result<Self> {
        Ok(self.filter()?.sort().project().paginate())
    }

    /// Turn every non-reserved pair into a predicate.
    ///
    /// Plain keys become equality predicates, and a repeated plain key
    /// matches any of its values. `field[op]` keys with a range operator
    /// become range predicates. Other keys follow
    /// [`QueryConfig::unknown_operators`].
    pub fn filter(mut self) -> Result<Self> {
        let mut predicates: Vec<Predicate> = Vec::new();

        for (key, raw) in self.params.filter_pairs() {
            match parse_key(key) {
                FilterKey::Plain(field) => push_equality(&mut predicates, field, raw),
                FilterKey::Operator { field, operator } => match Comparison::parse(operator) {
                    Some(op) => predicates.push(Predicate::Range {
                        field: field.to_string(),
                        op,
                        value: Scalar::parse(raw),
                    }),
                    None => self.unsupported(key, || CalendarError::unsupported_operator(field, operator))?,
                },
                FilterKey::Malformed => self.unsupported(key, || CalendarError::invalid_field(key))?,
            }
        }

        self.request.filter.extend(predicates);
        Ok(self)
    }

    /// Apply the `sort` parameter, newest `createdAt` first when absent.
    pub fn sort(mut self) -> Self {
        let fields = self.params.get("sort").map(parse_sort).unwrap_or_default();
        self.request.sort = if fields.is_empty() {
            SortField::default_order()
        } else {
            fields
        };
        self
    }

    /// Apply the `fields` allow-list; absent or empty keeps every field.
    pub fn project(mut self) -> Self {
        let fields: Vec<String> = self
            .params
            .get("fields")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        self.request.projection = (!fields.is_empty()).then_some(fields);
        self
    }

    /// Apply `page` and `limit`. Invalid values fall back to the defaults.
    pub fn paginate(mut self) -> Self {
        let page = parse_positive(self.params.get("page")).unwrap_or(DEFAULT_PAGE);
        let mut limit =
            parse_positive(self.params.get("limit")).unwrap_or(self.config.default_limit);
        if let Some(max) = self.config.max_limit {
            limit = limit.min(max);
        }

        self.request.pagination = Some(OffsetPagination::new(page, limit));
        self
    }

    /// Peek at the request built so far.
    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    pub fn build(self) -> QueryRequest {
        self.request
    }

    /// Run the request against `store`.
    pub async fn execute(self, store: &dyn RecordStore) -> Result<Vec<Record>> {
        counter!("calendar_queries_total", "collection" => store.collection().to_string())
            .increment(1);
        store.find_many(self.build()).await
    }

    fn unsupported(&self, key: &str, reject: impl FnOnce() -> CalendarError) -> Result<()> {
        match self.config.unknown_operators {
            OperatorPolicy::Ignore => {
                debug!(key = %key, "Dropping unsupported filter key");
                Ok(())
            }
            OperatorPolicy::Reject => Err(reject()),
        }
    }
}

fn push_equality(predicates: &mut Vec<Predicate>, field: &str, raw: &str) {
    let scalar = Scalar::parse(raw);
    let existing = predicates.iter_mut().find(|p| {
        matches!(p, Predicate::Eq { .. } | Predicate::AnyOf { .. }) && p.field() == field
    });

    match existing {
        None => predicates.push(Predicate::Eq {
            field: field.to_string(),
            value: scalar,
        }),
        Some(Predicate::AnyOf { values, .. }) => values.push(scalar),
        Some(slot) => {
            let first = match &*slot {
                Predicate::Eq { value, .. } => value.clone(),
                _ => return,
            };
            *slot = Predicate::AnyOf {
                field: field.to_string(),
                values: vec![first, scalar],
            };
        }
    }
}
