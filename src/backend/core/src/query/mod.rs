//! Query feature builder.
//!
//! Translates flat HTTP query-string parameters into a structured
//! data-retrieval request:
//! - Filter predicates (`title=standup`, `age[gte]=18&age[lte]=30`)
//! - Multi-key sort (`sort=-createdAt,title`)
//! - Field projection (`fields=name,email`)
//! - Offset pagination (`page=2&limit=5`)
//!
//! # Usage
//!
//! ```rust,ignore
//! use calendar_core::query::{QueryConfig, QueryFeatures, QueryParams};
//!
//! let params = QueryParams::from_pairs([("age[gte]", "18"), ("sort", "-createdAt")]);
//! let request = QueryFeatures::new(params, &QueryConfig::default())
//!     .filter()?
//!     .sort()
//!     .build();
//! ```

mod features;
mod filter;
mod pagination;
mod params;
mod sort;

pub use features::{OperatorPolicy, QueryConfig, QueryFeatures, QueryRequest};
pub use filter::{matches_all, Comparison, Predicate, Scalar, ScalarKind};
pub use pagination::{OffsetPagination, DEFAULT_LIMIT, DEFAULT_PAGE};
pub use params::{is_reserved, parse_key, parse_leading_int, FilterKey, QueryParams, RESERVED_KEYS};
pub use sort::{
    compare_records, compare_values, parse_sort, SortDirection, SortField, DEFAULT_SORT_FIELD,
};
