//! Offset-based pagination.
//!
//! This module provides:
//! - Page/limit parameter handling
//! - Skip offset computation

use serde::{Deserialize, Serialize};

/// Default page number (1-indexed).
pub const DEFAULT_PAGE: u64 = 1;

/// Default page size if not configured.
pub const DEFAULT_LIMIT: u64 = 10;

// ═══════════════════════════════════════════════════════════════════════════════
// Offset Pagination
// ═══════════════════════════════════════════════════════════════════════════════

/// Offset-based pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPagination {
    /// Current page number (1-indexed).
    pub page: u64,
    /// Number of items per page.
    pub limit: u64,
}

impl OffsetPagination {
    /// Create a new offset pagination. Zero values are raised to 1.
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    /// Number of records skipped before this page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Apply pagination to an iterator.
    pub fn paginate_iter<T, I: Iterator<Item = T>>(&self, iter: I) -> Vec<T> {
        iter.skip(usize::try_from(self.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(self.limit).unwrap_or(usize::MAX))
            .collect()
    }
}

impl Default for OffsetPagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_pagination_basic() {
        let pagination = OffsetPagination::new(1, 20);

        assert_eq!(pagination.offset(), 0);
    }

    #[test]
    fn test_offset_pagination_page_2() {
        let pagination = OffsetPagination::new(2, 5);

        assert_eq!(pagination.offset(), 5);
    }

    #[test]
    fn test_zero_values_raised() {
        let pagination = OffsetPagination::new(0, 0);
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.limit, 1);
    }

    #[test]
    fn test_large_limit_is_honored() {
        let pagination = OffsetPagination::new(1, 1_000_000);
        assert_eq!(pagination.limit, 1_000_000);
    }

    #[test]
    fn test_deserialized_zero_page_does_not_underflow() {
        let pagination: OffsetPagination =
            serde_json::from_str(r#"{"page": 0, "limit": 5}"#).unwrap();
        assert_eq!(pagination.offset(), 0);
    }

    #[test]
    fn test_paginate_iter() {
        let items: Vec<i32> = (1..=12).collect();

        let page1 = OffsetPagination::new(1, 5).paginate_iter(items.iter().copied());
        assert_eq!(page1, vec![1, 2, 3, 4, 5]);

        let page3 = OffsetPagination::new(3, 5).paginate_iter(items.iter().copied());
        assert_eq!(page3, vec![11, 12]);

        let beyond = OffsetPagination::new(4, 5).paginate_iter(items.iter().copied());
        assert!(beyond.is_empty());
    }
}
