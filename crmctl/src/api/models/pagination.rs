//! Shared pagination types for API query parameters.
//!
//! List endpoints use 1-based page numbers with a clamped page size. The total is always
//! computed by a separate count query over the same filter predicate as the page query.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Default number of items to return per page.
pub const DEFAULT_LIMIT: i64 = 25;

/// Maximum number of items that can be requested per page.
pub const MAX_LIMIT: i64 = 100;

/// Standard pagination parameters for list endpoints.
///
/// - `page`: 1-based page number (default: 1, values below 1 are treated as 1)
/// - `limit`: Maximum items to return (default: 25, clamped to 1..=100)
#[serde_as]
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Page number, starting at 1
    #[param(default = 1, minimum = 1)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page: Option<i64>,

    /// Maximum number of items to return (default: 25, max: 100)
    #[param(default = 25, minimum = 1, maximum = 100)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub limit: Option<i64>,
}

impl Pagination {
    #[inline]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Get the limit value, clamped between 1 and MAX_LIMIT.
    /// Defaults to DEFAULT_LIMIT if not specified.
    #[inline]
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Rows to skip for the current page.
    #[inline]
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

/// Pagination metadata returned alongside every list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    /// Number of items matching the query (before pagination)
    pub total: i64,
    pub total_pages: i64,
}

impl PageInfo {
    pub fn new(pagination: &Pagination, total: i64) -> Self {
        let limit = pagination.limit();
        Self {
            page: pagination.page(),
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

/// Generic paginated response wrapper for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T: ToSchema> {
    /// The items for the current page
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

impl<T: ToSchema> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, pagination: &Pagination, total: i64) -> Self {
        Self {
            items,
            pagination: PageInfo::new(pagination, total),
        }
    }
}
