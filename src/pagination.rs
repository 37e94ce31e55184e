/// Pagination arithmetic for trip listings.
///
/// Page metadata is a pure function of `(skip, limit, total)`. The total is
/// never derived here: it comes from a count over the same filter set as the
/// page itself.
use crate::error::{ExplorerError, ExplorerResult};
use serde::{Deserialize, Serialize};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Upper bound on page size unless configured otherwise.
pub const MAX_PAGE_SIZE: u64 = 1000;

/// A validated offset/limit pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    skip: u64,
    limit: u64,
}

impl PageRequest {
    /// Validate `skip`/`limit` against `max_limit`.
    ///
    /// `limit` must lie in `1..=max_limit`.
    pub fn new(skip: u64, limit: u64, max_limit: u64) -> ExplorerResult<Self> {
        if limit == 0 {
            return Err(ExplorerError::validation("limit must be at least 1"));
        }
        if limit > max_limit {
            return Err(ExplorerError::validation(format!(
                "limit must be at most {}, got {}",
                max_limit, limit
            )));
        }
        Ok(Self { skip, limit })
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Pagination metadata returned alongside a page of trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Number of trips matching the filters
    pub total: u64,
    /// 1-based page number containing `skip`
    pub page: u64,
    pub page_size: u64,
    /// 0 when nothing matched
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageInfo {
    /// Derive page metadata for `request` given `total` matches.
    pub fn compute(request: PageRequest, total: u64) -> Self {
        let PageRequest { skip, limit } = request;
        Self {
            total,
            page: skip / limit + 1,
            page_size: limit,
            total_pages: total.div_ceil(limit),
            has_next: skip.saturating_add(limit) < total,
            has_prev: skip > 0,
        }
    }
}
