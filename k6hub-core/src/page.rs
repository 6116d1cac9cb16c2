//! Pagination shared by the list queries

use serde::{Deserialize, Serialize};

/// Default page size for list endpoints
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Upper bound on page size
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn effective_page(&self) -> u32 {
        self.page.max(1)
    }

    /// Clamp limit to valid range
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.effective_page() - 1) * u64::from(self.effective_limit())
    }
}

/// One page of results plus the totals the dashboard needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, request: PageRequest) -> Self {
        let limit = request.effective_limit();
        let total_pages = u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX);
        Self {
            data,
            total,
            page: request.effective_page(),
            limit,
            total_pages,
        }
    }
}
