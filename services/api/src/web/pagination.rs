//! services/api/src/web/pagination.rs
//!
//! Shared pagination plumbing for the list endpoints.

use serde::Serialize;

/// Hard ceiling on page size, whatever the client asks for.
const MAX_LIMIT: i64 = 100;

/// Raw `page`/`limit` query values as they arrive from the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// Resolves the raw values against a default page size, clamping
    /// nonsense (zero, negative, oversized) into the valid range.
    pub fn resolve(self, default_limit: i64) -> Page {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT);
        Page { page, limit }
    }
}

/// A resolved page request.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// The envelope every list endpoint returns.
#[derive(Debug, Serialize)]
pub struct PageEnvelope<T> {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub items: Vec<T>,
}

impl<T> PageEnvelope<T> {
    pub fn new(total: i64, page: Page, items: Vec<T>) -> Self {
        Self {
            total,
            page: page.page,
            limit: page.limit,
            total_pages: (total + page.limit - 1) / page.limit,
            items,
        }
    }
}
