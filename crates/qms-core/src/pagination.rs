//! Pagination types for API responses

use serde::{Deserialize, Serialize};

/// Pagination parameters (from query string)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,

    /// Items per page
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationParams {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 500),
        }
    }

    /// Calculate the SQL offset
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit()
    }

    /// Calculate the SQL limit
    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, 500)
    }
}

/// Paginated collection response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, params: &PaginationParams) -> Self {
        let per_page = params.limit();
        Self {
            items,
            total,
            page: params.page.max(1),
            per_page,
            total_pages: (total + per_page - 1) / per_page,
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_limit() {
        let params = PaginationParams::new(3, 10);
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn test_params_are_clamped() {
        let params = PaginationParams::new(0, 10_000);
        assert_eq!(params.page, 1);
        assert_eq!(params.limit(), 500);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_page_metadata() {
        let page = Page::new(vec![1, 2, 3, 4, 5], 23, &PaginationParams::new(2, 5));
        assert_eq!(page.total_pages, 5);
        assert!(page.has_next());

        let doubled = page.map(|n| n * 2);
        assert_eq!(doubled.items, vec![2, 4, 6, 8, 10]);
    }
}
