//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl Pagination {
    /// Maximum page size accepted from clients
    pub const MAX_PER_PAGE: u32 = 200;

    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, Self::MAX_PER_PAGE) as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.limit()
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: &Pagination, total_items: u64) -> Self {
        let per_page = pagination.limit() as u64;
        let total_pages = total_items.div_ceil(per_page) as u32;
        Self {
            data,
            pagination: PaginationMeta {
                page: pagination.page.max(1),
                per_page: per_page as u32,
                total_items,
                total_pages,
            },
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_clamped() {
        let pagination = Pagination {
            page: 0,
            per_page: 1000,
        };
        assert_eq!(pagination.limit(), 200);
        assert_eq!(pagination.offset(), 0);

        let page = PaginatedResponse::new(vec![1, 2, 3], &Pagination { page: 3, per_page: 20 }, 41);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.page, 3);
    }
}
