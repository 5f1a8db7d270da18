use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use crate::{ApiResponse, PaginatedResponse};

const MAX_PER_PAGE: u64 = 100;

/// Pagination parameters for list operations
#[derive(Debug, Clone, Copy, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
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
    /// Builds normalized parameters from optional query values. List queries
    /// carry their own filters, so they take page fields individually.
    pub fn from_query(page: Option<u64>, per_page: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or_else(default_page),
            per_page: per_page.unwrap_or_else(default_per_page),
        }
        .normalized()
    }

    /// Page numbers start at 1 and page sizes are capped.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }
}

/// Wraps one page of a list query in the standard envelope.
pub fn paginated<T>(
    items: Vec<T>,
    total: u64,
    params: PaginationParams,
) -> ApiResponse<PaginatedResponse<T>> {
    ApiResponse::success(PaginatedResponse::new(
        items,
        total,
        params.page,
        params.per_page,
    ))
}
