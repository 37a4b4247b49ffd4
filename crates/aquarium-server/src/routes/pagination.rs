//! `page` / `page_size` handling shared by the list endpoints.

use serde::Deserialize;

pub const SCHEDULE_PAGE_SIZE: usize = 20;
pub const MAX_SCHEDULE_PAGE_SIZE: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
}

impl Pagination {
    /// Missing or zero values fall back to page 1 and `default_size`.
    /// `page_size` is capped at `max_size`.
    pub fn resolve(
        page: Option<usize>,
        page_size: Option<usize>,
        default_size: usize,
        max_size: usize,
    ) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            page_size: page_size
                .filter(|s| *s > 0)
                .unwrap_or(default_size)
                .min(max_size),
        }
    }

    pub fn from_query(q: &PageQuery, default_size: usize, max_size: usize) -> Self {
        Self::resolve(q.page, q.page_size, default_size, max_size)
    }

    /// Rows to skip. Saturates, so a huge `page` reads past the end.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// This page of an already-loaded list.
    pub fn slice<T>(&self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter()
            .skip(self.offset())
            .take(self.page_size)
            .collect()
    }

    pub fn meta(&self, total: usize) -> serde_json::Value {
        serde_json::json!({
            "page": self.page,
            "page_size": self.page_size,
            "total": total,
            "total_pages": total.div_ceil(self.page_size),
        })
    }
}
