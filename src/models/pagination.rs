//! Page parameters and paged results

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::config::PaginationConfig;

/// Raw page parameters as supplied by the caller
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PageRequest {
    /// Page number, starting at 1 (default: 1)
    pub page: Option<i64>,
    /// Items per page
    pub per_page: Option<i64>,
}

/// Normalised page window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

/// One page of results with the unpaginated total
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: Page,
}

impl<T> Paged<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
        }
    }
}

impl PageRequest {
    /// Clamp to sane values: non-positive page -> 1, non-positive size -> `default_per_page`,
    /// oversized -> `max_per_page`.
    pub fn normalize(&self, default_per_page: i64, max_per_page: i64) -> Page {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let per_page = match self.per_page {
            Some(n) if n > 0 => n.min(max_per_page),
            _ => default_per_page.min(max_per_page),
        };
        Page { page, per_page }
    }

    pub fn resolve(&self, config: &PaginationConfig) -> Page {
        self.normalize(config.default_per_page, config.max_per_page)
    }
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.per_page - 1) / self.per_page
        }
    }
}
