//! Item (catalog entry) model and related types.
//!
//! Availability is never stored: it is derived from the total copy count and
//! the number of open loans read alongside the item row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::pagination::PageRequest;

/// Copies of an item that are free to lend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub total_copies: i32,
    pub open_loans: i64,
}

impl Availability {
    pub fn new(total_copies: i32, open_loans: i64) -> Self {
        Self { total_copies, open_loans }
    }

    /// `total_copies - open_loans`
    pub fn available_copies(&self) -> i64 {
        i64::from(self.total_copies) - self.open_loans
    }

    pub fn is_available(&self) -> bool {
        self.available_copies() > 0
    }

    /// Whether one more open loan still fits within the copy count
    pub fn can_lend_one_more(&self) -> bool {
        self.open_loans + 1 <= i64::from(self.total_copies)
    }
}

/// Item row as read from the database, with its open-loan count
#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub category: String,
    pub external_code: String,
    pub total_copies: i32,
    pub open_loans: i64,
    /// Only meaningful for borrower callers
    #[sqlx(default)]
    pub borrowed_by_caller: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Item as exposed to callers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Item {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub category: String,
    pub external_code: String,
    pub total_copies: i32,
    pub available_copies: i64,
    pub is_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borrowed_by_caller: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        let availability = Availability::new(row.total_copies, row.open_loans);
        Self {
            id: row.id,
            title: row.title,
            author: row.author,
            category: row.category,
            external_code: row.external_code,
            total_copies: row.total_copies,
            available_copies: availability.available_copies(),
            is_available: availability.is_available(),
            borrowed_by_caller: row.borrowed_by_caller,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Create item request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateItem {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1, max = 255))]
    pub author: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    /// External catalog code (ISBN or similar), unique across the catalog
    #[validate(length(min = 1, max = 64))]
    pub external_code: String,
    #[validate(range(min = 1, message = "total_copies must be greater than 0"))]
    pub total_copies: i32,
}

/// Update item request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateItem {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub author: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub external_code: Option<String>,
    #[validate(range(min = 1, message = "total_copies must be greater than 0"))]
    pub total_copies: Option<i32>,
}

/// Item search query
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ItemQuery {
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    /// Case-insensitive substring of the author
    pub author: Option<String>,
    /// Exact category
    pub category: Option<String>,
    /// Only items with at least one free copy
    pub available: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ItemQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            per_page: self.per_page,
        }
    }
}
