//! Operator and borrower dashboard payloads

use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use super::loan::LoanView;
use super::pagination::Page;

/// Catalog-wide figures
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct CatalogSummary {
    pub total_items: i64,
    pub total_open_loans: i64,
    /// Open loans whose due date falls within the current UTC day
    pub due_today: i64,
    pub overdue_loans: i64,
}

/// One entry of the overdue ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
pub struct OverdueBorrower {
    pub borrower_id: i32,
    pub overdue_count: i64,
}

/// Page metadata returned next to a paged list
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: Page, total_count: i64) -> Self {
        Self {
            current_page: page.page,
            total_pages: page.total_pages(total_count),
            total_count,
            per_page: page.per_page,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OperatorDashboard {
    pub summary: CatalogSummary,
    pub borrowers_with_overdue: Vec<OverdueBorrower>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowerSummary {
    pub total_borrowed: i64,
    /// Unpaginated count of overdue open loans
    pub total_overdue: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowerDashboard {
    pub borrowed: Vec<LoanView>,
    pub overdue: Vec<LoanView>,
    pub summary: BorrowerSummary,
    pub pagination: Pagination,
}

/// Dashboard chosen by the caller's role
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dashboard {
    Operator(OperatorDashboard),
    Borrower(BorrowerDashboard),
}
