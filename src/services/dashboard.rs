//! Dashboard service

use chrono::{DateTime, Utc};

use crate::{
    config::PaginationConfig,
    error::AppResult,
    models::{
        dashboard::{BorrowerDashboard, BorrowerSummary, Dashboard, OperatorDashboard, Pagination},
        loan::{LoanDetails, LoanView},
        pagination::{Page, PageRequest},
        user::Caller,
    },
    repository::{
        dashboard::{BorrowerSnapshot, OperatorSnapshot},
        Repository,
    },
};

/// Default ranking page size for operators
pub const OPERATOR_PAGE_SIZE: i64 = 10;
/// Default open-loan page size for borrowers
pub const BORROWER_PAGE_SIZE: i64 = 20;

#[derive(Clone)]
pub struct DashboardService {
    repository: Repository,
    pagination: PaginationConfig,
}

impl DashboardService {
    pub fn new(repository: Repository, pagination: PaginationConfig) -> Self {
        Self { repository, pagination }
    }

    /// Dashboard matching the caller's role
    pub async fn dashboard(&self, caller: &Caller, page: PageRequest) -> AppResult<Dashboard> {
        match caller.borrower_scope() {
            Some(borrower_id) => self
                .borrower_dashboard(borrower_id, page)
                .await
                .map(Dashboard::Borrower),
            None => self.operator_dashboard(page).await.map(Dashboard::Operator),
        }
    }

    /// Catalog summary plus the ranking of borrowers with overdue loans
    #[tracing::instrument(skip(self))]
    pub async fn operator_dashboard(&self, page: PageRequest) -> AppResult<OperatorDashboard> {
        let page = page.normalize(OPERATOR_PAGE_SIZE, self.pagination.max_per_page);
        let snapshot = self.repository.dashboard.operator_snapshot(Utc::now(), page).await?;
        Ok(operator_dashboard_from(snapshot, page))
    }

    /// A borrower's open and overdue loans
    #[tracing::instrument(skip(self))]
    pub async fn borrower_dashboard(&self, borrower_id: i32, page: PageRequest) -> AppResult<BorrowerDashboard> {
        let page = page.normalize(BORROWER_PAGE_SIZE, self.pagination.max_per_page);
        let now = Utc::now();
        let snapshot = self
            .repository
            .dashboard
            .borrower_snapshot(borrower_id, now, page)
            .await?;
        Ok(borrower_dashboard_from(snapshot, page, now))
    }
}

fn operator_dashboard_from(snapshot: OperatorSnapshot, page: Page) -> OperatorDashboard {
    OperatorDashboard {
        summary: snapshot.summary,
        borrowers_with_overdue: snapshot.overdue_borrowers,
        pagination: Pagination::new(page, snapshot.overdue_borrowers_total),
    }
}

// Every derived field is evaluated at the same `now` the snapshot was taken with.
fn borrower_dashboard_from(
    snapshot: BorrowerSnapshot,
    page: Page,
    now: DateTime<Utc>,
) -> BorrowerDashboard {
    let to_view = |details: LoanDetails| LoanView::new(details, now);
    BorrowerDashboard {
        summary: BorrowerSummary {
            total_borrowed: snapshot.open_loans_total,
            total_overdue: snapshot.overdue_total,
        },
        pagination: Pagination::new(page, snapshot.open_loans_total),
        borrowed: snapshot.open_loans.into_iter().map(to_view).collect(),
        overdue: snapshot.overdue_loans.into_iter().map(to_view).collect(),
    }
}
