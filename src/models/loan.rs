//! Loan model and its date-driven classification.
//!
//! A loan has no stored status: active, overdue, due soon and returned are
//! all computed from `due_at`, `returned_at` and the current time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::pagination::PageRequest;

/// Length of a loan
pub const LOAN_PERIOD_DAYS: i64 = 14;

/// Forward window in which an active loan counts as due soon
pub const DUE_SOON_DAYS: i64 = 3;

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Loan row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: i32,
    pub borrower_id: i32,
    pub item_id: i32,
    pub checked_out_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

/// Status shown to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

/// Due timestamp for a loan checked out at `checked_out_at`
pub fn due_at_for(checked_out_at: DateTime<Utc>) -> DateTime<Utc> {
    checked_out_at + Duration::days(LOAN_PERIOD_DAYS)
}

/// Whole days in `delta`, rounding any partial day up. Non-positive deltas give 0.
fn ceil_days(delta: Duration) -> i64 {
    let micros = delta.num_microseconds().unwrap_or(i64::MAX);
    if micros <= 0 {
        return 0;
    }
    micros / MICROS_PER_DAY + i64::from(micros % MICROS_PER_DAY != 0)
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }

    pub fn is_returned(&self) -> bool {
        self.returned_at.is_some()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.due_at < now
    }

    /// Active and due within `[now, now + DUE_SOON_DAYS]`
    pub fn is_due_soon(&self, now: DateTime<Utc>) -> bool {
        self.is_active()
            && self.due_at >= now
            && self.due_at <= now + Duration::days(DUE_SOON_DAYS)
    }

    pub fn status(&self, now: DateTime<Utc>) -> LoanStatus {
        if self.is_returned() {
            LoanStatus::Returned
        } else if self.is_overdue(now) {
            LoanStatus::Overdue
        } else {
            LoanStatus::Active
        }
    }

    /// `ceil((now - due_at) / 1 day)` while overdue, 0 otherwise
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_overdue(now) {
            return 0;
        }
        ceil_days(now - self.due_at)
    }

    /// `ceil((due_at - now) / 1 day)` for active loans not yet overdue, 0 otherwise
    pub fn days_until_due(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_active() || self.is_overdue(now) {
            return 0;
        }
        ceil_days(self.due_at - now)
    }
}

/// Loan joined with the title and author of its item
#[derive(Debug, Clone, FromRow)]
pub struct LoanDetails {
    #[sqlx(flatten)]
    pub loan: Loan,
    pub item_title: String,
    pub item_author: String,
}

/// Item summary embedded in a loan view
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanItem {
    pub id: i32,
    pub title: String,
    pub author: String,
}

/// Loan with its derived fields, evaluated at a single instant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanView {
    pub id: i32,
    pub borrower_id: i32,
    pub item: LoanItem,
    pub checked_out_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub due_soon: bool,
    pub days_overdue: i64,
    pub days_until_due: i64,
}

impl LoanView {
    pub fn new(details: LoanDetails, now: DateTime<Utc>) -> Self {
        let loan = details.loan;
        Self {
            id: loan.id,
            borrower_id: loan.borrower_id,
            item: LoanItem {
                id: loan.item_id,
                title: details.item_title,
                author: details.item_author,
            },
            checked_out_at: loan.checked_out_at,
            due_at: loan.due_at,
            returned_at: loan.returned_at,
            status: loan.status(now),
            due_soon: loan.is_due_soon(now),
            days_overdue: loan.days_overdue(now),
            days_until_due: loan.days_until_due(now),
        }
    }
}

/// Status filter for loan listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatusFilter {
    Active,
    Returned,
    Overdue,
}

/// Loan listing query
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub status: Option<LoanStatusFilter>,
    /// Operators only; borrowers are always scoped to their own loans
    pub borrower_id: Option<i32>,
    pub item_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl LoanQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Checkout request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub item_id: i32,
}
