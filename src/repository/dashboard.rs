//! Read-only aggregations over the ledger.
//!
//! Every figure is computed live from the loans and items tables inside one
//! snapshot transaction; nothing here writes or locks rows.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        dashboard::{CatalogSummary, OverdueBorrower},
        loan::LoanDetails,
        pagination::Page,
    },
};

use super::{begin_snapshot, loans::LOAN_DETAILS_SELECT};

/// Start of the UTC calendar day containing `now`
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// Operator view of the ledger at one instant
#[derive(Debug, Clone)]
pub struct OperatorSnapshot {
    pub summary: CatalogSummary,
    pub overdue_borrowers: Vec<OverdueBorrower>,
    pub overdue_borrowers_total: i64,
}

/// Borrower view of the ledger at one instant
#[derive(Debug, Clone)]
pub struct BorrowerSnapshot {
    pub open_loans: Vec<LoanDetails>,
    pub open_loans_total: i64,
    pub overdue_loans: Vec<LoanDetails>,
    pub overdue_total: i64,
}

#[derive(Clone)]
pub struct DashboardRepository {
    pool: Pool<Postgres>,
}

impl DashboardRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Catalog summary plus one page of the overdue-borrower ranking
    pub async fn operator_snapshot(&self, now: DateTime<Utc>, page: Page) -> AppResult<OperatorSnapshot> {
        let today = day_start(now);
        let tomorrow = today + Duration::days(1);

        let mut tx = begin_snapshot(&self.pool).await?;

        let summary = sqlx::query_as::<_, CatalogSummary>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM items) AS total_items,
                (SELECT COUNT(*) FROM loans WHERE returned_at IS NULL) AS total_open_loans,
                (SELECT COUNT(*) FROM loans
                  WHERE returned_at IS NULL AND due_at >= $2 AND due_at < $3) AS due_today,
                (SELECT COUNT(*) FROM loans
                  WHERE returned_at IS NULL AND due_at < $1) AS overdue_loans
            "#,
        )
        .bind(now)
        .bind(today)
        .bind(tomorrow)
        .fetch_one(&mut *tx)
        .await?;

        let overdue_borrowers_total: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT borrower_id) FROM loans WHERE returned_at IS NULL AND due_at < $1",
        )
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // Ties on the count fall back to borrower id so pages never overlap.
        let overdue_borrowers = sqlx::query_as::<_, OverdueBorrower>(
            r#"
            SELECT borrower_id, COUNT(*) AS overdue_count
            FROM loans
            WHERE returned_at IS NULL AND due_at < $1
            GROUP BY borrower_id
            ORDER BY overdue_count DESC, borrower_id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(now)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(OperatorSnapshot {
            summary,
            overdue_borrowers,
            overdue_borrowers_total,
        })
    }

    /// One page of a borrower's open loans (soonest due first) and all of their overdue loans
    pub async fn borrower_snapshot(
        &self,
        borrower_id: i32,
        now: DateTime<Utc>,
        page: Page,
    ) -> AppResult<BorrowerSnapshot> {
        let mut tx = begin_snapshot(&self.pool).await?;

        let open_loans_total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE borrower_id = $1 AND returned_at IS NULL",
        )
        .bind(borrower_id)
        .fetch_one(&mut *tx)
        .await?;

        let open_loans = sqlx::query_as::<_, LoanDetails>(&format!(
            r#"{}
            WHERE l.borrower_id = $1 AND l.returned_at IS NULL
            ORDER BY l.due_at ASC, l.id ASC
            LIMIT $2 OFFSET $3
            "#,
            LOAN_DETAILS_SELECT
        ))
        .bind(borrower_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *tx)
        .await?;

        let overdue_loans = sqlx::query_as::<_, LoanDetails>(&format!(
            r#"{}
            WHERE l.borrower_id = $1 AND l.returned_at IS NULL AND l.due_at < $2
            ORDER BY l.due_at ASC, l.id ASC
            "#,
            LOAN_DETAILS_SELECT
        ))
        .bind(borrower_id)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let overdue_total = overdue_loans.len() as i64;

        Ok(BorrowerSnapshot {
            open_loans,
            open_loans_total,
            overdue_loans,
            overdue_total,
        })
    }
}
