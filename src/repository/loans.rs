//! Loans repository: the loan ledger and the checkout and return protocols.
//!
//! The item row is the serialisation point for an item's capacity. Checkout
//! locks it with `SELECT ... FOR UPDATE` and re-reads the open-loan count
//! under that lock, so two requests racing for the last copy cannot both
//! see it free. Returns only ever release capacity and take no item lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Pool, Postgres, QueryBuilder};

use crate::{
    error::{is_unique_violation, AppError, AppResult, ConflictKind, OPEN_LOAN_UNIQUE_INDEX},
    models::{
        item::Availability,
        loan::{due_at_for, Loan, LoanDetails, LoanStatusFilter},
        pagination::Page,
    },
};

use super::begin_snapshot;

pub(crate) const LOAN_COLUMNS: &str =
    "id, borrower_id, item_id, checked_out_at, due_at, returned_at";

pub(crate) const LOAN_DETAILS_SELECT: &str = r#"
    SELECT l.id, l.borrower_id, l.item_id, l.checked_out_at, l.due_at, l.returned_at,
           i.title AS item_title, i.author AS item_author
    FROM loans l
    JOIN items i ON i.id = l.item_id
"#;

/// Lock the item row until the surrounding transaction ends; returns its total copy count
pub(crate) async fn lock_item<'e, E>(executor: E, item_id: i32) -> AppResult<i32>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, i32>("SELECT total_copies FROM items WHERE id = $1 FOR UPDATE")
        .bind(item_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::item_not_found(item_id))
}

/// Number of open loans on an item
pub(crate) async fn count_open_loans<'e, E>(executor: E, item_id: i32) -> AppResult<i64>
where
    E: PgExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM loans WHERE item_id = $1 AND returned_at IS NULL",
    )
    .bind(item_id)
    .fetch_one(executor)
    .await?;
    Ok(count)
}

/// Whether the borrower currently holds an open loan on the item
pub(crate) async fn has_open_loan<'e, E>(executor: E, item_id: i32, borrower_id: i32) -> AppResult<bool>
where
    E: PgExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM loans WHERE item_id = $1 AND borrower_id = $2 AND returned_at IS NULL)",
    )
    .bind(item_id)
    .bind(borrower_id)
    .fetch_one(executor)
    .await?;
    Ok(exists)
}

fn map_open_loan_violation(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err, OPEN_LOAN_UNIQUE_INDEX) {
        AppError::Conflict(ConflictKind::DuplicateLoan)
    } else {
        AppError::Database(err)
    }
}

/// Resolved filter for loan listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub status: Option<LoanStatusFilter>,
    pub borrower_id: Option<i32>,
    pub item_id: Option<i32>,
}

/// Loan ledger operations used by the loans service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanLedger: Send + Sync {
    /// Create an open loan for `borrower_id` on `item_id`, checked out at `now`
    async fn checkout(&self, item_id: i32, borrower_id: i32, now: DateTime<Utc>) -> AppResult<Loan>;

    /// Close an open loan
    async fn mark_returned(&self, loan_id: i32, at: DateTime<Utc>) -> AppResult<Loan>;

    async fn get_by_id(&self, loan_id: i32) -> AppResult<Loan>;

    /// The borrower's open loan on the item, if any
    async fn find_open(&self, item_id: i32, borrower_id: i32) -> AppResult<Option<Loan>>;

    async fn get_details(&self, loan_id: i32) -> AppResult<LoanDetails>;

    async fn list(
        &self,
        filter: &LoanFilter,
        page: Page,
        now: DateTime<Utc>,
    ) -> AppResult<(Vec<LoanDetails>, i64)>;
}

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
    lock_timeout_ms: u64,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>, lock_timeout_ms: u64) -> Self {
        Self { pool, lock_timeout_ms }
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &LoanFilter, now: DateTime<Utc>) {
        builder.push(" WHERE 1=1");

        match filter.status {
            Some(LoanStatusFilter::Active) => {
                builder.push(" AND l.returned_at IS NULL");
            }
            Some(LoanStatusFilter::Returned) => {
                builder.push(" AND l.returned_at IS NOT NULL");
            }
            Some(LoanStatusFilter::Overdue) => {
                builder.push(" AND l.returned_at IS NULL AND l.due_at < ");
                builder.push_bind(now);
            }
            None => {}
        }

        if let Some(borrower_id) = filter.borrower_id {
            builder.push(" AND l.borrower_id = ");
            builder.push_bind(borrower_id);
        }

        if let Some(item_id) = filter.item_id {
            builder.push(" AND l.item_id = ");
            builder.push_bind(item_id);
        }
    }
}

#[async_trait]
impl LoanLedger for LoansRepository {
    async fn checkout(&self, item_id: i32, borrower_id: i32, now: DateTime<Utc>) -> AppResult<Loan> {
        // Dropping `tx` on any early return rolls the transaction back and releases the lock.
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await?;

        let total_copies = lock_item(&mut *tx, item_id).await?;
        let open_loans = count_open_loans(&mut *tx, item_id).await?;

        if !Availability::new(total_copies, open_loans).can_lend_one_more() {
            tracing::debug!(item_id, borrower_id, open_loans, total_copies, "Checkout rejected: no copy left");
            return Err(AppError::Conflict(ConflictKind::ItemNotAvailable));
        }

        if has_open_loan(&mut *tx, item_id, borrower_id).await? {
            tracing::debug!(item_id, borrower_id, "Checkout rejected: borrower already holds this item");
            return Err(AppError::Conflict(ConflictKind::DuplicateLoan));
        }

        let loan = sqlx::query_as::<_, Loan>(&format!(
            r#"
            INSERT INTO loans (borrower_id, item_id, checked_out_at, due_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(borrower_id)
        .bind(item_id)
        .bind(now)
        .bind(due_at_for(now))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_open_loan_violation)?;

        tx.commit().await.map_err(map_open_loan_violation)?;

        Ok(loan)
    }

    async fn mark_returned(&self, loan_id: i32, at: DateTime<Utc>) -> AppResult<Loan> {
        // The `returned_at IS NULL` guard is evaluated against the committed row,
        // so of two concurrent returns only one can match.
        let returned = sqlx::query_as::<_, Loan>(&format!(
            r#"
            UPDATE loans SET returned_at = $2
            WHERE id = $1 AND returned_at IS NULL
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(loan_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(loan) = returned {
            return Ok(loan);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM loans WHERE id = $1)")
            .bind(loan_id)
            .fetch_one(&self.pool)
            .await?;

        if exists {
            Err(AppError::Conflict(ConflictKind::AlreadyReturned))
        } else {
            Err(AppError::loan_not_found(loan_id))
        }
    }

    async fn get_by_id(&self, loan_id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::loan_not_found(loan_id))
    }

    async fn find_open(&self, item_id: i32, borrower_id: i32) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE item_id = $1 AND borrower_id = $2 AND returned_at IS NULL",
            LOAN_COLUMNS
        ))
        .bind(item_id)
        .bind(borrower_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loan)
    }

    async fn get_details(&self, loan_id: i32) -> AppResult<LoanDetails> {
        sqlx::query_as::<_, LoanDetails>(&format!("{} WHERE l.id = $1", LOAN_DETAILS_SELECT))
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::loan_not_found(loan_id))
    }

    async fn list(
        &self,
        filter: &LoanFilter,
        page: Page,
        now: DateTime<Utc>,
    ) -> AppResult<(Vec<LoanDetails>, i64)> {
        let mut tx = begin_snapshot(&self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM loans l");
        Self::push_filter(&mut count, filter, now);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&mut *tx).await?;

        let mut select = QueryBuilder::<Postgres>::new(LOAN_DETAILS_SELECT);
        Self::push_filter(&mut select, filter, now);
        select.push(" ORDER BY l.id LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());
        let loans = select
            .build_query_as::<LoanDetails>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((loans, total))
    }
}
