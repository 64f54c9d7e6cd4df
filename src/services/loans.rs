//! Loan management service

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    config::PaginationConfig,
    error::{AppError, AppResult, ConflictKind},
    models::{
        loan::{Loan, LoanQuery, LoanView},
        pagination::Paged,
        user::Caller,
    },
    repository::loans::{LoanFilter, LoanLedger},
};

#[derive(Clone)]
pub struct LoansService {
    ledger: Arc<dyn LoanLedger>,
    pagination: PaginationConfig,
}

impl LoansService {
    pub fn new(ledger: Arc<dyn LoanLedger>, pagination: PaginationConfig) -> Self {
        Self { ledger, pagination }
    }

    /// Check out one copy of `item_id` for the caller.
    ///
    /// A transient storage failure (lock wait timeout, deadlock, lost
    /// connection) replays the whole transaction once; the replay re-reads the
    /// item under a fresh lock. Business conflicts are never retried.
    ///
    /// A connection lost during commit leaves the outcome unknown. If the replay
    /// then finds the borrower already holding the item, that open loan is the
    /// one the first attempt committed and is returned as the result.
    pub async fn checkout(&self, caller: &Caller, item_id: i32) -> AppResult<Loan> {
        let borrower_id = caller.id;

        let loan = match self.ledger.checkout(item_id, borrower_id, Utc::now()).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(item_id, borrower_id, error = %e, "Checkout failed transiently, retrying once");
                self.retry_checkout(item_id, borrower_id).await?
            }
            result => result?,
        };

        tracing::info!(loan_id = loan.id, item_id, borrower_id, due_at = %loan.due_at, "Item checked out");
        Ok(loan)
    }

    async fn retry_checkout(&self, item_id: i32, borrower_id: i32) -> AppResult<Loan> {
        match self.ledger.checkout(item_id, borrower_id, Utc::now()).await {
            Err(AppError::Conflict(ConflictKind::DuplicateLoan)) => {
                match self.ledger.find_open(item_id, borrower_id).await? {
                    Some(loan) => {
                        tracing::info!(loan_id = loan.id, item_id, borrower_id, "First checkout attempt had committed");
                        Ok(loan)
                    }
                    None => Err(AppError::Conflict(ConflictKind::DuplicateLoan)),
                }
            }
            result => result,
        }
    }

    /// Return a borrowed item now
    pub async fn return_loan(&self, loan_id: i32) -> AppResult<Loan> {
        self.mark_returned(loan_id, Utc::now()).await
    }

    /// Close an open loan at `at`. A loan can be returned only once.
    pub async fn mark_returned(&self, loan_id: i32, at: DateTime<Utc>) -> AppResult<Loan> {
        let loan = self.ledger.get_by_id(loan_id).await?;

        if loan.is_returned() {
            return Err(AppError::Conflict(ConflictKind::AlreadyReturned));
        }

        if at < loan.checked_out_at {
            return Err(AppError::Validation(
                "Return time cannot be earlier than checkout time".to_string(),
            ));
        }

        // A concurrent return may still win between the read above and this update;
        // the ledger re-checks `returned_at IS NULL` atomically.
        let returned = self.ledger.mark_returned(loan_id, at).await?;

        tracing::info!(
            loan_id,
            item_id = returned.item_id,
            borrower_id = returned.borrower_id,
            "Loan returned"
        );
        Ok(returned)
    }

    /// Loan with derived status; borrowers may only see their own
    pub async fn get_loan(&self, caller: &Caller, loan_id: i32) -> AppResult<LoanView> {
        let details = self.ledger.get_details(loan_id).await?;
        caller.require_loan_access(details.loan.borrower_id)?;
        Ok(LoanView::new(details, Utc::now()))
    }

    /// Paginated loan listing, scoped to the caller for borrowers
    pub async fn list_loans(&self, caller: &Caller, query: &LoanQuery) -> AppResult<Paged<LoanView>> {
        let page = query.page_request().resolve(&self.pagination);
        let filter = LoanFilter {
            status: query.status,
            borrower_id: caller.borrower_scope().or(query.borrower_id),
            item_id: query.item_id,
        };

        let now = Utc::now();
        let (items, total) = self.ledger.list(&filter, page, now).await?;
        Ok(Paged { items, total, page }.map(|details| LoanView::new(details, now)))
    }
}
