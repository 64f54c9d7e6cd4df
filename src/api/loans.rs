//! Loan endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        loan::{CheckoutRequest, Loan, LoanQuery, LoanView},
        pagination::Paged,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Paginated loan list
#[derive(Serialize, ToSchema)]
pub struct LoanListResponse {
    pub items: Vec<LoanView>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl From<Paged<LoanView>> for LoanListResponse {
    fn from(paged: Paged<LoanView>) -> Self {
        Self {
            items: paged.items,
            total: paged.total,
            page: paged.page.page,
            per_page: paged.page.per_page,
        }
    }
}

/// Loan record as stored
#[derive(Serialize, ToSchema)]
pub struct LoanResponse {
    pub id: i32,
    pub borrower_id: i32,
    pub item_id: i32,
    pub checked_out_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl From<Loan> for LoanResponse {
    fn from(loan: Loan) -> Self {
        Self {
            id: loan.id,
            borrower_id: loan.borrower_id,
            item_id: loan.item_id,
            checked_out_at: loan.checked_out_at,
            due_at: loan.due_at,
            returned_at: loan.returned_at,
        }
    }
}

/// List loans
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans, borrowers only see their own", body = LoanListResponse)
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<LoanListResponse>> {
    let paged = state.services.loans.list_loans(&caller, &query).await?;
    Ok(Json(paged.into()))
}

/// Borrow one copy of an item
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Loan created", body = LoanResponse),
        (status = 403, description = "Borrowers only", body = crate::error::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse),
        (status = 409, description = "No copy available or loan already open", body = crate::error::ErrorResponse)
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<LoanResponse>)> {
    caller.require_borrower()?;

    let loan = state.services.loans.checkout(&caller, request.item_id).await?;
    Ok((StatusCode::CREATED, Json(loan.into())))
}

/// Get a loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanView),
        (status = 403, description = "Loan belongs to another borrower", body = crate::error::ErrorResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanView>> {
    let loan = state.services.loans.get_loan(&caller, id).await?;
    Ok(Json(loan))
}

/// Return a borrowed item
#[utoipa::path(
    patch,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan closed", body = LoanResponse),
        (status = 403, description = "Operators only", body = crate::error::ErrorResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Loan already returned", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanResponse>> {
    caller.require_operator()?;

    let loan = state.services.loans.return_loan(id).await?;
    Ok(Json(loan.into()))
}
