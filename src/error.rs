//! Error types for the lending ledger

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Constraint guarding "one open loan per borrower and item"
pub const OPEN_LOAN_UNIQUE_INDEX: &str = "loans_one_open_per_borrower_item";

/// Constraint guarding the item external catalog code
pub const EXTERNAL_CODE_UNIQUE_KEY: &str = "items_external_code_key";

/// PostgreSQL SQLSTATE codes treated as transient
const SQLSTATE_LOCK_NOT_AVAILABLE: &str = "55P03";
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

/// Application error codes returned in error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NotAuthorized = 2,
    DbFailure = 3,
    ItemNotAvailable = 7,
    Duplicate = 8,
    BadValue = 18,
    NoSuchData = 20,
    DuplicateLoan = 22,
    AlreadyReturned = 23,
    ItemHasActiveLoans = 24,
    CopiesBelowOpenLoans = 25,
}

/// Business conflicts detected by the ledger protocols
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    #[error("Item is not available for borrowing")]
    ItemNotAvailable,

    #[error("You already have an active loan for this item")]
    DuplicateLoan,

    #[error("Loan has already been returned")]
    AlreadyReturned,

    #[error("Cannot delete item with active loans")]
    ItemHasActiveLoans,

    #[error("An item with this external code already exists")]
    DuplicateExternalCode,

    #[error("Total copies cannot be lower than the number of active loans")]
    CopiesBelowOpenLoans,
}

impl ConflictKind {
    fn code(self) -> ErrorCode {
        match self {
            ConflictKind::ItemNotAvailable => ErrorCode::ItemNotAvailable,
            ConflictKind::DuplicateLoan => ErrorCode::DuplicateLoan,
            ConflictKind::AlreadyReturned => ErrorCode::AlreadyReturned,
            ConflictKind::ItemHasActiveLoans => ErrorCode::ItemHasActiveLoans,
            ConflictKind::DuplicateExternalCode => ErrorCode::Duplicate,
            ConflictKind::CopiesBelowOpenLoans => ErrorCode::CopiesBelowOpenLoans,
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),
}

impl AppError {
    pub fn item_not_found(id: i32) -> Self {
        AppError::NotFound(format!("Item with id {} not found", id))
    }

    pub fn loan_not_found(id: i32) -> Self {
        AppError::NotFound(format!("Loan with id {} not found", id))
    }

    /// Storage failures that may succeed when the whole transaction is replayed:
    /// lock wait timeouts, serialization failures, deadlocks and lost connections.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db) => matches!(
                    db.code().as_deref(),
                    Some(SQLSTATE_LOCK_NOT_AVAILABLE)
                        | Some(SQLSTATE_SERIALIZATION_FAILURE)
                        | Some(SQLSTATE_DEADLOCK_DETECTED)
                ),
                _ => false,
            },
            _ => false,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) | AppError::Authorization(_) => ErrorCode::NotAuthorized,
            AppError::NotFound(_) => ErrorCode::NoSuchData,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Conflict(kind) => kind.code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// True when `err` is a unique violation raised by `constraint`
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some(SQLSTATE_UNIQUE_VIOLATION)
                && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Conflict(kind) => kind.to_string(),
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg) => msg.clone(),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
