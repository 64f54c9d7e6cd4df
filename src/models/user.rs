//! Caller identity as handed over by the identity service

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Role of the caller, carried explicitly into every ledger call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Borrows items for themself
    Borrower,
    /// Manages the catalog and processes returns
    Operator,
}

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: i32,
    pub role: Role,
}

impl Caller {
    pub fn borrower(id: i32) -> Self {
        Self { id, role: Role::Borrower }
    }

    pub fn operator(id: i32) -> Self {
        Self { id, role: Role::Operator }
    }

    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }

    /// Borrower id to scope reads with; `None` for operators, who see the whole ledger
    pub fn borrower_scope(&self) -> Option<i32> {
        match self.role {
            Role::Borrower => Some(self.id),
            Role::Operator => None,
        }
    }

    pub fn require_borrower(&self) -> Result<(), AppError> {
        if self.role == Role::Borrower {
            Ok(())
        } else {
            Err(AppError::Authorization("Only borrowers can check out items".to_string()))
        }
    }

    pub fn require_operator(&self) -> Result<(), AppError> {
        if self.is_operator() {
            Ok(())
        } else {
            Err(AppError::Authorization("Operator privileges required".to_string()))
        }
    }

    /// Operators may see any loan, borrowers only their own
    pub fn require_loan_access(&self, borrower_id: i32) -> Result<(), AppError> {
        if self.is_operator() || self.id == borrower_id {
            Ok(())
        } else {
            Err(AppError::Authorization("Not allowed to access this loan".to_string()))
        }
    }
}

/// JWT claims issued by the identity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl CallerClaims {
    pub fn new(user_id: i32, role: Role, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            user_id,
            role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Create a signed token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse and verify a token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn caller(&self) -> Caller {
        Caller {
            id: self.user_id,
            role: self.role,
        }
    }
}
