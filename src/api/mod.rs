//! API handlers for the lending ledger REST endpoints

pub mod dashboard;
pub mod health;
pub mod items;
pub mod loans;
pub mod openapi;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, patch},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::AppError,
    models::user::{Caller, CallerClaims},
    AppState,
};

/// Extractor for the calling borrower or operator, taken from the bearer token
pub struct AuthenticatedUser(pub Caller);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = CallerClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims.caller()))
    }
}

/// Build the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Catalog
        .route("/items", get(items::list_items).post(items::create_item))
        .route(
            "/items/:id",
            get(items::get_item).put(items::update_item).delete(items::delete_item),
        )
        // Loans
        .route("/loans", get(loans::list_loans).post(loans::checkout))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/return", patch(loans::return_loan))
        // Dashboard
        .route("/dashboard", get(dashboard::get_dashboard))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}
