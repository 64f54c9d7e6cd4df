//! Dashboard endpoint

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{dashboard::Dashboard, pagination::PageRequest},
    AppState,
};

use super::AuthenticatedUser;

/// Dashboard for the caller's role.
///
/// Operators get the catalog summary and the overdue ranking (`kind = "operator"`),
/// borrowers get their own open and overdue loans (`kind = "borrower"`).
#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "dashboard",
    security(("bearer_auth" = [])),
    params(PageRequest),
    responses(
        (status = 200, description = "Operator dashboard, or BorrowerDashboard for borrowers",
            body = crate::models::dashboard::OperatorDashboard),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(page): Query<PageRequest>,
) -> AppResult<Json<Dashboard>> {
    let dashboard = state.services.dashboard.dashboard(&caller, page).await?;
    Ok(Json(dashboard))
}
