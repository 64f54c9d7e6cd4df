//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{dashboard, health, items, loans};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lending Ledger API",
        version = "0.1.0",
        description = "Item catalog, loans and dashboards"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Items
        items::list_items,
        items::get_item,
        items::create_item,
        items::update_item,
        items::delete_item,
        // Loans
        loans::list_loans,
        loans::checkout,
        loans::get_loan,
        loans::return_loan,
        // Dashboard
        dashboard::get_dashboard,
    ),
    components(
        schemas(
            // Items
            crate::models::item::Item,
            crate::models::item::CreateItem,
            crate::models::item::UpdateItem,
            items::ItemListResponse,
            // Loans
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanStatusFilter,
            crate::models::loan::LoanItem,
            crate::models::loan::LoanView,
            crate::models::loan::CheckoutRequest,
            loans::LoanResponse,
            loans::LoanListResponse,
            // Dashboard
            crate::models::dashboard::CatalogSummary,
            crate::models::dashboard::OverdueBorrower,
            crate::models::dashboard::Pagination,
            crate::models::dashboard::OperatorDashboard,
            crate::models::dashboard::BorrowerSummary,
            crate::models::dashboard::BorrowerDashboard,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "items", description = "Catalog item management"),
        (name = "loans", description = "Checkout and return"),
        (name = "dashboard", description = "Operator and borrower dashboards")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
