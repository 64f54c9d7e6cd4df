//! Item (catalog) endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        item::{CreateItem, Item, ItemQuery, UpdateItem},
        pagination::Paged,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Paginated item list
#[derive(Serialize, ToSchema)]
pub struct ItemListResponse {
    pub items: Vec<Item>,
    /// Total number of matching items
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl From<Paged<Item>> for ItemListResponse {
    fn from(paged: Paged<Item>) -> Self {
        Self {
            items: paged.items,
            total: paged.total,
            page: paged.page.page,
            per_page: paged.page.per_page,
        }
    }
}

/// List items with search and pagination
#[utoipa::path(
    get,
    path = "/items",
    tag = "items",
    security(("bearer_auth" = [])),
    params(ItemQuery),
    responses(
        (status = 200, description = "List of items", body = ItemListResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_items(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(query): Query<ItemQuery>,
) -> AppResult<Json<ItemListResponse>> {
    let paged = state.services.catalog.search_items(&caller, &query).await?;
    Ok(Json(paged.into()))
}

/// Get item details by ID
#[utoipa::path(
    get,
    path = "/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Item details", body = Item),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_item(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Item>> {
    let item = state.services.catalog.get_item(&caller, id).await?;
    Ok(Json(item))
}

/// Create a new item
#[utoipa::path(
    post,
    path = "/items",
    tag = "items",
    security(("bearer_auth" = [])),
    request_body = CreateItem,
    responses(
        (status = 201, description = "Item created", body = Item),
        (status = 403, description = "Operators only", body = crate::error::ErrorResponse),
        (status = 409, description = "External code already in use", body = crate::error::ErrorResponse),
        (status = 422, description = "Invalid input", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_item(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(item): Json<CreateItem>,
) -> AppResult<(StatusCode, Json<Item>)> {
    caller.require_operator()?;

    let created = state.services.catalog.create_item(item).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update an existing item
#[utoipa::path(
    put,
    path = "/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Item ID")
    ),
    request_body = UpdateItem,
    responses(
        (status = 200, description = "Item updated", body = Item),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Copy count below open loans", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_item(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(item): Json<UpdateItem>,
) -> AppResult<Json<Item>> {
    caller.require_operator()?;

    let updated = state.services.catalog.update_item(&caller, id, item).await?;
    Ok(Json(updated))
}

/// Delete an item
#[utoipa::path(
    delete,
    path = "/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 204, description = "Item deleted"),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Item has open loans", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_item(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    caller.require_operator()?;

    state.services.catalog.delete_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
