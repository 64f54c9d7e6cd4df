//! Catalog management service

use validator::Validate;

use crate::{
    config::PaginationConfig,
    error::AppResult,
    models::{
        item::{CreateItem, Item, ItemQuery, UpdateItem},
        pagination::Paged,
        user::Caller,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    pagination: PaginationConfig,
}

impl CatalogService {
    pub fn new(repository: Repository, pagination: PaginationConfig) -> Self {
        Self { repository, pagination }
    }

    /// Search items with filters
    pub async fn search_items(&self, caller: &Caller, query: &ItemQuery) -> AppResult<Paged<Item>> {
        let page = query.page_request().resolve(&self.pagination);
        let (items, total) = self
            .repository
            .items
            .search(query, page, caller.borrower_scope())
            .await?;
        Ok(Paged { items, total, page }.map(Item::from))
    }

    /// Get item by ID
    pub async fn get_item(&self, caller: &Caller, id: i32) -> AppResult<Item> {
        let row = self.repository.items.get_by_id(id, caller.borrower_scope()).await?;
        Ok(Item::from(row))
    }

    /// Create a new item
    pub async fn create_item(&self, item: CreateItem) -> AppResult<Item> {
        item.validate()?;
        let created = self.repository.items.create(&item).await?;
        tracing::info!(item_id = created.id, external_code = %created.external_code, "Item created");
        Ok(Item::from(created))
    }

    /// Update an existing item
    pub async fn update_item(&self, caller: &Caller, id: i32, item: UpdateItem) -> AppResult<Item> {
        item.validate()?;
        self.repository.items.update(id, &item).await?;
        tracing::info!(item_id = id, "Item updated");
        self.get_item(caller, id).await
    }

    /// Delete an item; refused while it has open loans
    pub async fn delete_item(&self, id: i32) -> AppResult<()> {
        self.repository.items.delete(id).await?;
        tracing::info!(item_id = id, "Item deleted");
        Ok(())
    }

    /// `total_copies - open loans`
    pub async fn available_copies(&self, id: i32) -> AppResult<i64> {
        Ok(self.repository.items.availability(id).await?.available_copies())
    }

    pub async fn is_available(&self, id: i32) -> AppResult<bool> {
        Ok(self.repository.items.availability(id).await?.is_available())
    }

    /// Whether the borrower holds an open loan on the item
    pub async fn has_open_loan(&self, id: i32, borrower_id: i32) -> AppResult<bool> {
        // Verify item exists
        self.repository.items.availability(id).await?;
        self.repository.items.has_open_loan(id, borrower_id).await
    }
}
