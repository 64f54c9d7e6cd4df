//! Items repository: catalog records and their availability.
//!
//! Writes that depend on the open-loan count (shrinking `total_copies`,
//! deleting) take the same item row lock as checkout.

use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{is_unique_violation, AppError, AppResult, ConflictKind, EXTERNAL_CODE_UNIQUE_KEY},
    models::{
        item::{Availability, CreateItem, ItemQuery, ItemRow, UpdateItem},
        pagination::Page,
    },
};

use super::{
    begin_snapshot, like_pattern,
    loans::{count_open_loans, has_open_loan, lock_item},
};

/// Item columns plus open-loan count; the caller's borrower id (or NULL) is pushed as a bind
/// right after this fragment.
const ITEM_SELECT_HEAD: &str = r#"
    SELECT i.id, i.title, i.author, i.category, i.external_code, i.total_copies,
           (SELECT COUNT(*) FROM loans l
             WHERE l.item_id = i.id AND l.returned_at IS NULL) AS open_loans,
           i.created_at, i.updated_at,
           CASE WHEN b.borrower_id IS NULL THEN NULL
                ELSE EXISTS(SELECT 1 FROM loans l
                             WHERE l.item_id = i.id AND l.returned_at IS NULL
                               AND l.borrower_id = b.borrower_id)
           END AS borrowed_by_caller
    FROM items i
    CROSS JOIN (SELECT "#;

const ITEM_SELECT_TAIL: &str = "::int AS borrower_id) b";

fn map_external_code_violation(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err, EXTERNAL_CODE_UNIQUE_KEY) {
        AppError::Conflict(ConflictKind::DuplicateExternalCode)
    } else {
        AppError::Database(err)
    }
}

#[derive(Clone)]
pub struct ItemsRepository {
    pool: Pool<Postgres>,
}

impl ItemsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn select(borrower_id: Option<i32>) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(ITEM_SELECT_HEAD);
        builder.push_bind(borrower_id);
        builder.push(ITEM_SELECT_TAIL);
        builder
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ItemQuery) {
        builder.push(" WHERE 1=1");

        if let Some(ref title) = query.title {
            builder.push(" AND i.title ILIKE ");
            builder.push_bind(like_pattern(title));
        }

        if let Some(ref author) = query.author {
            builder.push(" AND i.author ILIKE ");
            builder.push_bind(like_pattern(author));
        }

        if let Some(ref category) = query.category {
            builder.push(" AND i.category = ");
            builder.push_bind(category.clone());
        }

        if let Some(available) = query.available {
            builder.push(if available { " AND i.total_copies > " } else { " AND i.total_copies <= " });
            builder.push(
                "(SELECT COUNT(*) FROM loans l WHERE l.item_id = i.id AND l.returned_at IS NULL)",
            );
        }
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Get item by ID. `borrower_id` fills `borrowed_by_caller`.
    pub async fn get_by_id(&self, id: i32, borrower_id: Option<i32>) -> AppResult<ItemRow> {
        let mut builder = Self::select(borrower_id);
        builder.push(" WHERE i.id = ");
        builder.push_bind(id);

        builder
            .build_query_as::<ItemRow>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::item_not_found(id))
    }

    /// Search items with filters and pagination
    pub async fn search(
        &self,
        query: &ItemQuery,
        page: Page,
        borrower_id: Option<i32>,
    ) -> AppResult<(Vec<ItemRow>, i64)> {
        let mut tx = begin_snapshot(&self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM items i");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&mut *tx).await?;

        let mut select = Self::select(borrower_id);
        Self::push_filters(&mut select, query);
        select.push(" ORDER BY i.title, i.id LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());
        let items = select
            .build_query_as::<ItemRow>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((items, total))
    }

    /// Total copies and open-loan count, read from one snapshot
    pub async fn availability(&self, id: i32) -> AppResult<Availability> {
        let row: Option<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT i.total_copies,
                   (SELECT COUNT(*) FROM loans l
                     WHERE l.item_id = i.id AND l.returned_at IS NULL)
            FROM items i
            WHERE i.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(total, open)| Availability::new(total, open))
            .ok_or_else(|| AppError::item_not_found(id))
    }

    pub async fn has_open_loan(&self, id: i32, borrower_id: i32) -> AppResult<bool> {
        has_open_loan(&self.pool, id, borrower_id).await
    }

    // =========================================================================
    // WRITE
    // =========================================================================

    /// Create a new item
    pub async fn create(&self, item: &CreateItem) -> AppResult<ItemRow> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            INSERT INTO items (title, author, category, external_code, total_copies)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, author, category, external_code, total_copies,
                      0::bigint AS open_loans, created_at, updated_at
            "#,
        )
        .bind(&item.title)
        .bind(&item.author)
        .bind(&item.category)
        .bind(&item.external_code)
        .bind(item.total_copies)
        .fetch_one(&self.pool)
        .await
        .map_err(map_external_code_violation)?;

        Ok(row)
    }

    /// Update an item. Lowering `total_copies` below the current open-loan
    /// count is rejected, under the item row lock.
    pub async fn update(&self, id: i32, item: &UpdateItem) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        lock_item(&mut *tx, id).await?;

        if let Some(total_copies) = item.total_copies {
            let open_loans = count_open_loans(&mut *tx, id).await?;
            if i64::from(total_copies) < open_loans {
                return Err(AppError::Conflict(ConflictKind::CopiesBelowOpenLoans));
            }
        }

        sqlx::query(
            r#"
            UPDATE items SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                category = COALESCE($4, category),
                external_code = COALESCE($5, external_code),
                total_copies = COALESCE($6, total_copies),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&item.title)
        .bind(&item.author)
        .bind(&item.category)
        .bind(&item.external_code)
        .bind(item.total_copies)
        .execute(&mut *tx)
        .await
        .map_err(map_external_code_violation)?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete an item and its loan history. Refused while any loan on it is open;
    /// the check runs under the item row lock so no checkout can slip in between.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        lock_item(&mut *tx, id).await?;

        if count_open_loans(&mut *tx, id).await? > 0 {
            return Err(AppError::Conflict(ConflictKind::ItemHasActiveLoans));
        }

        sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
