//! Repository layer for database operations

pub mod dashboard;
pub mod items;
pub mod loans;

use sqlx::{Pool, Postgres, Transaction};

use crate::{config::LedgerConfig, error::AppResult};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub items: items::ItemsRepository,
    pub loans: loans::LoansRepository,
    pub dashboard: dashboard::DashboardRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>, ledger: &LedgerConfig) -> Self {
        Self {
            items: items::ItemsRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone(), ledger.lock_timeout_ms),
            dashboard: dashboard::DashboardRepository::new(pool.clone()),
            pool,
        }
    }

    /// Round trip to the database, used by the readiness check
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Open a read-only transaction whose queries all see the same snapshot.
/// Takes no row locks, so it never waits on a checkout in progress.
pub(crate) async fn begin_snapshot(pool: &Pool<Postgres>) -> AppResult<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Escape `%`, `_` and `\` so user input matches literally inside a LIKE pattern
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
