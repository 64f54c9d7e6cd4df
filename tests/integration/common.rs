//! Shared helpers

use std::sync::Arc;

use chrono::Duration;
use lending_ledger::{
    config::AppConfig,
    models::user::{CallerClaims, Role},
    repository::Repository,
    services::Services,
    AppState,
};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub fn bearer(config: &AppConfig, user_id: i32, role: Role) -> String {
    let token = CallerClaims::new(user_id, role, Duration::hours(1))
        .create_token(&config.auth.jwt_secret)
        .expect("Failed to sign token");
    format!("Bearer {}", token)
}

pub fn state(pool: PgPool) -> AppState {
    let config = AppConfig::default();
    let repository = Repository::new(pool, &config.ledger);
    let services = Services::new(repository, config.pagination.clone());
    AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    }
}

/// State over a pool that never connects unless a handler reaches the database
pub fn lazy_state() -> AppState {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&AppConfig::default().database.url)
        .expect("Invalid database url");
    state(pool)
}
