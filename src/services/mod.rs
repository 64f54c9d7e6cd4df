//! Business logic services

pub mod catalog;
pub mod dashboard;
pub mod loans;

use std::sync::Arc;

use crate::{config::PaginationConfig, error::AppResult, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub dashboard: dashboard::DashboardService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, pagination: PaginationConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(repository.clone(), pagination.clone()),
            loans: loans::LoansService::new(Arc::new(repository.loans.clone()), pagination.clone()),
            dashboard: dashboard::DashboardService::new(repository.clone(), pagination),
            repository,
        }
    }

    /// Check that the database answers
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
