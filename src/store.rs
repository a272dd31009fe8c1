pub mod dao;
pub mod models;

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;

pub use dao::{CatalogStore, PgCatalogStore};
pub use models::LoadBatch;

/// Builds the catalog pool. Connections are opened on first use.
///
/// # Errors
/// Fails when the DSN cannot be parsed.
pub fn connect_pool(config: &Config) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(config.db_acquire_timeout())
        .test_before_acquire(true)
        .connect_lazy(config.db_dsn())
        .context("failed to configure catalog connection pool")
}
