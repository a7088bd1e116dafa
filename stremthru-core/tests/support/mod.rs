#![allow(dead_code)]

pub mod provider;

use anyhow::{Context, Result};
use stremthru_core::Store;
use stremthru_core::config::DatabaseConfig;

/// Fresh in-memory SQLite store with the real migrations applied.
pub async fn memory_store() -> Result<Store> {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        run_migrations: true,
    };
    Store::connect(&config)
        .await
        .context("in-memory sqlite store should connect and migrate")
}
