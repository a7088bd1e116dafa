//! Relational storage: the id map and mirrored external lists.
//!
//! Postgres and SQLite share the statements rendered in [`sql`]; each backend
//! owns parameter binding and classifies unique violations on the id map into
//! [`StoreError::ConstraintViolation`].

pub mod conflict;
pub mod infrastructure;
pub mod ports;
pub mod rows;
pub mod sql;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::types::IdColumn;

use infrastructure::{
    PostgresBackend, SqlBackend, SqlIdentityRepository, SqlListRepository, SqliteBackend,
};
use ports::{IdentityRepository, ListRepository};
use sql::Dialect;

pub static POSTGRES_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgres");
pub static SQLITE_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

#[derive(Error, Debug)]
pub enum StoreError {
    /// A write collided with another record's value in a unique id column.
    #[error("unique constraint violated on id_map.{column}")]
    ConstraintViolation { column: IdColumn },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Unsupported database url: {0}")]
    UnsupportedUrl(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Handle to the configured backend and the repositories built on it.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn SqlBackend>,
    identities: Arc<dyn IdentityRepository>,
    lists: Arc<dyn ListRepository>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("dialect", &self.backend.dialect())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Connects to the database named by `config.url`, applying migrations
    /// when `run_migrations` is set.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let url = config.url.trim();
        let backend: Arc<dyn SqlBackend> = if url.starts_with("postgres://")
            || url.starts_with("postgresql://")
        {
            Arc::new(PostgresBackend::connect(url, config.max_connections).await?)
        } else if url.starts_with("sqlite:") {
            Arc::new(SqliteBackend::connect(url, config.max_connections).await?)
        } else {
            return Err(StoreError::UnsupportedUrl(url.to_string()));
        };

        let store = Self::from_backend(backend);
        if config.run_migrations {
            store.migrate().await?;
        }
        Ok(store)
    }

    pub fn from_backend(backend: Arc<dyn SqlBackend>) -> Self {
        Self {
            identities: Arc::new(SqlIdentityRepository::new(backend.clone())),
            lists: Arc::new(SqlListRepository::new(backend.clone())),
            backend,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_backend(Arc::new(PostgresBackend::new(pool)))
    }

    pub fn sqlite(pool: sqlx::SqlitePool) -> Self {
        Self::from_backend(Arc::new(SqliteBackend::new(pool)))
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        self.backend.migrate().await?;
        info!(dialect = ?self.backend.dialect(), "database migrations applied");
        Ok(())
    }

    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    pub fn identities(&self) -> Arc<dyn IdentityRepository> {
        self.identities.clone()
    }

    pub fn lists(&self) -> Arc<dyn ListRepository> {
        self.lists.clone()
    }
}
