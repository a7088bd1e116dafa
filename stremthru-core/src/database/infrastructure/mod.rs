//! Storage adapters. Each backend implements [`SqlBackend`]; the repositories
//! on top of it are dialect-neutral.

pub mod postgres;
pub mod repositories;
pub mod sqlite;

use async_trait::async_trait;

use crate::database::StoreResult;
use crate::database::rows::{GenreRow, IdentityRow, ItemRow, ListRow};
use crate::database::sql::{Dialect, Statement};

pub use postgres::PostgresBackend;
pub use repositories::{SqlIdentityRepository, SqlListRepository};
pub use sqlite::SqliteBackend;

/// Executes rendered statements against one database.
///
/// Implementations map unique violations on the id map to
/// `StoreError::ConstraintViolation` and every other failure to
/// `StoreError::Database`.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn migrate(&self) -> StoreResult<()>;

    /// Returns the number of affected rows.
    async fn execute(&self, statement: Statement) -> StoreResult<u64>;

    /// Runs every statement in a single transaction, rolling back on the
    /// first failure.
    async fn execute_in_transaction(&self, statements: Vec<Statement>) -> StoreResult<()>;

    async fn fetch_identities(&self, statement: Statement) -> StoreResult<Vec<IdentityRow>>;

    /// Single text column named `value`.
    async fn fetch_values(&self, statement: Statement) -> StoreResult<Vec<String>>;

    async fn fetch_list(&self, statement: Statement) -> StoreResult<Option<ListRow>>;

    async fn fetch_items(&self, statement: Statement) -> StoreResult<Vec<ItemRow>>;

    async fn fetch_genres(&self, statement: Statement) -> StoreResult<Vec<GenreRow>>;
}
