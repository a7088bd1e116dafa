use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Arguments;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::debug;

use crate::database::conflict::column_from_sqlite_message;
use crate::database::rows::{GenreRow, IdentityRow, ItemRow, ListRow};
use crate::database::sql::{Dialect, SqlValue, Statement};
use crate::database::{SQLITE_MIGRATOR, StoreError, StoreResult};

use super::SqlBackend;

#[derive(Clone, Debug)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// In-memory databases are pinned to a single long-lived connection so
    /// every query sees the same database.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };
        let pool = pool_options.connect_with(options).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn arguments<'q>(params: Vec<SqlValue>) -> StoreResult<SqliteArguments<'q>> {
    let mut args = SqliteArguments::default();
    for value in params {
        let added = match value {
            SqlValue::Text(value) => args.add(value),
            SqlValue::Int(value) => args.add(value),
            SqlValue::Float(value) => args.add(value),
            SqlValue::Bool(value) => args.add(value),
            SqlValue::Uuid(value) => args.add(value),
            SqlValue::Timestamp(value) => args.add(value),
        };
        added.map_err(|err| StoreError::Database(sqlx::Error::Encode(err)))?;
    }
    Ok(args)
}

fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
        && let Some(column) = column_from_sqlite_message(db_err.message())
    {
        debug!(%column, "sqlite unique violation on id column");
        return StoreError::ConstraintViolation { column };
    }
    StoreError::Database(err)
}

#[async_trait]
impl SqlBackend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn migrate(&self) -> StoreResult<()> {
        SQLITE_MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    async fn execute(&self, statement: Statement) -> StoreResult<u64> {
        let Statement { sql, params } = statement;
        let result = sqlx::query_with(&sql, arguments(params)?)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn execute_in_transaction(&self, statements: Vec<Statement>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        for Statement { sql, params } in statements {
            sqlx::query_with(&sql, arguments(params)?)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
        }
        tx.commit().await.map_err(classify)?;
        Ok(())
    }

    async fn fetch_identities(&self, statement: Statement) -> StoreResult<Vec<IdentityRow>> {
        let Statement { sql, params } = statement;
        sqlx::query_as_with::<_, IdentityRow, _>(&sql, arguments(params)?)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)
    }

    async fn fetch_values(&self, statement: Statement) -> StoreResult<Vec<String>> {
        let Statement { sql, params } = statement;
        sqlx::query_scalar_with::<_, String, _>(&sql, arguments(params)?)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)
    }

    async fn fetch_list(&self, statement: Statement) -> StoreResult<Option<ListRow>> {
        let Statement { sql, params } = statement;
        sqlx::query_as_with::<_, ListRow, _>(&sql, arguments(params)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)
    }

    async fn fetch_items(&self, statement: Statement) -> StoreResult<Vec<ItemRow>> {
        let Statement { sql, params } = statement;
        sqlx::query_as_with::<_, ItemRow, _>(&sql, arguments(params)?)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)
    }

    async fn fetch_genres(&self, statement: Statement) -> StoreResult<Vec<GenreRow>> {
        let Statement { sql, params } = statement;
        sqlx::query_as_with::<_, GenreRow, _>(&sql, arguments(params)?)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)
    }
}
