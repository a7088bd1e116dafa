use std::time::Duration;

use async_trait::async_trait;
use sqlx::Arguments;
use sqlx::PgPool;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use tracing::debug;

use crate::database::conflict::column_from_constraint;
use crate::database::rows::{GenreRow, IdentityRow, ItemRow, ListRow};
use crate::database::sql::{Dialect, SqlValue, Statement};
use crate::database::{POSTGRES_MIGRATOR, StoreError, StoreResult};

use super::SqlBackend;

#[derive(Clone, Debug)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn arguments(params: Vec<SqlValue>) -> StoreResult<PgArguments> {
    let mut args = PgArguments::default();
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
        && let Some(column) = db_err.constraint().and_then(column_from_constraint)
    {
        debug!(%column, "postgres unique violation on id column");
        return StoreError::ConstraintViolation { column };
    }
    StoreError::Database(err)
}

#[async_trait]
impl SqlBackend for PostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn migrate(&self) -> StoreResult<()> {
        POSTGRES_MIGRATOR.run(&self.pool).await?;
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
