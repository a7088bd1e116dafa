use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::ports::{IdentityRepository, IdentityWrite, ListRepository};
use crate::database::rows::assemble_items;
use crate::database::sql::{self, CHUNK_SIZE};
use crate::database::StoreResult;
use crate::identity::policy::MergePolicies;
use crate::types::{
    ExternalList, IdColumn, IdentityRecord, IdentityType, ListItem, ListKey, Observation,
    StoredList,
};

use super::SqlBackend;

#[derive(Clone)]
pub struct SqlIdentityRepository {
    backend: Arc<dyn SqlBackend>,
    policies: MergePolicies,
}

impl fmt::Debug for SqlIdentityRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlIdentityRepository")
            .field("dialect", &self.backend.dialect())
            .finish_non_exhaustive()
    }
}

impl SqlIdentityRepository {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self {
            backend,
            policies: MergePolicies,
        }
    }
}

#[async_trait]
impl IdentityRepository for SqlIdentityRepository {
    async fn upsert_batch(&self, rows: &[IdentityWrite], anchor: IdColumn) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let dialect = self.backend.dialect();
        let statements = rows
            .chunks(CHUNK_SIZE)
            .map(|chunk| sql::upsert_identities(dialect, chunk, anchor, &self.policies))
            .collect();
        self.backend.execute_in_transaction(statements).await
    }

    async fn existing_anchor_values(
        &self,
        anchor: IdColumn,
        values: &[String],
    ) -> StoreResult<HashSet<String>> {
        let dialect = self.backend.dialect();
        let mut existing = HashSet::new();
        for chunk in values.chunks(CHUNK_SIZE) {
            let statement = sql::select_existing_anchor_values(dialect, anchor, chunk);
            existing.extend(self.backend.fetch_values(statement).await?);
        }
        Ok(existing)
    }

    async fn find_by(&self, column: IdColumn, value: &str) -> StoreResult<Option<IdentityRecord>> {
        let statement = sql::select_identity_by(self.backend.dialect(), column, value);
        let rows = self.backend.fetch_identities(statement).await?;
        Ok(rows.into_iter().next().map(IdentityRecord::from))
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<IdentityRecord>> {
        let statement = sql::select_identity_by_id(self.backend.dialect(), id);
        let rows = self.backend.fetch_identities(statement).await?;
        Ok(rows.into_iter().next().map(IdentityRecord::from))
    }

    async fn find_candidates(&self, observation: &Observation) -> StoreResult<Vec<IdentityRecord>> {
        let Some(statement) = sql::select_identity_candidates(self.backend.dialect(), observation)
        else {
            return Ok(Vec::new());
        };
        let rows = self.backend.fetch_identities(statement).await?;
        Ok(rows.into_iter().map(IdentityRecord::from).collect())
    }

    async fn fill(
        &self,
        record_id: Uuid,
        columns: &[(IdColumn, String)],
        kind: IdentityType,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let statement = sql::fill_identity(
            self.backend.dialect(),
            record_id,
            columns,
            kind,
            now,
            &self.policies,
        );
        self.backend.execute(statement).await?;
        Ok(())
    }

    async fn insert(&self, row: &IdentityWrite) -> StoreResult<()> {
        let statement = sql::insert_identity(self.backend.dialect(), row);
        self.backend.execute(statement).await?;
        Ok(())
    }

    async fn repair(
        &self,
        record_id: Uuid,
        column: IdColumn,
        value: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let statement =
            sql::repair_identity(self.backend.dialect(), record_id, column, value, now);
        Ok(self.backend.execute(statement).await? > 0)
    }
}

#[derive(Clone)]
pub struct SqlListRepository {
    backend: Arc<dyn SqlBackend>,
}

impl fmt::Debug for SqlListRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlListRepository")
            .field("dialect", &self.backend.dialect())
            .finish_non_exhaustive()
    }
}

impl SqlListRepository {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ListRepository for SqlListRepository {
    async fn save_list(&self, list: &ExternalList, items: &[ListItem]) -> StoreResult<()> {
        let dialect = self.backend.dialect();
        let provider = list.key.provider;

        let mut statements = vec![sql::upsert_list(dialect, list)];
        statements.extend(sql::upsert_items(dialect, provider, items));
        statements.extend(
            items
                .iter()
                .map(|item| sql::delete_stale_genres(dialect, provider, &item.id, &item.genre_ids)),
        );
        statements.extend(sql::insert_missing_genres(dialect, provider, items));
        statements.push(sql::delete_list_items(dialect, &list.key));
        statements.extend(sql::insert_list_items(dialect, &list.key, items));

        self.backend.execute_in_transaction(statements).await
    }

    async fn load_list(&self, key: &ListKey) -> StoreResult<Option<StoredList>> {
        let dialect = self.backend.dialect();
        let Some(row) = self.backend.fetch_list(sql::select_list(dialect, key)).await? else {
            return Ok(None);
        };
        let list = ExternalList::try_from(row)?;
        let items = self
            .backend
            .fetch_items(sql::select_list_items(dialect, key))
            .await?;
        let genres = self
            .backend
            .fetch_genres(sql::select_list_genres(dialect, key))
            .await?;

        Ok(Some(StoredList {
            list,
            items: assemble_items(items, genres),
        }))
    }
}
