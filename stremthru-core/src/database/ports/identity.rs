use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::StoreResult;
use crate::types::{IdColumn, IdentityRecord, IdentityType, Observation};

/// One observation ready to be written, with the id a new record would get.
#[derive(Clone, Debug)]
pub struct IdentityWrite {
    pub id: Uuid,
    pub observation: Observation,
    pub now: DateTime<Utc>,
}

impl IdentityWrite {
    pub fn new(observation: Observation, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            observation,
            now,
        }
    }
}

/// Persistence for the id map.
///
/// Routine writes go through the fill policies and never clear or replace a
/// set column; [`IdentityRepository::repair`] is the only overwrite.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Multi-row upsert keyed on `anchor`, in one transaction.
    ///
    /// A collision on any other id column fails the whole batch with
    /// `StoreError::ConstraintViolation`.
    async fn upsert_batch(&self, rows: &[IdentityWrite], anchor: IdColumn) -> StoreResult<()>;

    /// Which of `values` already exist in the `anchor` column.
    async fn existing_anchor_values(
        &self,
        anchor: IdColumn,
        values: &[String],
    ) -> StoreResult<HashSet<String>>;

    async fn find_by(&self, column: IdColumn, value: &str) -> StoreResult<Option<IdentityRecord>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<IdentityRecord>>;

    /// Every record sharing at least one id with `observation`.
    async fn find_candidates(&self, observation: &Observation) -> StoreResult<Vec<IdentityRecord>>;

    /// Fills the given empty columns (and an unknown type) of one record.
    async fn fill(
        &self,
        record_id: Uuid,
        columns: &[(IdColumn, String)],
        kind: IdentityType,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn insert(&self, row: &IdentityWrite) -> StoreResult<()>;

    /// Overwrites or clears one column. Returns `false` when no record has `record_id`.
    async fn repair(
        &self,
        record_id: Uuid,
        column: IdColumn,
        value: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}
