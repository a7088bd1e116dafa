use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::ports::{IdentityRepository, IdentityWrite};
use crate::database::StoreError;
use crate::error::{EngineError, Result};
use crate::identity::policy::{MergeField, MergePolicies};
use crate::types::{IdColumn, IdentityRecord, Observation};

/// Which write strategy finally applied a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "path", content = "column", rename_all = "snake_case")]
pub enum MergePath {
    /// Nothing survived filtering.
    Skipped,
    /// The anchored bulk upsert succeeded.
    Bulk,
    /// The bulk upsert collided on `column` and the retry anchored there succeeded.
    AnchorRetry(IdColumn),
    /// Observations were matched and written one at a time.
    PerItem,
}

#[derive(Clone, Debug, Serialize)]
pub struct MergeFailure {
    pub observation: Observation,
    pub error: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MergeReport {
    pub anchor: IdColumn,
    pub path: MergePath,
    pub received: usize,
    /// Observations collapsed into a later one with the same anchor value.
    pub collapsed: usize,
    /// Observations rejected by the anchor or minimum-id rules.
    pub dropped: usize,
    pub accepted: usize,
    /// Per-item path only.
    pub inserted: usize,
    pub updated: usize,
    pub failures: Vec<MergeFailure>,
}

impl MergeReport {
    fn new(anchor: IdColumn, received: usize) -> Self {
        Self {
            anchor,
            path: MergePath::Skipped,
            received,
            collapsed: 0,
            dropped: 0,
            accepted: 0,
            inserted: 0,
            updated: 0,
            failures: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ItemOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Reconciles partial id observations into the id map.
///
/// Every field transition is monotonic (empty to set, unknown type to known),
/// so merging the same observations again or in another order converges on
/// the same records.
#[derive(Clone)]
pub struct IdentityMergeEngine {
    repo: Arc<dyn IdentityRepository>,
    policies: MergePolicies,
}

impl fmt::Debug for IdentityMergeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMergeEngine").finish_non_exhaustive()
    }
}

impl IdentityMergeEngine {
    pub fn new(repo: Arc<dyn IdentityRepository>) -> Self {
        Self {
            repo,
            policies: MergePolicies,
        }
    }

    pub async fn find(&self, column: IdColumn, value: &str) -> Result<Option<IdentityRecord>> {
        Ok(self.repo.find_by(column, value.trim()).await?)
    }

    pub async fn find_by_id(&self, record_id: Uuid) -> Result<Option<IdentityRecord>> {
        Ok(self.repo.find_by_id(record_id).await?)
    }

    pub async fn merge(&self, observations: Vec<Observation>, anchor: IdColumn) -> Result<MergeReport> {
        let mut report = MergeReport::new(anchor, observations.len());

        let (batch, missing_anchor, collapsed) = dedupe_by_anchor(observations, anchor);
        report.collapsed = collapsed;
        report.dropped = missing_anchor;

        let candidates = batch.len();
        let accepted = self.filter_min_ids(batch, anchor).await?;
        report.dropped += candidates - accepted.len();
        report.accepted = accepted.len();
        if accepted.is_empty() {
            debug!(%anchor, dropped = report.dropped, "identity merge skipped; nothing to write");
            return Ok(report);
        }

        let now = Utc::now();
        let rows: Vec<IdentityWrite> = accepted
            .into_iter()
            .map(|observation| IdentityWrite::new(observation, now))
            .collect();

        let conflict = match self.repo.upsert_batch(&rows, anchor).await {
            Ok(()) => {
                report.path = MergePath::Bulk;
                info!(%anchor, accepted = report.accepted, "identity batch merged");
                return Ok(report);
            }
            Err(StoreError::ConstraintViolation { column }) => column,
            Err(err) => return Err(err.into()),
        };

        let pending = if conflict != anchor {
            debug!(%anchor, %conflict, "bulk upsert collided; retrying anchored on conflict column");
            self.retry_on_column(rows, anchor, conflict).await?
        } else {
            rows
        };

        if pending.is_empty() {
            report.path = MergePath::AnchorRetry(conflict);
            info!(%anchor, %conflict, accepted = report.accepted, "identity batch merged after anchor retry");
            return Ok(report);
        }

        report.path = MergePath::PerItem;
        warn!(%anchor, %conflict, pending = pending.len(), "falling back to per-item identity merge");
        let priority = anchor.match_priority();
        for row in pending {
            match self.merge_one(&row.observation, priority).await {
                Ok(ItemOutcome::Inserted) => report.inserted += 1,
                Ok(ItemOutcome::Updated) => report.updated += 1,
                Ok(ItemOutcome::Unchanged) => {}
                Err(err) => {
                    error!(%anchor, error = %err, "per-item identity merge failed");
                    report.failures.push(MergeFailure {
                        observation: row.observation,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Explicitly overwrites (or clears, with `None`) one column of a record.
    ///
    /// Routine merges never replace a set value; this is the one operation
    /// that does.
    pub async fn repair(
        &self,
        record_id: Uuid,
        column: IdColumn,
        value: Option<&str>,
    ) -> Result<Option<IdentityRecord>> {
        let value = value.map(str::trim).filter(|value| !value.is_empty());
        let updated = self.repo.repair(record_id, column, value, Utc::now()).await?;
        if !updated {
            return Ok(None);
        }
        info!(%record_id, %column, cleared = value.is_none(), "identity record repaired");
        Ok(self.repo.find_by_id(record_id).await?)
    }

    async fn filter_min_ids(
        &self,
        batch: Vec<Observation>,
        anchor: IdColumn,
    ) -> Result<Vec<Observation>> {
        let single_id: Vec<String> = batch
            .iter()
            .filter(|observation| observation.id_count() < 2)
            .filter_map(|observation| observation.get(anchor).map(str::to_string))
            .collect();
        let existing = if single_id.is_empty() {
            Default::default()
        } else {
            self.repo.existing_anchor_values(anchor, &single_id).await?
        };

        Ok(batch
            .into_iter()
            .filter(|observation| {
                observation.id_count() >= 2
                    || observation
                        .get(anchor)
                        .is_some_and(|value| existing.contains(value))
            })
            .collect())
    }

    /// Re-submits the batch anchored on `conflict`. Rows without a value in
    /// that column go through the original anchor again. Returns the rows
    /// that still need per-item handling.
    async fn retry_on_column(
        &self,
        rows: Vec<IdentityWrite>,
        anchor: IdColumn,
        conflict: IdColumn,
    ) -> Result<Vec<IdentityWrite>> {
        let (with_conflict, without): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .partition(|row| row.observation.get(conflict).is_some());
        let with_conflict = dedupe_rows(with_conflict, conflict);

        let mut pending = Vec::new();
        for (group, group_anchor) in [(with_conflict, conflict), (without, anchor)] {
            if group.is_empty() {
                continue;
            }
            match self.repo.upsert_batch(&group, group_anchor).await {
                Ok(()) => {}
                Err(StoreError::ConstraintViolation { column }) => {
                    debug!(anchor = %group_anchor, %column, "anchor retry collided again");
                    pending.extend(group);
                }
                Err(err) => return Err(EngineError::Storage(err)),
            }
        }
        Ok(pending)
    }

    async fn merge_one(
        &self,
        observation: &Observation,
        priority: &[IdColumn],
    ) -> std::result::Result<ItemOutcome, StoreError> {
        let candidates = self.repo.find_candidates(observation).await?;
        let Some(target) = pick_match(&candidates, observation, priority) else {
            self.repo
                .insert(&IdentityWrite::new(observation.clone(), Utc::now()))
                .await?;
            return Ok(ItemOutcome::Inserted);
        };

        let mut fills = Vec::new();
        for (column, value) in observation.iter() {
            let current = target.get(column);
            let merged = self
                .policies
                .policy_for(MergeField::Id(column))
                .apply(current, Some(value));
            if merged == current {
                continue;
            }
            let held_elsewhere = candidates
                .iter()
                .any(|other| other.id != target.id && other.get(column) == Some(value));
            if held_elsewhere {
                debug!(record_id = %target.id, %column, "id already owned by another record; not filling");
                continue;
            }
            fills.push((column, value.to_string()));
        }

        let fill_kind = !target.kind.is_known() && observation.kind.is_known();
        if fills.is_empty() && !fill_kind {
            return Ok(ItemOutcome::Unchanged);
        }
        self.repo
            .fill(target.id, &fills, observation.kind, Utc::now())
            .await?;
        Ok(ItemOutcome::Updated)
    }
}

/// Collapses observations sharing an anchor value (last wins, at the first
/// one's position). Returns the batch, the number without an anchor value,
/// and the number collapsed.
fn dedupe_by_anchor(
    observations: Vec<Observation>,
    anchor: IdColumn,
) -> (Vec<Observation>, usize, usize) {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut batch: Vec<Observation> = Vec::with_capacity(observations.len());
    let mut missing_anchor = 0;
    let mut collapsed = 0;

    for observation in observations {
        let Some(value) = observation.get(anchor).map(str::to_string) else {
            missing_anchor += 1;
            continue;
        };
        match positions.get(&value) {
            Some(&idx) => {
                batch[idx] = observation;
                collapsed += 1;
            }
            None => {
                positions.insert(value, batch.len());
                batch.push(observation);
            }
        }
    }
    (batch, missing_anchor, collapsed)
}

/// Two rows sharing the retry anchor would hit the same row twice in one
/// upsert; fold them together instead.
fn dedupe_rows(rows: Vec<IdentityWrite>, anchor: IdColumn) -> Vec<IdentityWrite> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut deduped: Vec<IdentityWrite> = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(value) = row.observation.get(anchor).map(str::to_string) else {
            continue;
        };
        match positions.get(&value) {
            Some(&idx) => deduped[idx].observation.absorb(&row.observation),
            None => {
                positions.insert(value, deduped.len());
                deduped.push(row);
            }
        }
    }
    deduped
}

fn pick_match<'a>(
    candidates: &'a [IdentityRecord],
    observation: &Observation,
    priority: &[IdColumn],
) -> Option<&'a IdentityRecord> {
    priority.iter().find_map(|column| {
        let value = observation.get(*column)?;
        candidates
            .iter()
            .find(|record| record.get(*column) == Some(value))
    })
}
