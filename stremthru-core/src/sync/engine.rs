use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheKeys, InMemorySharedCache, Jitter, RedisSharedCache, SharedCache, TieredCache};
use crate::config::EngineConfig;
use crate::database::Store;
use crate::database::ports::ListRepository;
use crate::error::{EngineError, Result};
use crate::identity::{IdentityMergeEngine, MergeReport};
use crate::providers::{ListProvider, ProviderError, normalize};
use crate::types::{
    IdColumn, IdentityRecord, IdentityType, ListKey, Observation, Provider, StoredList,
};

use super::fetch::fetch_all;
use super::locks::SyncLocks;
use super::refresh_queue::{DebouncedRefreshQueue, QueueOutcome};
use super::singleflight::SingleFlight;
use super::state::{ListStatus, SyncState, classify};

/// Owns every piece of sync state: caches, locks, the refresh queue, in-flight
/// calls, and the tracked background tasks.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    lists: Arc<dyn ListRepository>,
    identity: IdentityMergeEngine,
    providers: HashMap<Provider, Arc<dyn ListProvider>>,
    list_cache: TieredCache<StoredList>,
    identity_cache: TieredCache<IdentityRecord>,
    locks: SyncLocks,
    queue: DebouncedRefreshQueue,
    list_flights: SingleFlight<StoredList>,
    item_flights: SingleFlight<Option<IdentityRecord>>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("providers", &self.inner.providers.keys().collect::<Vec<_>>())
            .field("pending_refreshes", &self.inner.queue.len())
            .field("lock_granularity", &self.inner.locks.granularity())
            .finish_non_exhaustive()
    }
}

pub struct SyncEngineBuilder {
    store: Store,
    config: EngineConfig,
    providers: HashMap<Provider, Arc<dyn ListProvider>>,
    shared_cache: Option<Arc<dyn SharedCache>>,
}

impl fmt::Debug for SyncEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngineBuilder")
            .field("store", &self.store)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SyncEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ListProvider>) -> Self {
        self.providers.insert(provider.provider(), provider);
        self
    }

    pub fn shared_cache(mut self, shared: Arc<dyn SharedCache>) -> Self {
        self.shared_cache = Some(shared);
        self
    }

    /// Connects the shared cache tier named in the config when none was
    /// supplied explicitly.
    pub async fn connect_shared_cache(mut self) -> Result<Self> {
        if self.shared_cache.is_none()
            && let Some(url) = self.config.cache.redis_url.clone()
        {
            let redis = RedisSharedCache::new(&url)
                .await
                .map_err(|err| EngineError::Configuration(format!("redis cache: {err}")))?;
            self.shared_cache = Some(Arc::new(redis));
        }
        Ok(self)
    }

    pub fn build(self) -> SyncEngine {
        let config = self.config;
        let shared = self
            .shared_cache
            .unwrap_or_else(|| Arc::new(InMemorySharedCache::new(config.cache.shared_capacity)));
        let (jitter_min, jitter_max) = config.cache.jitter_window();
        let jitter = Jitter::new(jitter_min, jitter_max);

        let inner = Inner {
            lists: self.store.lists(),
            identity: IdentityMergeEngine::new(self.store.identities()),
            providers: self.providers,
            list_cache: TieredCache::new(
                "lists",
                config.cache.local_capacity,
                config.cache.local_ttl(),
                shared.clone(),
                config.cache.list_ttl(),
                jitter,
            ),
            identity_cache: TieredCache::new(
                "identities",
                config.cache.local_capacity,
                config.cache.local_ttl(),
                shared,
                config.cache.identity_ttl(),
                jitter,
            ),
            locks: SyncLocks::new(config.sync.lock_granularity),
            queue: DebouncedRefreshQueue::new(config.refresh.debounce(), config.refresh.capacity),
            list_flights: SingleFlight::new(),
            item_flights: SingleFlight::new(),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            config,
        };
        SyncEngine {
            inner: Arc::new(inner),
        }
    }
}

impl SyncEngine {
    pub fn builder(store: Store) -> SyncEngineBuilder {
        SyncEngineBuilder {
            store,
            config: EngineConfig::default(),
            providers: HashMap::new(),
            shared_cache: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn refresh_queue(&self) -> &DebouncedRefreshQueue {
        &self.inner.queue
    }

    /// Returns the list, fetching synchronously only when nothing is stored.
    ///
    /// A stale list is returned as-is and a debounced refresh is queued. A
    /// list that stopped at its fetch ceiling also gets a catch-up refresh.
    pub async fn get_list(&self, provider: Provider, list_id: &str) -> Result<StoredList> {
        let key = list_key(provider, list_id)?;

        let Some(stored) = self.load_known(&key).await? else {
            debug!(%key, "list missing; fetching synchronously");
            let stored = self.sync_now(key.clone()).await?;
            self.schedule_catch_up(key, &stored);
            return Ok(stored);
        };

        let policy = self.inner.config.sync.policy(provider);
        match classify(Some(&stored.list), Utc::now(), policy.ttl()) {
            SyncState::Stale => {
                if self.inner.queue.queue(key.clone()) == QueueOutcome::Scheduled {
                    debug!(%key, "stale list served; refresh queued");
                }
            }
            SyncState::Fresh | SyncState::Missing => {}
        }
        self.schedule_catch_up(key, &stored);

        Ok(stored)
    }

    /// Lists cut short by a fetch ceiling are re-synced one catch-up interval
    /// after their last pass, independent of the TTL.
    fn schedule_catch_up(&self, key: ListKey, stored: &StoredList) {
        if !stored.list.is_partially_synced() {
            return;
        }
        let since_sync = (Utc::now() - stored.list.updated_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let wait = self
            .inner
            .config
            .refresh
            .catch_up_interval()
            .saturating_sub(since_sync);
        if self.inner.queue.queue_at(key.clone(), Instant::now() + wait) == QueueOutcome::Scheduled {
            debug!(%key, wait_ms = wait.as_millis() as u64, "catch-up refresh queued");
        }
    }

    /// Sync bookkeeping for a list without triggering any fetch.
    pub async fn list_status(&self, provider: Provider, list_id: &str) -> Result<ListStatus> {
        let key = list_key(provider, list_id)?;
        let Some(stored) = self.inner.lists.load_list(&key).await? else {
            return Ok(ListStatus::missing());
        };
        let policy = self.inner.config.sync.policy(provider);
        Ok(ListStatus::of(
            &stored.list,
            Utc::now(),
            policy.ttl(),
            self.inner.config.refresh.catch_up_interval(),
        ))
    }

    /// Runs a sync pass now, or joins the one already in flight for the key.
    pub async fn sync_now(&self, key: ListKey) -> Result<StoredList> {
        let engine = self.clone();
        let flight_key = key.cache_key();
        self.inner
            .list_flights
            .run(&flight_key, move || async move { engine.sync_list(key).await })
            .await
            .map_err(EngineError::Shared)
    }

    /// Background refresh entry point; failures are logged only.
    pub async fn refresh(&self, key: ListKey) {
        match self.sync_now(key.clone()).await {
            Ok(stored) => debug!(%key, items = stored.items.len(), "background refresh finished"),
            Err(err) => warn!(%key, error = %err, "background refresh failed"),
        }
    }

    async fn load_known(&self, key: &ListKey) -> Result<Option<StoredList>> {
        let cache_key = CacheKeys::list(key);
        if let Some(stored) = self.inner.list_cache.get(&cache_key).await {
            return Ok(Some(stored));
        }
        let stored = self.inner.lists.load_list(key).await?;
        if let Some(stored) = &stored {
            self.inner.list_cache.add(&cache_key, stored.clone()).await;
        }
        Ok(stored)
    }

    async fn sync_list(&self, key: ListKey) -> Result<StoredList> {
        let provider = self.provider(key.provider)?;
        let policy = self.inner.config.sync.policy(key.provider);

        let _guard = self.inner.locks.acquire(&key).await;
        let started = std::time::Instant::now();
        let outcome = fetch_all(provider.as_ref(), &key.external_id, &policy, &self.inner.cancel).await?;
        let normalized = normalize(&key, outcome, Utc::now());

        self.inner
            .lists
            .save_list(&normalized.list, &normalized.items)
            .await?;

        let stored = StoredList {
            list: normalized.list,
            items: normalized.items,
        };
        self.inner
            .list_cache
            .add(&CacheKeys::list(&key), stored.clone())
            .await;

        info!(
            %key,
            items = stored.items.len(),
            declared = stored.list.item_count,
            capped = stored.list.capped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "list synced"
        );

        self.spawn_identity_merge(normalized.hints, key.provider.merge_anchor());
        Ok(stored)
    }

    fn spawn_identity_merge(&self, hints: Vec<Observation>, anchor: IdColumn) {
        if hints.is_empty() || self.inner.cancel.is_cancelled() {
            return;
        }
        let engine = self.clone();
        self.inner.tracker.spawn(async move {
            tokio::select! {
                _ = engine.inner.cancel.cancelled() => {
                    debug!(%anchor, "identity merge abandoned at shutdown")
                }
                result = engine.merge_identities(hints, anchor) => match result {
                    Ok(report) => debug!(
                        %anchor,
                        path = ?report.path,
                        accepted = report.accepted,
                        failures = report.failures.len(),
                        "list identity hints merged"
                    ),
                    Err(err) => warn!(%anchor, error = %err, "list identity merge failed"),
                },
            }
        });
    }

    /// Looks an id up in the id map, asking the owning provider on a miss.
    ///
    /// A record whose known type contradicts a known `kind` is not a match.
    pub async fn resolve_identity(
        &self,
        column: IdColumn,
        id: &str,
        kind: IdentityType,
    ) -> Result<Option<IdentityRecord>> {
        let id = id.trim();
        if id.is_empty() {
            return Err(EngineError::InvalidInput(format!("empty {column} id")));
        }
        let cache_key = CacheKeys::identity(column, id);

        if let Some(record) = self.inner.identity_cache.get(&cache_key).await {
            return Ok(compatible(record, kind));
        }
        if let Some(record) = self.inner.identity.find(column, id).await? {
            self.inner.identity_cache.add(&cache_key, record.clone()).await;
            return Ok(compatible(record, kind));
        }

        let Some(provider) = self.item_provider_for(column) else {
            return Ok(None);
        };
        let engine = self.clone();
        let owned_id = id.to_string();
        let record = self
            .inner
            .item_flights
            .run(&format!("item:{cache_key}"), move || async move {
                engine.fetch_and_merge_item(provider, column, owned_id, kind).await
            })
            .await
            .map_err(EngineError::Shared)?;
        Ok(record.and_then(|record| compatible(record, kind)))
    }

    async fn fetch_and_merge_item(
        &self,
        provider: Arc<dyn ListProvider>,
        column: IdColumn,
        id: String,
        kind: IdentityType,
    ) -> Result<Option<IdentityRecord>> {
        let name = provider.provider();
        let timeout = self.inner.config.sync.policy(name).request_timeout();
        let fetched = tokio::time::timeout(timeout, provider.fetch_item_by_id(&id, kind))
            .await
            .map_err(|_| EngineError::upstream(name, ProviderError::Timeout(timeout)))?;

        let raw = match fetched {
            Ok(Some(raw)) => raw,
            Ok(None) | Err(ProviderError::NotFound) => {
                debug!(provider = %name, %column, %id, "item unknown upstream");
                return Ok(None);
            }
            Err(err) => return Err(EngineError::upstream(name, err)),
        };

        let mut observation = raw.ids;
        observation.set(column, &id);
        if raw.kind.is_known() {
            observation.kind = raw.kind;
        }
        self.inner.identity.merge(vec![observation], column).await?;

        let record = self.inner.identity.find(column, &id).await?;
        if let Some(record) = &record {
            self.inner
                .identity_cache
                .add(&CacheKeys::identity(column, &id), record.clone())
                .await;
        }
        Ok(record)
    }

    /// Maps each id in `from` to its value in `to` with bounded concurrency.
    /// Ids that fail or have no mapping are left out.
    pub async fn resolve_many(
        &self,
        from: IdColumn,
        ids: Vec<String>,
        to: IdColumn,
    ) -> HashMap<String, String> {
        let concurrency = self.inner.config.identity.fanout_concurrency.max(1);
        futures::stream::iter(ids)
            .map(|id| async move {
                let resolved = self.resolve_identity(from, &id, IdentityType::Unknown).await;
                (id, resolved)
            })
            .buffer_unordered(concurrency)
            .filter_map(|(id, resolved)| async move {
                match resolved {
                    Ok(Some(record)) => record.get(to).map(|value| (id, value.to_string())),
                    Ok(None) => None,
                    Err(err) => {
                        debug!(%from, %id, error = %err, "resolve_many lookup failed");
                        None
                    }
                }
            })
            .collect()
            .await
    }

    /// Merges observations directly and drops cached lookups they touch.
    pub async fn merge_identities(
        &self,
        observations: Vec<Observation>,
        anchor: IdColumn,
    ) -> Result<MergeReport> {
        let touched: Vec<String> = observations
            .iter()
            .flat_map(|observation| {
                observation
                    .iter()
                    .map(|(column, value)| CacheKeys::identity(column, value))
                    .collect::<Vec<_>>()
            })
            .collect();
        let report = self.inner.identity.merge(observations, anchor).await?;
        for key in touched {
            self.inner.identity_cache.remove(&key).await;
        }
        Ok(report)
    }

    pub async fn repair_identity(
        &self,
        record_id: Uuid,
        column: IdColumn,
        value: Option<&str>,
    ) -> Result<Option<Uuid>> {
        let before = self.inner.identity.find_by_id(record_id).await?;
        let after = self.inner.identity.repair(record_id, column, value).await?;
        for record in before.iter().chain(after.iter()) {
            for (column, value) in &record.ids {
                self.inner
                    .identity_cache
                    .remove(&CacheKeys::identity(*column, value))
                    .await;
            }
        }
        Ok(after.map(|record| record.id))
    }

    /// Starts the worker that runs due refreshes. It stops at [`Self::shutdown`].
    pub fn spawn_refresh_worker(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let interval = self.inner.config.refresh.scan_interval();
        self.inner.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "refresh worker started");
            loop {
                tokio::select! {
                    _ = engine.inner.cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                for key in engine.inner.queue.drain_due(Instant::now()) {
                    let worker = engine.clone();
                    engine.inner.tracker.spawn(async move { worker.refresh(key).await });
                }
            }
            info!("refresh worker stopped");
        })
    }

    /// Cancels background work and waits for tracked tasks to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("sync engine shut down");
    }

    fn provider(&self, provider: Provider) -> Result<Arc<dyn ListProvider>> {
        self.inner
            .providers
            .get(&provider)
            .cloned()
            .ok_or_else(|| {
                EngineError::Configuration(format!("no client configured for provider {provider}"))
            })
    }

    fn item_provider_for(&self, column: IdColumn) -> Option<Arc<dyn ListProvider>> {
        self.inner
            .providers
            .iter()
            .find(|(provider, _)| provider.native_column() == Some(column))
            .map(|(_, client)| client.clone())
    }
}

fn list_key(provider: Provider, list_id: &str) -> Result<ListKey> {
    let list_id = list_id.trim();
    if list_id.is_empty() {
        return Err(EngineError::InvalidInput("empty list id".to_string()));
    }
    Ok(ListKey::new(provider, list_id))
}

fn compatible(record: IdentityRecord, kind: IdentityType) -> Option<IdentityRecord> {
    record.kind.is_compatible_with(kind).then_some(record)
}
