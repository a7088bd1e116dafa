use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::jitter::Jitter;
use super::local::LocalCache;
use super::shared::SharedCache;

/// Local tier in front of a shared tier.
///
/// Reads check local then shared and never copy a hit into the other tier.
/// Writes go to both; the local copy lives no longer than `local_ttl`.
/// Shared-tier failures are logged and read as misses.
pub struct TieredCache<V> {
    name: &'static str,
    local: LocalCache<V>,
    local_ttl: Duration,
    shared: Arc<dyn SharedCache>,
    base_ttl: Duration,
    jitter: Jitter,
    _value: PhantomData<fn() -> V>,
}

impl<V> fmt::Debug for TieredCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredCache")
            .field("name", &self.name)
            .field("local_ttl", &self.local_ttl)
            .field("base_ttl", &self.base_ttl)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl<V> TieredCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        local_capacity: u64,
        local_ttl: Duration,
        shared: Arc<dyn SharedCache>,
        base_ttl: Duration,
        jitter: Jitter,
    ) -> Self {
        Self {
            name,
            local: LocalCache::new(local_capacity),
            local_ttl,
            shared,
            base_ttl,
            jitter,
            _value: PhantomData,
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.local.get(key) {
            debug!(cache = self.name, key, tier = "local", "cache hit");
            return Some(value);
        }

        match self.shared.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    debug!(cache = self.name, key, tier = "shared", "cache hit");
                    Some(value)
                }
                Err(err) => {
                    warn!(cache = self.name, key, error = %err, "discarding undecodable shared cache entry");
                    None
                }
            },
            Ok(None) => {
                debug!(cache = self.name, key, "cache miss");
                None
            }
            Err(err) => {
                warn!(cache = self.name, key, error = %err, "shared cache read failed");
                None
            }
        }
    }

    /// Stores under the base lifetime plus jitter.
    pub async fn add(&self, key: &str, value: V) {
        let lifetime = self.jitter.apply(self.base_ttl);
        self.add_with_lifetime(key, value, lifetime).await;
    }

    pub async fn add_with_lifetime(&self, key: &str, value: V, lifetime: Duration) {
        match serde_json::to_string(&value) {
            Ok(json) => {
                if let Err(err) = self.shared.set(key, json, lifetime).await {
                    warn!(cache = self.name, key, error = %err, "shared cache write failed");
                }
            }
            Err(err) => {
                warn!(cache = self.name, key, error = %err, "cache value not serializable");
            }
        }
        self.local.insert(key, value, lifetime.min(self.local_ttl));
    }

    pub async fn remove(&self, key: &str) {
        self.local.remove(key);
        if let Err(err) = self.shared.delete(key).await {
            warn!(cache = self.name, key, error = %err, "shared cache delete failed");
        }
    }

    /// Drops only the local tier, e.g. to observe the shared tier in isolation.
    pub fn clear_local(&self) {
        self.local.clear();
    }
}
