use std::fmt;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;

#[derive(Clone)]
struct Expiring<V> {
    value: V,
    lifetime: Duration,
}

struct PerEntryLifetime;

impl<V> Expiry<String, Expiring<V>> for PerEntryLifetime {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Expiring<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.lifetime)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Expiring<V>,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.lifetime)
    }
}

/// Bounded LRU-style process-local tier with a lifetime per entry.
#[derive(Clone)]
pub struct LocalCache<V> {
    inner: Cache<String, Expiring<V>>,
}

impl<V: Clone + Send + Sync + 'static> fmt::Debug for LocalCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl<V: Clone + Send + Sync + 'static> LocalCache<V> {
    pub fn new(capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryLifetime)
            .build();
        Self { inner }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).map(|entry| entry.value)
    }

    pub fn insert(&self, key: &str, value: V, lifetime: Duration) {
        self.inner
            .insert(key.to_string(), Expiring { value, lifetime });
    }

    pub fn remove(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}
