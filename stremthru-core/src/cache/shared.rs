use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::CacheError;
use super::local::LocalCache;

/// Shared TTL tier. Values are serialized JSON so any process can read them.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, lifetime: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Shared tier used when no Redis URL is configured; scoped to this process.
#[derive(Clone)]
pub struct InMemorySharedCache {
    entries: LocalCache<String>,
}

impl fmt::Debug for InMemorySharedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySharedCache").finish_non_exhaustive()
    }
}

impl InMemorySharedCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: LocalCache::new(capacity),
        }
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key))
    }

    async fn set(&self, key: &str, value: String, lifetime: Duration) -> Result<(), CacheError> {
        self.entries.insert(key, value, lifetime);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
