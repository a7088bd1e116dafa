use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::SyncLockGranularity;
use crate::types::ListKey;

/// Serializes sync passes per provider (default) or per list.
#[derive(Debug)]
pub struct SyncLocks {
    granularity: SyncLockGranularity,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SyncLocks {
    pub fn new(granularity: SyncLockGranularity) -> Self {
        Self {
            granularity,
            locks: DashMap::new(),
        }
    }

    pub fn granularity(&self) -> SyncLockGranularity {
        self.granularity
    }

    fn scope(&self, key: &ListKey) -> String {
        match self.granularity {
            SyncLockGranularity::Provider => key.provider.to_string(),
            SyncLockGranularity::List => key.to_string(),
        }
    }

    pub async fn acquire(&self, key: &ListKey) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(self.scope(key))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::Provider;

    #[tokio::test]
    async fn provider_granularity_blocks_sibling_lists() {
        let locks = SyncLocks::new(SyncLockGranularity::Provider);
        let _held = locks.acquire(&ListKey::new(Provider::Trakt, "a")).await;
        let sibling = tokio::time::timeout(
            Duration::from_millis(20),
            locks.acquire(&ListKey::new(Provider::Trakt, "b")),
        )
        .await;
        assert!(sibling.is_err());

        let other_provider = tokio::time::timeout(
            Duration::from_millis(20),
            locks.acquire(&ListKey::new(Provider::Tmdb, "a")),
        )
        .await;
        assert!(other_provider.is_ok());
    }

    #[tokio::test]
    async fn list_granularity_only_blocks_same_list() {
        let locks = SyncLocks::new(SyncLockGranularity::List);
        let _held = locks.acquire(&ListKey::new(Provider::Trakt, "a")).await;
        let sibling = tokio::time::timeout(
            Duration::from_millis(20),
            locks.acquire(&ListKey::new(Provider::Trakt, "b")),
        )
        .await;
        assert!(sibling.is_ok());
    }
}
