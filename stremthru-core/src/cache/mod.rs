//! Two-tier, non-authoritative cache: a bounded process-local tier in front
//! of a shared TTL tier. Evictions are silent and every reader falls back to
//! the store.

pub mod jitter;
pub mod local;
pub mod redis;
pub mod shared;
pub mod tiered;

use thiserror::Error;

pub use jitter::Jitter;
pub use local::LocalCache;
pub use redis::RedisSharedCache;
pub use shared::{InMemorySharedCache, SharedCache};
pub use tiered::TieredCache;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cache key helpers; every key is namespaced by entity kind.
#[derive(Debug, Clone, Copy)]
pub struct CacheKeys;

impl CacheKeys {
    pub fn list(key: &crate::types::ListKey) -> String {
        key.cache_key()
    }

    pub fn identity(column: crate::types::IdColumn, value: &str) -> String {
        format!("idmap:{column}:{value}")
    }
}
