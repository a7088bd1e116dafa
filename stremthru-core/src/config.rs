use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Provider;

/// Runtime knobs for the sync and identity engine.
///
/// Every field carries a default so a deployment only has to spell out the
/// values it wants to change.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub refresh: RefreshConfig,
    pub sync: SyncConfig,
    pub identity: IdentityConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `postgres://...` or `sqlite:...`.
    pub url: String,
    pub max_connections: u32,
    /// Apply pending migrations when the engine connects.
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/stremthru.db".to_string(),
            max_connections: 10,
            run_migrations: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Shared tier location. The in-process shared tier is used when unset.
    pub redis_url: Option<String>,
    /// Capacity of the process-local tier, in entries.
    pub local_capacity: u64,
    /// Ceiling on how long an entry lives in the process-local tier.
    pub local_ttl_secs: u64,
    /// Capacity of the in-process shared tier used when Redis is not
    /// configured.
    pub shared_capacity: u64,
    /// Base lifetime of cached lists; jitter is added per entry.
    pub list_ttl_secs: u64,
    /// Base lifetime of cached identity lookups.
    pub identity_ttl_secs: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            local_capacity: 10_000,
            local_ttl_secs: 60,
            shared_capacity: 100_000,
            list_ttl_secs: 30 * 60,
            identity_ttl_secs: 6 * 60 * 60,
            jitter_min_ms: 5_000,
            jitter_max_ms: 5 * 60 * 1_000,
        }
    }
}

impl CacheConfig {
    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_secs)
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    pub fn identity_ttl(&self) -> Duration {
        Duration::from_secs(self.identity_ttl_secs)
    }

    pub fn jitter_window(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.jitter_min_ms),
            Duration::from_millis(self.jitter_max_ms),
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Window within which repeated refresh requests collapse to one job.
    pub debounce_ms: u64,
    /// How often the worker scans for due jobs.
    pub scan_interval_ms: u64,
    /// Maximum number of pending keys.
    pub capacity: usize,
    /// Re-check interval for lists that stopped at a fetch ceiling.
    pub catch_up_interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 10_000,
            scan_interval_ms: 1_000,
            capacity: 10_000,
            catch_up_interval_secs: 15 * 60,
        }
    }
}

impl RefreshConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn catch_up_interval(&self) -> Duration {
        Duration::from_secs(self.catch_up_interval_secs)
    }
}

/// Scope of the lock that serializes sync passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncLockGranularity {
    /// One pass per provider at a time.
    #[default]
    Provider,
    /// One pass per list at a time.
    List,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub lock_granularity: SyncLockGranularity,
    /// Per-provider overrides; providers without one use
    /// [`ProviderSyncPolicy::for_provider`].
    pub providers: HashMap<Provider, ProviderSyncPolicy>,
}

impl SyncConfig {
    pub fn policy(&self, provider: Provider) -> ProviderSyncPolicy {
        self.providers
            .get(&provider)
            .copied()
            .unwrap_or_else(|| ProviderSyncPolicy::for_provider(provider))
    }
}

/// Fetch ceilings and pacing for one provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSyncPolicy {
    /// A stored list older than this is stale.
    pub ttl_secs: u64,
    pub max_pages: usize,
    pub max_items: usize,
    pub page_delay_ms: u64,
    /// Sleep applied when a rate limit response carries no retry-after.
    pub rate_limit_fallback_ms: u64,
    pub max_rate_limit_retries: u32,
    pub request_timeout_ms: u64,
}

impl Default for ProviderSyncPolicy {
    fn default() -> Self {
        Self {
            ttl_secs: 6 * 60 * 60,
            max_pages: 50,
            max_items: 5_000,
            page_delay_ms: 200,
            rate_limit_fallback_ms: 5_000,
            max_rate_limit_retries: 5,
            request_timeout_ms: 60_000,
        }
    }
}

impl ProviderSyncPolicy {
    pub fn for_provider(provider: Provider) -> Self {
        let base = Self::default();
        match provider {
            Provider::Letterboxd => Self {
                ttl_secs: 12 * 60 * 60,
                max_pages: 100,
                max_items: 10_000,
                page_delay_ms: 500,
                ..base
            },
            Provider::Trakt => Self {
                ttl_secs: 3 * 60 * 60,
                max_pages: 50,
                max_items: 5_000,
                page_delay_ms: 300,
                ..base
            },
            Provider::Mdblist => Self {
                ttl_secs: 3 * 60 * 60,
                max_pages: 20,
                max_items: 10_000,
                page_delay_ms: 100,
                ..base
            },
            Provider::Anilist => Self {
                page_delay_ms: 700,
                rate_limit_fallback_ms: 60_000,
                ..base
            },
            Provider::Tmdb | Provider::Tvdb => Self {
                max_pages: 25,
                ..base
            },
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn rate_limit_fallback(&self) -> Duration {
        Duration::from_millis(self.rate_limit_fallback_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Concurrent lookups issued by `resolve_many`.
    pub fanout_concurrency: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            fanout_concurrency: 10,
        }
    }
}
