use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::{env_var, parse_bool_var, parse_csv_var, parse_number_var};

/// Raw configuration as defined in a TOML file. Durations are humantime
/// strings and are parsed during composition.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub cache: FileCacheConfig,
    #[serde(default)]
    pub refresh: FileRefreshConfig,
    #[serde(default)]
    pub sync: FileSyncConfig,
    #[serde(default)]
    pub identity: FileIdentityConfig,
    #[serde(default)]
    pub providers: FileProvidersConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_migrations: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCacheConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_capacity: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_capacity: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_min: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_max: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRefreshConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catch_up_interval: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileSyncConfig {
    /// `"provider"` or `"list"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_granularity: Option<String>,
    /// Keyed by provider name, e.g. `[sync.providers.trakt]`.
    #[serde(default)]
    pub providers: HashMap<String, FileProviderPolicy>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileProviderPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_fallback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rate_limit_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileIdentityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fanout_concurrency: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileProvidersConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvdb_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trakt_client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mdblist_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letterboxd_client_id: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub database_run_migrations: Option<bool>,
    pub redis_url: Option<String>,
    pub cache_local_capacity: Option<u64>,
    pub cache_list_ttl: Option<String>,
    pub cache_identity_ttl: Option<String>,
    pub refresh_debounce: Option<String>,
    pub refresh_catch_up_interval: Option<String>,
    pub sync_lock_granularity: Option<String>,
    pub fanout_concurrency: Option<usize>,
    pub enabled_providers: Option<Vec<String>>,
    pub tmdb_api_key: Option<String>,
    pub tvdb_api_key: Option<String>,
    pub trakt_client_id: Option<String>,
    pub mdblist_api_key: Option<String>,
    pub letterboxd_client_id: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: env_var("STREMTHRU_CONFIG").map(PathBuf::from),
            database_url: env_var("DATABASE_URL"),
            database_max_connections: parse_number_var("DATABASE_MAX_CONNECTIONS"),
            database_run_migrations: parse_bool_var("DATABASE_RUN_MIGRATIONS"),
            redis_url: env_var("REDIS_URL"),
            cache_local_capacity: parse_number_var("STREMTHRU_CACHE_LOCAL_CAPACITY"),
            cache_list_ttl: env_var("STREMTHRU_CACHE_LIST_TTL"),
            cache_identity_ttl: env_var("STREMTHRU_CACHE_IDENTITY_TTL"),
            refresh_debounce: env_var("STREMTHRU_REFRESH_DEBOUNCE"),
            refresh_catch_up_interval: env_var("STREMTHRU_REFRESH_CATCH_UP_INTERVAL"),
            sync_lock_granularity: env_var("STREMTHRU_SYNC_LOCK_GRANULARITY"),
            fanout_concurrency: parse_number_var("STREMTHRU_FANOUT_CONCURRENCY"),
            enabled_providers: parse_csv_var("STREMTHRU_PROVIDERS"),
            tmdb_api_key: env_var("TMDB_API_KEY"),
            tvdb_api_key: env_var("TVDB_API_KEY"),
            trakt_client_id: env_var("TRAKT_CLIENT_ID"),
            mdblist_api_key: env_var("MDBLIST_API_KEY"),
            letterboxd_client_id: env_var("LETTERBOXD_CLIENT_ID"),
        }
    }
}
