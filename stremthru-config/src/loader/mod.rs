pub mod error;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use stremthru_core::config::{ProviderSyncPolicy, SyncLockGranularity};
use stremthru_core::types::Provider;
use stremthru_core::EngineConfig;
use tracing::debug;

use crate::models::sources::{EnvConfig, FileConfig, FileProviderPolicy};
use crate::models::{Config, ConfigMetadata, ProviderCredentials, ProvidersConfig};
use crate::util::parse_duration;
use crate::validation::{self, ConfigWarnings};

use error::ConfigLoadError;

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["stremthru.toml", "config/stremthru.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Use these values instead of reading the process environment. No
    /// `.env` file is loaded when set.
    pub env: Option<EnvConfig>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.options.env = Some(env);
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env, env_file_loaded) = match &self.options.env {
            Some(env) => (env.clone(), false),
            None => {
                let loaded = self.load_env_file()?;
                (EnvConfig::gather(), loaded)
            }
        };

        let (file_config, config_path) = self.load_file_config(&env)?;
        let mut warnings = ConfigWarnings::default();
        if config_path.is_none() {
            warnings.push_with_hint(
                "No stremthru.toml detected; using defaults and environment variables",
                "Pass --config or set STREMTHRU_CONFIG to load a configuration file",
            );
        }

        let metadata = ConfigMetadata {
            config_path,
            env_file_loaded,
        };
        let config = compose(file_config.unwrap_or_default(), env, metadata)?;
        warnings.extend(validation::apply_guard_rails(&config)?);

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let result = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path),
            None => dotenvy::dotenv().map(|_| ()),
        };
        match result {
            Ok(()) => Ok(true),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => return Err(ConfigLoadError::MissingConfig { path }),
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let file_config = read_file_config(&path)?;
        debug!(path = %path.display(), "configuration file loaded");
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Layers environment values over file values over engine defaults.
pub fn compose(
    file: FileConfig,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        database: file_database,
        cache: file_cache,
        refresh: file_refresh,
        sync: file_sync,
        identity: file_identity,
        providers: file_providers,
    } = file;

    let mut engine = EngineConfig::default();

    if let Some(url) = env.database_url.or(file_database.url) {
        engine.database.url = url;
    }
    if let Some(max) = env.database_max_connections.or(file_database.max_connections) {
        engine.database.max_connections = max;
    }
    if let Some(run) = env.database_run_migrations.or(file_database.run_migrations) {
        engine.database.run_migrations = run;
    }

    engine.cache.redis_url = env
        .redis_url
        .or(file_cache.redis_url)
        .filter(|url| !url.trim().is_empty());
    if let Some(capacity) = env.cache_local_capacity.or(file_cache.local_capacity) {
        engine.cache.local_capacity = capacity;
    }
    if let Some(raw) = file_cache.local_ttl {
        engine.cache.local_ttl_secs = parse_duration("cache.local_ttl", &raw)?.as_secs();
    }
    if let Some(capacity) = file_cache.shared_capacity {
        engine.cache.shared_capacity = capacity;
    }
    if let Some(raw) = env.cache_list_ttl.or(file_cache.list_ttl) {
        engine.cache.list_ttl_secs = parse_duration("cache.list_ttl", &raw)?.as_secs();
    }
    if let Some(raw) = env.cache_identity_ttl.or(file_cache.identity_ttl) {
        engine.cache.identity_ttl_secs = parse_duration("cache.identity_ttl", &raw)?.as_secs();
    }
    if let Some(raw) = file_cache.jitter_min {
        engine.cache.jitter_min_ms = millis(parse_duration("cache.jitter_min", &raw)?);
    }
    if let Some(raw) = file_cache.jitter_max {
        engine.cache.jitter_max_ms = millis(parse_duration("cache.jitter_max", &raw)?);
    }

    if let Some(raw) = env.refresh_debounce.or(file_refresh.debounce) {
        engine.refresh.debounce_ms = millis(parse_duration("refresh.debounce", &raw)?);
    }
    if let Some(raw) = file_refresh.scan_interval {
        engine.refresh.scan_interval_ms = millis(parse_duration("refresh.scan_interval", &raw)?);
    }
    if let Some(capacity) = file_refresh.capacity {
        engine.refresh.capacity = capacity;
    }
    if let Some(raw) = env
        .refresh_catch_up_interval
        .or(file_refresh.catch_up_interval)
    {
        engine.refresh.catch_up_interval_secs =
            parse_duration("refresh.catch_up_interval", &raw)?.as_secs();
    }

    if let Some(raw) = env.sync_lock_granularity.or(file_sync.lock_granularity) {
        engine.sync.lock_granularity = parse_lock_granularity(&raw)?;
    }
    for (name, overrides) in file_sync.providers {
        let provider = parse_provider(&name)?;
        let policy = apply_policy(ProviderSyncPolicy::for_provider(provider), overrides)?;
        engine.sync.providers.insert(provider, policy);
    }

    if let Some(concurrency) = env.fanout_concurrency.or(file_identity.fanout_concurrency) {
        engine.identity.fanout_concurrency = concurrency;
    }

    let enabled = env
        .enabled_providers
        .or(file_providers.enabled)
        .unwrap_or_default()
        .iter()
        .map(|name| parse_provider(name))
        .collect::<Result<BTreeSet<_>, _>>()?;
    let credentials = ProviderCredentials {
        tmdb_api_key: env.tmdb_api_key.or(file_providers.tmdb_api_key),
        tvdb_api_key: env.tvdb_api_key.or(file_providers.tvdb_api_key),
        trakt_client_id: env.trakt_client_id.or(file_providers.trakt_client_id),
        mdblist_api_key: env.mdblist_api_key.or(file_providers.mdblist_api_key),
        letterboxd_client_id: env
            .letterboxd_client_id
            .or(file_providers.letterboxd_client_id),
    };

    Ok(Config {
        engine,
        providers: ProvidersConfig {
            enabled,
            credentials,
        },
        metadata,
    })
}

fn apply_policy(
    mut policy: ProviderSyncPolicy,
    overrides: FileProviderPolicy,
) -> Result<ProviderSyncPolicy, ConfigLoadError> {
    if let Some(raw) = overrides.ttl {
        policy.ttl_secs = parse_duration("sync.providers.ttl", &raw)?.as_secs();
    }
    if let Some(max_pages) = overrides.max_pages {
        policy.max_pages = max_pages;
    }
    if let Some(max_items) = overrides.max_items {
        policy.max_items = max_items;
    }
    if let Some(raw) = overrides.page_delay {
        policy.page_delay_ms = millis(parse_duration("sync.providers.page_delay", &raw)?);
    }
    if let Some(raw) = overrides.rate_limit_fallback {
        policy.rate_limit_fallback_ms =
            millis(parse_duration("sync.providers.rate_limit_fallback", &raw)?);
    }
    if let Some(retries) = overrides.max_rate_limit_retries {
        policy.max_rate_limit_retries = retries;
    }
    if let Some(raw) = overrides.request_timeout {
        policy.request_timeout_ms =
            millis(parse_duration("sync.providers.request_timeout", &raw)?);
    }
    Ok(policy)
}

fn parse_provider(raw: &str) -> Result<Provider, ConfigLoadError> {
    Provider::from_str(raw).map_err(|_| ConfigLoadError::UnknownProvider {
        value: raw.to_string(),
    })
}

fn parse_lock_granularity(raw: &str) -> Result<SyncLockGranularity, ConfigLoadError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "provider" => Ok(SyncLockGranularity::Provider),
        "list" => Ok(SyncLockGranularity::List),
        _ => Err(ConfigLoadError::InvalidLockGranularity {
            value: raw.to_string(),
        }),
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
