use stremthru_core::EngineConfig;
use stremthru_core::types::Provider;
use thiserror::Error;
use url::Url;

use crate::models::Config;
use crate::models::ProviderCredentials;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("provider {provider} is enabled but {variable} is not set")]
    MissingCredential {
        provider: Provider,
        variable: &'static str,
    },
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: String, reason: String },
}

impl ConfigGuardRailError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    validate_engine(&config.engine)?;

    for provider in &config.providers.enabled {
        if let Some(variable) = ProviderCredentials::variable_for(*provider)
            && config.providers.credentials.get(*provider).is_none()
        {
            return Err(ConfigGuardRailError::MissingCredential {
                provider: *provider,
                variable,
            });
        }
    }

    if config.providers.enabled.is_empty() {
        warnings.push_with_hint(
            "No providers enabled; lists can be inspected but never fetched",
            "Set STREMTHRU_PROVIDERS or providers.enabled in the config file",
        );
    }

    if config.engine.cache.redis_url.is_none() {
        warnings.push_with_hint(
            "REDIS_URL not configured; the shared cache tier is process-local",
            "Set REDIS_URL when running more than one instance",
        );
    }

    let catch_up = config.engine.refresh.catch_up_interval();
    for provider in &config.providers.enabled {
        let ttl = config.engine.sync.policy(*provider).ttl();
        if catch_up >= ttl {
            warnings.push(format!(
                "catch-up interval ({}) is not shorter than the {provider} list TTL ({}); partially synced lists will not converge faster",
                humantime::format_duration(catch_up),
                humantime::format_duration(ttl),
            ));
        }
    }

    Ok(warnings)
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigGuardRailError> {
    let url = engine.database.url.trim();
    if !(url.starts_with("postgres://")
        || url.starts_with("postgresql://")
        || url.starts_with("sqlite:"))
    {
        return Err(ConfigGuardRailError::invalid(
            "database.url",
            "expected a postgres:// or sqlite: URL",
        ));
    }
    if engine.database.max_connections == 0 {
        return Err(ConfigGuardRailError::invalid(
            "database.max_connections",
            "must be at least 1",
        ));
    }

    if let Some(redis_url) = &engine.cache.redis_url {
        Url::parse(redis_url)
            .map_err(|err| ConfigGuardRailError::invalid("cache.redis_url", err.to_string()))?;
    }
    if engine.cache.local_capacity == 0 {
        return Err(ConfigGuardRailError::invalid(
            "cache.local_capacity",
            "must be at least 1",
        ));
    }
    if engine.cache.shared_capacity == 0 {
        return Err(ConfigGuardRailError::invalid(
            "cache.shared_capacity",
            "must be at least 1",
        ));
    }
    if engine.cache.local_ttl_secs == 0 {
        return Err(ConfigGuardRailError::invalid(
            "cache.local_ttl",
            "must be at least one second",
        ));
    }
    if engine.cache.jitter_min_ms > engine.cache.jitter_max_ms {
        return Err(ConfigGuardRailError::invalid(
            "cache.jitter_min",
            "must not exceed cache.jitter_max",
        ));
    }

    if engine.refresh.capacity == 0 {
        return Err(ConfigGuardRailError::invalid(
            "refresh.capacity",
            "must be at least 1",
        ));
    }
    if engine.refresh.scan_interval_ms == 0 {
        return Err(ConfigGuardRailError::invalid(
            "refresh.scan_interval",
            "must be greater than zero",
        ));
    }

    if engine.identity.fanout_concurrency == 0 {
        return Err(ConfigGuardRailError::invalid(
            "identity.fanout_concurrency",
            "must be at least 1",
        ));
    }

    for (provider, policy) in &engine.sync.providers {
        if policy.max_pages == 0 || policy.max_items == 0 {
            return Err(ConfigGuardRailError::invalid(
                format!("sync.providers.{provider}"),
                "max_pages and max_items must be at least 1",
            ));
        }
        if policy.request_timeout_ms == 0 {
            return Err(ConfigGuardRailError::invalid(
                format!("sync.providers.{provider}.request_timeout"),
                "must be greater than zero",
            ));
        }
    }

    Ok(())
}
