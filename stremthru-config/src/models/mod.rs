pub mod sources;

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use stremthru_core::EngineConfig;
use stremthru_core::types::Provider;

#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub providers: ProvidersConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    pub enabled: BTreeSet<Provider>,
    pub credentials: ProviderCredentials,
}

impl ProvidersConfig {
    pub fn is_enabled(&self, provider: Provider) -> bool {
        self.enabled.contains(&provider)
    }
}

#[derive(Clone, Default)]
pub struct ProviderCredentials {
    pub tmdb_api_key: Option<String>,
    pub tvdb_api_key: Option<String>,
    pub trakt_client_id: Option<String>,
    pub mdblist_api_key: Option<String>,
    pub letterboxd_client_id: Option<String>,
}

impl ProviderCredentials {
    /// Environment variable carrying the provider's credential. AniList's
    /// public API needs none.
    pub fn variable_for(provider: Provider) -> Option<&'static str> {
        match provider {
            Provider::Tmdb => Some("TMDB_API_KEY"),
            Provider::Tvdb => Some("TVDB_API_KEY"),
            Provider::Trakt => Some("TRAKT_CLIENT_ID"),
            Provider::Mdblist => Some("MDBLIST_API_KEY"),
            Provider::Letterboxd => Some("LETTERBOXD_CLIENT_ID"),
            Provider::Anilist => None,
        }
    }

    pub fn get(&self, provider: Provider) -> Option<&str> {
        let value = match provider {
            Provider::Tmdb => &self.tmdb_api_key,
            Provider::Tvdb => &self.tvdb_api_key,
            Provider::Trakt => &self.trakt_client_id,
            Provider::Mdblist => &self.mdblist_api_key,
            Provider::Letterboxd => &self.letterboxd_client_id,
            Provider::Anilist => return None,
        };
        value.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderCredentials")
            .field("tmdb_api_key", &redact(&self.tmdb_api_key))
            .field("tvdb_api_key", &redact(&self.tvdb_api_key))
            .field("trakt_client_id", &redact(&self.trakt_client_id))
            .field("mdblist_api_key", &redact(&self.mdblist_api_key))
            .field("letterboxd_client_id", &redact(&self.letterboxd_client_id))
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_credentials_count_as_missing() {
        let credentials = ProviderCredentials {
            trakt_client_id: Some("  ".into()),
            tmdb_api_key: Some("key".into()),
            ..ProviderCredentials::default()
        };
        assert_eq!(credentials.get(Provider::Trakt), None);
        assert_eq!(credentials.get(Provider::Tmdb), Some("key"));
        assert_eq!(ProviderCredentials::variable_for(Provider::Anilist), None);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let credentials = ProviderCredentials {
            mdblist_api_key: Some("hunter2".into()),
            ..ProviderCredentials::default()
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
