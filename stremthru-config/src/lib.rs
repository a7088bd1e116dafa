//! Configuration for the StremThru sync engine.
//!
//! Loads an optional TOML file, overlays environment variables (after an
//! optional `.env`), and validates the result into a [`Config`] carrying the
//! engine settings plus provider credentials.

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{Config, ConfigMetadata, ProviderCredentials, ProvidersConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
