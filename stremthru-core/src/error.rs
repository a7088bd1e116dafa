use std::sync::Arc;

use thiserror::Error;

use crate::database::StoreError;
use crate::providers::ProviderError;
use crate::types::Provider;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("upstream error from {provider}: {source}")]
    Upstream {
        provider: Provider,
        #[source]
        source: ProviderError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Error produced once and handed to every waiter of a collapsed call.
    #[error(transparent)]
    Shared(Arc<EngineError>),
}

impl EngineError {
    pub fn upstream(provider: Provider, source: ProviderError) -> Self {
        Self::Upstream { provider, source }
    }

    /// Unwraps shared errors so callers can match on the original variant.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::Shared(inner) => inner.root(),
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), EngineError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
