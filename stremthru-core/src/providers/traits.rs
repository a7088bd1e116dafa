use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{IdentityType, Observation, Provider};

use super::error::ProviderError;

/// List metadata as reported by the upstream, usually on the first page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListMeta {
    pub name: String,
    pub slug: String,
    pub owner_id: String,
    pub owner_name: String,
    pub description: String,
    pub private: bool,
    /// Provider-declared total, when the upstream reports one.
    pub item_count: Option<i64>,
}

/// One item exactly as a provider returned it, plus whatever foreign ids it
/// carried.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListItem {
    /// Provider-native id; the item's key in local storage.
    pub id: String,
    pub kind: IdentityType,
    pub title: String,
    pub year: Option<i64>,
    pub runtime: Option<i64>,
    pub rating: Option<f64>,
    pub poster: Option<String>,
    pub backdrop: Option<String>,
    pub genres: Vec<String>,
    pub ids: Observation,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListPage {
    pub list: Option<ListMeta>,
    pub items: Vec<RawListItem>,
    /// `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Upstream seam used by the sync engine.
///
/// Implementations map the upstream's rate-limit signal to
/// [`ProviderError::RateLimited`]; pacing, retries, and timeouts are applied
/// by the caller.
#[async_trait]
pub trait ListProvider: Send + Sync {
    fn provider(&self) -> Provider;

    async fn fetch_list_page(
        &self,
        list_id: &str,
        cursor: Option<&str>,
    ) -> Result<ListPage, ProviderError>;

    /// `Ok(None)` when the upstream has no such item.
    async fn fetch_item_by_id(
        &self,
        id: &str,
        kind: IdentityType,
    ) -> Result<Option<RawListItem>, ProviderError>;
}
