use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{IdColumn, IdentityType};

/// Catalog providers whose lists are mirrored locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Letterboxd,
    Tmdb,
    Trakt,
    Mdblist,
    Tvdb,
    Anilist,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider '{0}'")]
pub struct UnknownProvider(pub String);

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::Letterboxd,
        Provider::Tmdb,
        Provider::Trakt,
        Provider::Mdblist,
        Provider::Tvdb,
        Provider::Anilist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Letterboxd => "letterboxd",
            Provider::Tmdb => "tmdb",
            Provider::Trakt => "trakt",
            Provider::Mdblist => "mdblist",
            Provider::Tvdb => "tvdb",
            Provider::Anilist => "anilist",
        }
    }

    /// Id map column holding this provider's own item ids. MDBList items are
    /// keyed by foreign ids only.
    pub fn native_column(&self) -> Option<IdColumn> {
        match self {
            Provider::Letterboxd => Some(IdColumn::Letterboxd),
            Provider::Tmdb => Some(IdColumn::Tmdb),
            Provider::Trakt => Some(IdColumn::Trakt),
            Provider::Tvdb => Some(IdColumn::Tvdb),
            Provider::Anilist => Some(IdColumn::Anilist),
            Provider::Mdblist => None,
        }
    }

    /// Anchor used when this provider's list hints are merged.
    pub fn merge_anchor(&self) -> IdColumn {
        self.native_column().unwrap_or(IdColumn::Imdb)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|provider| provider.as_str() == needle)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

/// Identifies one externally owned list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListKey {
    pub provider: Provider,
    pub external_id: String,
}

impl ListKey {
    pub fn new(provider: Provider, external_id: impl Into<String>) -> Self {
        Self {
            provider,
            external_id: external_id.into(),
        }
    }

    pub fn cache_key(&self) -> String {
        format!("list:{}:{}", self.provider, self.external_id)
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.external_id)
    }
}

/// List metadata row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExternalList {
    pub key: ListKey,
    pub name: String,
    pub slug: String,
    pub owner_id: String,
    pub owner_name: String,
    pub description: String,
    pub private: bool,
    /// Provider-reported total; may exceed `fetched_count`.
    pub item_count: i64,
    pub fetched_count: i64,
    /// Whether the last pass stopped at its page or item ceiling.
    pub capped: bool,
    pub updated_at: DateTime<Utc>,
}

impl ExternalList {
    pub fn is_partially_synced(&self) -> bool {
        self.capped && self.item_count > self.fetched_count
    }
}

/// One item as mirrored from a provider; shared by every list that contains it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: String,
    pub kind: IdentityType,
    pub title: String,
    pub year: Option<i64>,
    pub runtime: Option<i64>,
    pub rating: Option<f64>,
    pub poster: Option<String>,
    pub backdrop: Option<String>,
    pub genre_ids: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// A list with its items in rank order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredList {
    pub list: ExternalList,
    pub items: Vec<ListItem>,
}

impl StoredList {
    pub fn key(&self) -> &ListKey {
        &self.list.key
    }
}
