use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the thirteen provider id namespaces tracked by the id map.
///
/// Every variant maps to a uniquely indexed column, so an `IdColumn` is always
/// a valid merge anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdColumn {
    Imdb,
    Tmdb,
    Tvdb,
    Trakt,
    Letterboxd,
    Anidb,
    Anilist,
    Anisearch,
    Animeplanet,
    Kitsu,
    Livechart,
    Mal,
    Notifymoe,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown id column '{0}'")]
pub struct UnknownIdColumn(pub String);

impl IdColumn {
    pub const ALL: [IdColumn; 13] = [
        IdColumn::Imdb,
        IdColumn::Tmdb,
        IdColumn::Tvdb,
        IdColumn::Trakt,
        IdColumn::Letterboxd,
        IdColumn::Anidb,
        IdColumn::Anilist,
        IdColumn::Anisearch,
        IdColumn::Animeplanet,
        IdColumn::Kitsu,
        IdColumn::Livechart,
        IdColumn::Mal,
        IdColumn::Notifymoe,
    ];

    /// Lookup order used when matching a general (non-anime) observation.
    pub const GENERAL_PRIORITY: [IdColumn; 13] = [
        IdColumn::Imdb,
        IdColumn::Tmdb,
        IdColumn::Tvdb,
        IdColumn::Trakt,
        IdColumn::Letterboxd,
        IdColumn::Anilist,
        IdColumn::Mal,
        IdColumn::Kitsu,
        IdColumn::Anidb,
        IdColumn::Anisearch,
        IdColumn::Animeplanet,
        IdColumn::Livechart,
        IdColumn::Notifymoe,
    ];

    /// Lookup order used when the batch is anchored on an anime provider.
    pub const ANIME_PRIORITY: [IdColumn; 13] = [
        IdColumn::Anilist,
        IdColumn::Mal,
        IdColumn::Kitsu,
        IdColumn::Anidb,
        IdColumn::Anisearch,
        IdColumn::Animeplanet,
        IdColumn::Livechart,
        IdColumn::Notifymoe,
        IdColumn::Imdb,
        IdColumn::Tmdb,
        IdColumn::Tvdb,
        IdColumn::Trakt,
        IdColumn::Letterboxd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdColumn::Imdb => "imdb",
            IdColumn::Tmdb => "tmdb",
            IdColumn::Tvdb => "tvdb",
            IdColumn::Trakt => "trakt",
            IdColumn::Letterboxd => "letterboxd",
            IdColumn::Anidb => "anidb",
            IdColumn::Anilist => "anilist",
            IdColumn::Anisearch => "anisearch",
            IdColumn::Animeplanet => "animeplanet",
            IdColumn::Kitsu => "kitsu",
            IdColumn::Livechart => "livechart",
            IdColumn::Mal => "mal",
            IdColumn::Notifymoe => "notifymoe",
        }
    }

    pub fn is_anime(&self) -> bool {
        matches!(
            self,
            IdColumn::Anidb
                | IdColumn::Anilist
                | IdColumn::Anisearch
                | IdColumn::Animeplanet
                | IdColumn::Kitsu
                | IdColumn::Livechart
                | IdColumn::Mal
                | IdColumn::Notifymoe
        )
    }

    /// Priority order for the per-item fallback path of a batch anchored on `self`.
    pub fn match_priority(&self) -> &'static [IdColumn; 13] {
        if self.is_anime() {
            &Self::ANIME_PRIORITY
        } else {
            &Self::GENERAL_PRIORITY
        }
    }
}

impl fmt::Display for IdColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdColumn {
    type Err = UnknownIdColumn;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        IdColumn::ALL
            .into_iter()
            .find(|column| column.as_str() == needle)
            .ok_or_else(|| UnknownIdColumn(s.to_string()))
    }
}

/// Media type of an identity record. `Unknown` is the only value that may
/// later be replaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    #[default]
    #[serde(alias = "")]
    Unknown,
    Movie,
    Show,
}

impl IdentityType {
    /// Stored representation; unknown is the empty string.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            IdentityType::Unknown => "",
            IdentityType::Movie => "movie",
            IdentityType::Show => "show",
        }
    }

    pub fn from_db_str(raw: &str) -> Self {
        match raw {
            "movie" => IdentityType::Movie,
            "show" | "series" | "tv" => IdentityType::Show,
            _ => IdentityType::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, IdentityType::Unknown)
    }

    /// `false` only when both sides are known and differ.
    pub fn is_compatible_with(&self, other: IdentityType) -> bool {
        !self.is_known() || !other.is_known() || *self == other
    }
}

/// A partial, possibly conflicting sighting of one title's ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "type", default)]
    pub kind: IdentityType,
    #[serde(flatten)]
    ids: BTreeMap<IdColumn, String>,
}

impl Observation {
    pub fn new(kind: IdentityType) -> Self {
        Self {
            kind,
            ids: BTreeMap::new(),
        }
    }

    /// Builder form of [`Observation::set`].
    pub fn with(mut self, column: IdColumn, value: impl AsRef<str>) -> Self {
        self.set(column, value);
        self
    }

    /// Records `value` for `column`; blank values are ignored.
    pub fn set(&mut self, column: IdColumn, value: impl AsRef<str>) {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return;
        }
        self.ids.insert(column, trimmed.to_string());
    }

    pub fn get(&self, column: IdColumn) -> Option<&str> {
        self.ids
            .get(&column)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn id_count(&self) -> usize {
        self.ids.values().filter(|value| !value.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.id_count() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdColumn, &str)> {
        self.ids
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(column, value)| (*column, value.as_str()))
    }

    /// Folds `other` into `self` without replacing any value already present.
    pub fn absorb(&mut self, other: &Observation) {
        for (column, value) in other.iter() {
            self.ids
                .entry(column)
                .or_insert_with(|| value.to_string());
        }
        if !self.kind.is_known() {
            self.kind = other.kind;
        }
    }
}

/// Persisted id map row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: Uuid,
    pub kind: IdentityType,
    pub ids: BTreeMap<IdColumn, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn get(&self, column: IdColumn) -> Option<&str> {
        self.ids
            .get(&column)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// The record's ids as an observation, e.g. for re-merging or export.
    pub fn to_observation(&self) -> Observation {
        let mut observation = Observation::new(self.kind);
        for (column, value) in &self.ids {
            observation.set(*column, value);
        }
        observation
    }
}
