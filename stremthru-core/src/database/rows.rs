//! Row shapes decoded by both backends, and their conversion to domain types.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{
    ExternalList, IdColumn, IdentityRecord, IdentityType, ListItem, ListKey, Provider,
};

use super::StoreError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdentityRow {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub imdb: Option<String>,
    pub tmdb: Option<String>,
    pub tvdb: Option<String>,
    pub trakt: Option<String>,
    pub letterboxd: Option<String>,
    pub anidb: Option<String>,
    pub anilist: Option<String>,
    pub anisearch: Option<String>,
    pub animeplanet: Option<String>,
    pub kitsu: Option<String>,
    pub livechart: Option<String>,
    pub mal: Option<String>,
    pub notifymoe: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<IdentityRow> for IdentityRecord {
    fn from(row: IdentityRow) -> Self {
        let columns = [
            (IdColumn::Imdb, row.imdb),
            (IdColumn::Tmdb, row.tmdb),
            (IdColumn::Tvdb, row.tvdb),
            (IdColumn::Trakt, row.trakt),
            (IdColumn::Letterboxd, row.letterboxd),
            (IdColumn::Anidb, row.anidb),
            (IdColumn::Anilist, row.anilist),
            (IdColumn::Anisearch, row.anisearch),
            (IdColumn::Animeplanet, row.animeplanet),
            (IdColumn::Kitsu, row.kitsu),
            (IdColumn::Livechart, row.livechart),
            (IdColumn::Mal, row.mal),
            (IdColumn::Notifymoe, row.notifymoe),
        ];
        let ids: BTreeMap<IdColumn, String> = columns
            .into_iter()
            .filter_map(|(column, value)| {
                value
                    .filter(|value| !value.is_empty())
                    .map(|value| (column, value))
            })
            .collect();

        IdentityRecord {
            id: row.id,
            kind: IdentityType::from_db_str(&row.kind),
            ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListRow {
    pub provider: String,
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub owner_id: String,
    pub owner_name: String,
    pub description: String,
    pub private: bool,
    pub item_count: i64,
    pub fetched_count: i64,
    pub capped: bool,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ListRow> for ExternalList {
    type Error = StoreError;

    fn try_from(row: ListRow) -> Result<Self, Self::Error> {
        let provider: Provider = row
            .provider
            .parse()
            .map_err(|err| StoreError::Corrupt(format!("external_list.provider: {err}")))?;
        Ok(ExternalList {
            key: ListKey::new(provider, row.external_id),
            name: row.name,
            slug: row.slug,
            owner_id: row.owner_id,
            owner_name: row.owner_name,
            description: row.description,
            private: row.private,
            item_count: row.item_count,
            fetched_count: row.fetched_count,
            capped: row.capped,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub id: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub title: String,
    pub year: Option<i64>,
    pub runtime: Option<i64>,
    pub rating: Option<f64>,
    pub poster: Option<String>,
    pub backdrop: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub rank: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GenreRow {
    pub item_id: String,
    pub genre_id: String,
}

/// Joins rank-ordered item rows with their genre links.
pub fn assemble_items(items: Vec<ItemRow>, genres: Vec<GenreRow>) -> Vec<ListItem> {
    let mut by_item: HashMap<String, Vec<String>> = HashMap::new();
    for genre in genres {
        by_item.entry(genre.item_id).or_default().push(genre.genre_id);
    }

    items
        .into_iter()
        .map(|row| ListItem {
            genre_ids: by_item.remove(&row.id).unwrap_or_default(),
            kind: IdentityType::from_db_str(&row.kind),
            id: row.id,
            title: row.title,
            year: row.year,
            runtime: row.runtime,
            rating: row.rating,
            poster: row.poster,
            backdrop: row.backdrop,
            updated_at: row.updated_at,
        })
        .collect()
}
