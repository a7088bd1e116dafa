//! Turns raw provider pages into storable list rows and identity hints.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::types::{ExternalList, ListItem, ListKey, Observation};

use super::traits::{ListMeta, RawListItem};

/// Result of normalizing one sync pass.
#[derive(Clone, Debug)]
pub struct NormalizedList {
    pub list: ExternalList,
    /// Rank order: index 0 is the first item the upstream returned.
    pub items: Vec<ListItem>,
    /// One cross-provider id hint per item that carried any ids.
    pub hints: Vec<Observation>,
}

/// What the fetch loop observed besides the items themselves.
#[derive(Clone, Debug, Default)]
pub struct FetchOutcome {
    pub meta: Option<ListMeta>,
    pub items: Vec<RawListItem>,
    /// Whether the pass stopped at its page or item ceiling.
    pub capped: bool,
}

pub fn normalize(key: &ListKey, outcome: FetchOutcome, now: DateTime<Utc>) -> NormalizedList {
    let native = key.provider.native_column();
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(outcome.items.len());
    let mut hints = Vec::new();

    for raw in outcome.items {
        let id = raw.id.trim().to_string();
        if id.is_empty() || !seen.insert(id.clone()) {
            continue;
        }

        let mut hint = raw.ids.clone();
        if let Some(column) = native {
            hint.set(column, &id);
        }
        if raw.kind.is_known() {
            hint.kind = raw.kind;
        }
        if !hint.is_empty() {
            hints.push(hint);
        }

        items.push(ListItem {
            genre_ids: normalize_genres(&raw.genres),
            kind: raw.kind,
            title: raw.title.trim().to_string(),
            year: raw.year,
            runtime: raw.runtime,
            rating: raw.rating,
            poster: non_blank(raw.poster),
            backdrop: non_blank(raw.backdrop),
            updated_at: now,
            id,
        });
    }

    let meta = outcome.meta.unwrap_or_default();
    let fetched_count = items.len() as i64;
    let list = ExternalList {
        key: key.clone(),
        name: meta.name.trim().to_string(),
        slug: meta.slug.trim().to_string(),
        owner_id: meta.owner_id.trim().to_string(),
        owner_name: meta.owner_name.trim().to_string(),
        description: meta.description.trim().to_string(),
        private: meta.private,
        item_count: meta.item_count.unwrap_or(fetched_count).max(fetched_count),
        fetched_count,
        capped: outcome.capped,
        updated_at: now,
    };

    NormalizedList { list, items, hints }
}

fn normalize_genres(genres: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    genres
        .iter()
        .map(|genre| genre.trim())
        .filter(|genre| !genre.is_empty())
        .filter(|genre| seen.insert(genre.to_string()))
        .map(str::to_string)
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
