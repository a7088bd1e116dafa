//! Dialect-neutral statement rendering shared by the Postgres and SQLite
//! adapters.
//!
//! Both backends support `INSERT ... ON CONFLICT (...) DO UPDATE` with
//! `excluded.` references, so the statements differ only in placeholder
//! syntax. Each adapter binds [`SqlValue`]s in order and runs the text as-is.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::ports::IdentityWrite;
use crate::identity::policy::{MergeField, MergePolicies};
use crate::types::{ExternalList, IdColumn, IdentityType, ListItem, ListKey, Observation, Provider};

pub const ID_MAP_TABLE: &str = "id_map";

/// Upper bound on rows per multi-row statement.
pub const CHUNK_SIZE: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Int(Option<i64>),
    Float(Option<f64>),
    Bool(bool),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(Some(value.into()))
    }

    /// Blank strings become NULL so unique indexes never see "empty".
    pub fn opt_text(value: Option<&str>) -> Self {
        SqlValue::Text(
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Accumulates SQL text and positional parameters.
#[derive(Debug)]
pub struct StatementBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl StatementBuilder {
    pub fn new(dialect: Dialect, initial: &str) -> Self {
        Self {
            dialect,
            sql: initial.to_string(),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// Registers a parameter and returns its placeholder without appending it.
    /// The placeholder must be emitted before the next parameter is registered.
    pub fn placeholder(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        match self.dialect {
            Dialect::Postgres => format!("${}", self.params.len()),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    pub fn push_bind(&mut self, value: SqlValue) -> &mut Self {
        let placeholder = self.placeholder(value);
        self.sql.push_str(&placeholder);
        self
    }

    fn push_values_row(&mut self, values: Vec<SqlValue>) -> &mut Self {
        self.sql.push('(');
        for (idx, value) in values.into_iter().enumerate() {
            if idx > 0 {
                self.sql.push_str(", ");
            }
            self.push_bind(value);
        }
        self.sql.push(')');
        self
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

// ---------------------------------------------------------------------------
// id map
// ---------------------------------------------------------------------------

fn identity_columns() -> String {
    let mut columns = vec!["id", "type"];
    columns.extend(IdColumn::ALL.iter().map(IdColumn::as_str));
    columns.extend(["created_at", "updated_at"]);
    columns.join(", ")
}

fn identity_values(row: &IdentityWrite) -> Vec<SqlValue> {
    let mut values = Vec::with_capacity(IdColumn::ALL.len() + 4);
    values.push(SqlValue::Uuid(row.id));
    values.push(SqlValue::text(row.observation.kind.as_db_str()));
    for column in IdColumn::ALL {
        values.push(SqlValue::opt_text(row.observation.get(column)));
    }
    values.push(SqlValue::Timestamp(row.now));
    values.push(SqlValue::Timestamp(row.now));
    values
}

/// Multi-row upsert keyed on `anchor`. Every other field is merged with its
/// policy against the stored row.
pub fn upsert_identities(
    dialect: Dialect,
    rows: &[IdentityWrite],
    anchor: IdColumn,
    policies: &MergePolicies,
) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!("INSERT INTO {ID_MAP_TABLE} ({}) VALUES ", identity_columns()),
    );
    for (idx, row) in rows.iter().enumerate() {
        if idx > 0 {
            builder.push(", ");
        }
        builder.push_values_row(identity_values(row));
    }

    builder.push(&format!(" ON CONFLICT ({}) DO UPDATE SET ", anchor.as_str()));
    let mut fields = vec![MergeField::Kind];
    fields.extend(
        IdColumn::ALL
            .into_iter()
            .filter(|column| *column != anchor)
            .map(MergeField::Id),
    );
    fields.push(MergeField::UpdatedAt);

    let assignments = fields
        .into_iter()
        .map(|field| {
            let name = field.column_name();
            let expr = policies.policy_for(field).render(
                &format!("{ID_MAP_TABLE}.{name}"),
                &format!("excluded.{name}"),
            );
            format!("{name} = {expr}")
        })
        .collect::<Vec<_>>()
        .join(", ");
    builder.push(&assignments);
    builder.finish()
}

pub fn insert_identity(dialect: Dialect, row: &IdentityWrite) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!("INSERT INTO {ID_MAP_TABLE} ({}) VALUES ", identity_columns()),
    );
    builder.push_values_row(identity_values(row));
    builder.finish()
}

pub fn select_identity_by(dialect: Dialect, column: IdColumn, value: &str) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!(
            "SELECT {} FROM {ID_MAP_TABLE} WHERE {} = ",
            identity_columns(),
            column.as_str()
        ),
    );
    builder.push_bind(SqlValue::text(value));
    builder.finish()
}

pub fn select_identity_by_id(dialect: Dialect, id: Uuid) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!("SELECT {} FROM {ID_MAP_TABLE} WHERE id = ", identity_columns()),
    );
    builder.push_bind(SqlValue::Uuid(id));
    builder.finish()
}

/// Anchor values from `values` that already exist in the id map.
pub fn select_existing_anchor_values(
    dialect: Dialect,
    anchor: IdColumn,
    values: &[String],
) -> Statement {
    let column = anchor.as_str();
    let mut builder = StatementBuilder::new(
        dialect,
        &format!("SELECT {column} AS value FROM {ID_MAP_TABLE} WHERE {column} IN ("),
    );
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            builder.push(", ");
        }
        builder.push_bind(SqlValue::text(value.as_str()));
    }
    builder.push(")");
    builder.finish()
}

/// Records sharing at least one non-empty id with `observation`.
/// Returns `None` when the observation carries no ids.
pub fn select_identity_candidates(dialect: Dialect, observation: &Observation) -> Option<Statement> {
    if observation.is_empty() {
        return None;
    }
    let mut builder = StatementBuilder::new(
        dialect,
        &format!("SELECT {} FROM {ID_MAP_TABLE} WHERE ", identity_columns()),
    );
    for (idx, (column, value)) in observation.iter().enumerate() {
        if idx > 0 {
            builder.push(" OR ");
        }
        builder.push(column.as_str()).push(" = ");
        builder.push_bind(SqlValue::text(value));
    }
    Some(builder.finish())
}

/// Targeted update applying the merge policies for the given columns.
pub fn fill_identity(
    dialect: Dialect,
    record_id: Uuid,
    columns: &[(IdColumn, String)],
    kind: IdentityType,
    now: DateTime<Utc>,
    policies: &MergePolicies,
) -> Statement {
    let mut builder = StatementBuilder::new(dialect, &format!("UPDATE {ID_MAP_TABLE} SET "));
    // Each placeholder is emitted before the next is registered, so `?`
    // positions line up with the parameter list.
    for (column, value) in columns {
        let placeholder = builder.placeholder(SqlValue::text(value.as_str()));
        let field = MergeField::Id(*column);
        let expr = policies
            .policy_for(field)
            .render(field.column_name(), &placeholder);
        builder.push(&format!("{} = {expr}, ", field.column_name()));
    }
    if kind.is_known() {
        let placeholder = builder.placeholder(SqlValue::text(kind.as_db_str()));
        let expr = policies
            .policy_for(MergeField::Kind)
            .render("type", &placeholder);
        builder.push(&format!("type = {expr}, "));
    }
    builder.push("updated_at = ");
    builder.push_bind(SqlValue::Timestamp(now));
    builder.push(" WHERE id = ");
    builder.push_bind(SqlValue::Uuid(record_id));
    builder.finish()
}

/// Explicit overwrite of one column, bypassing the merge policies.
pub fn repair_identity(
    dialect: Dialect,
    record_id: Uuid,
    column: IdColumn,
    value: Option<&str>,
    now: DateTime<Utc>,
) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!("UPDATE {ID_MAP_TABLE} SET {} = ", column.as_str()),
    );
    builder.push_bind(SqlValue::opt_text(value));
    builder.push(", updated_at = ");
    builder.push_bind(SqlValue::Timestamp(now));
    builder.push(" WHERE id = ");
    builder.push_bind(SqlValue::Uuid(record_id));
    builder.finish()
}

// ---------------------------------------------------------------------------
// lists
// ---------------------------------------------------------------------------

pub const LIST_TABLE: &str = "external_list";
pub const ITEM_TABLE: &str = "external_item";
pub const ITEM_GENRE_TABLE: &str = "external_item_genre";
pub const LIST_ITEM_TABLE: &str = "external_list_item";

const LIST_COLUMNS: &str = "provider, external_id, name, slug, owner_id, owner_name, description, \
     private, item_count, fetched_count, capped, updated_at";

const ITEM_COLUMNS: &str =
    "provider, id, type, title, year, runtime, rating, poster, backdrop, updated_at";

pub fn upsert_list(dialect: Dialect, list: &ExternalList) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!("INSERT INTO {LIST_TABLE} ({LIST_COLUMNS}) VALUES "),
    );
    builder.push_values_row(vec![
        SqlValue::text(list.key.provider.as_str()),
        SqlValue::text(list.key.external_id.as_str()),
        SqlValue::text(list.name.as_str()),
        SqlValue::text(list.slug.as_str()),
        SqlValue::text(list.owner_id.as_str()),
        SqlValue::text(list.owner_name.as_str()),
        SqlValue::text(list.description.as_str()),
        SqlValue::Bool(list.private),
        SqlValue::Int(Some(list.item_count)),
        SqlValue::Int(Some(list.fetched_count)),
        SqlValue::Bool(list.capped),
        SqlValue::Timestamp(list.updated_at),
    ]);
    builder.push(
        " ON CONFLICT (provider, external_id) DO UPDATE SET \
         name = excluded.name, slug = excluded.slug, owner_id = excluded.owner_id, \
         owner_name = excluded.owner_name, description = excluded.description, \
         private = excluded.private, item_count = excluded.item_count, \
         fetched_count = excluded.fetched_count, capped = excluded.capped, \
         updated_at = excluded.updated_at",
    );
    builder.finish()
}

/// One statement per chunk of at most [`CHUNK_SIZE`] items.
pub fn upsert_items(dialect: Dialect, provider: Provider, items: &[ListItem]) -> Vec<Statement> {
    items
        .chunks(CHUNK_SIZE)
        .map(|chunk| {
            let mut builder = StatementBuilder::new(
                dialect,
                &format!("INSERT INTO {ITEM_TABLE} ({ITEM_COLUMNS}) VALUES "),
            );
            for (idx, item) in chunk.iter().enumerate() {
                if idx > 0 {
                    builder.push(", ");
                }
                builder.push_values_row(vec![
                    SqlValue::text(provider.as_str()),
                    SqlValue::text(item.id.as_str()),
                    SqlValue::text(item.kind.as_db_str()),
                    SqlValue::text(item.title.as_str()),
                    SqlValue::Int(item.year),
                    SqlValue::Int(item.runtime),
                    SqlValue::Float(item.rating),
                    SqlValue::opt_text(item.poster.as_deref()),
                    SqlValue::opt_text(item.backdrop.as_deref()),
                    SqlValue::Timestamp(item.updated_at),
                ]);
            }
            builder.push(
                " ON CONFLICT (provider, id) DO UPDATE SET \
                 type = excluded.type, title = excluded.title, year = excluded.year, \
                 runtime = excluded.runtime, rating = excluded.rating, \
                 poster = excluded.poster, backdrop = excluded.backdrop, \
                 updated_at = excluded.updated_at",
            );
            builder.finish()
        })
        .collect()
}

/// Removes genre links of `item_id` that are not in `keep`.
pub fn delete_stale_genres(
    dialect: Dialect,
    provider: Provider,
    item_id: &str,
    keep: &[String],
) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!("DELETE FROM {ITEM_GENRE_TABLE} WHERE provider = "),
    );
    builder.push_bind(SqlValue::text(provider.as_str()));
    builder.push(" AND item_id = ");
    builder.push_bind(SqlValue::text(item_id));
    if !keep.is_empty() {
        builder.push(" AND genre_id NOT IN (");
        for (idx, genre) in keep.iter().enumerate() {
            if idx > 0 {
                builder.push(", ");
            }
            builder.push_bind(SqlValue::text(genre.as_str()));
        }
        builder.push(")");
    }
    builder.finish()
}

/// Inserts missing genre links for every item, chunked.
pub fn insert_missing_genres(
    dialect: Dialect,
    provider: Provider,
    items: &[ListItem],
) -> Vec<Statement> {
    let links: Vec<(&str, &str)> = items
        .iter()
        .flat_map(|item| {
            item.genre_ids
                .iter()
                .map(move |genre| (item.id.as_str(), genre.as_str()))
        })
        .collect();

    links
        .chunks(CHUNK_SIZE)
        .map(|chunk| {
            let mut builder = StatementBuilder::new(
                dialect,
                &format!("INSERT INTO {ITEM_GENRE_TABLE} (provider, item_id, genre_id) VALUES "),
            );
            for (idx, (item_id, genre)) in chunk.iter().enumerate() {
                if idx > 0 {
                    builder.push(", ");
                }
                builder.push_values_row(vec![
                    SqlValue::text(provider.as_str()),
                    SqlValue::text(*item_id),
                    SqlValue::text(*genre),
                ]);
            }
            builder.push(" ON CONFLICT (provider, item_id, genre_id) DO NOTHING");
            builder.finish()
        })
        .collect()
}

pub fn delete_list_items(dialect: Dialect, key: &ListKey) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!("DELETE FROM {LIST_ITEM_TABLE} WHERE provider = "),
    );
    builder.push_bind(SqlValue::text(key.provider.as_str()));
    builder.push(" AND list_id = ");
    builder.push_bind(SqlValue::text(key.external_id.as_str()));
    builder.finish()
}

/// Ordering junction rows; rank is the item's index in `items`.
pub fn insert_list_items(dialect: Dialect, key: &ListKey, items: &[ListItem]) -> Vec<Statement> {
    items
        .chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(chunk_idx, chunk)| {
            let mut builder = StatementBuilder::new(
                dialect,
                &format!("INSERT INTO {LIST_ITEM_TABLE} (provider, list_id, item_id, rank) VALUES "),
            );
            for (idx, item) in chunk.iter().enumerate() {
                if idx > 0 {
                    builder.push(", ");
                }
                let rank = (chunk_idx * CHUNK_SIZE + idx) as i64;
                builder.push_values_row(vec![
                    SqlValue::text(key.provider.as_str()),
                    SqlValue::text(key.external_id.as_str()),
                    SqlValue::text(item.id.as_str()),
                    SqlValue::Int(Some(rank)),
                ]);
            }
            builder.finish()
        })
        .collect()
}

pub fn select_list(dialect: Dialect, key: &ListKey) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!("SELECT {LIST_COLUMNS} FROM {LIST_TABLE} WHERE provider = "),
    );
    builder.push_bind(SqlValue::text(key.provider.as_str()));
    builder.push(" AND external_id = ");
    builder.push_bind(SqlValue::text(key.external_id.as_str()));
    builder.finish()
}

pub fn select_list_items(dialect: Dialect, key: &ListKey) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!(
            "SELECT i.id, i.type, i.title, i.year, i.runtime, i.rating, i.poster, i.backdrop, \
             i.updated_at, li.rank \
             FROM {LIST_ITEM_TABLE} li \
             JOIN {ITEM_TABLE} i ON i.provider = li.provider AND i.id = li.item_id \
             WHERE li.provider = "
        ),
    );
    builder.push_bind(SqlValue::text(key.provider.as_str()));
    builder.push(" AND li.list_id = ");
    builder.push_bind(SqlValue::text(key.external_id.as_str()));
    builder.push(" ORDER BY li.rank ASC");
    builder.finish()
}

pub fn select_list_genres(dialect: Dialect, key: &ListKey) -> Statement {
    let mut builder = StatementBuilder::new(
        dialect,
        &format!(
            "SELECT g.item_id, g.genre_id \
             FROM {ITEM_GENRE_TABLE} g \
             JOIN {LIST_ITEM_TABLE} li ON li.provider = g.provider AND li.item_id = g.item_id \
             WHERE li.provider = "
        ),
    );
    builder.push_bind(SqlValue::text(key.provider.as_str()));
    builder.push(" AND li.list_id = ");
    builder.push_bind(SqlValue::text(key.external_id.as_str()));
    builder.push(" ORDER BY g.item_id, g.genre_id");
    builder.finish()
}
