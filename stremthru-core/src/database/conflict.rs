//! Maps backend unique-violation errors to the id column that collided.

use crate::types::IdColumn;

use super::sql::ID_MAP_TABLE;

/// Postgres reports the violated constraint by name (`id_map_<column>_key`).
pub fn column_from_constraint(constraint: &str) -> Option<IdColumn> {
    constraint
        .strip_prefix(ID_MAP_TABLE)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix("_key"))
        .and_then(|column| column.parse().ok())
}

/// SQLite only names the column in its message:
/// `UNIQUE constraint failed: id_map.<column>`.
pub fn column_from_sqlite_message(message: &str) -> Option<IdColumn> {
    let (_, tail) = message.split_once("UNIQUE constraint failed:")?;
    tail.split(',')
        .map(str::trim)
        .filter_map(|qualified| qualified.split_once('.'))
        .filter(|(table, _)| *table == ID_MAP_TABLE)
        .find_map(|(_, column)| column.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_postgres_constraint_names() {
        assert_eq!(column_from_constraint("id_map_tmdb_key"), Some(IdColumn::Tmdb));
        assert_eq!(
            column_from_constraint("id_map_animeplanet_key"),
            Some(IdColumn::Animeplanet)
        );
        assert_eq!(column_from_constraint("id_map_pkey"), None);
        assert_eq!(column_from_constraint("external_list_pkey"), None);
    }

    #[test]
    fn parses_sqlite_messages() {
        assert_eq!(
            column_from_sqlite_message("UNIQUE constraint failed: id_map.tvdb"),
            Some(IdColumn::Tvdb)
        );
        assert_eq!(
            column_from_sqlite_message("UNIQUE constraint failed: id_map.id"),
            None
        );
        assert_eq!(
            column_from_sqlite_message(
                "UNIQUE constraint failed: external_item.provider, external_item.id"
            ),
            None
        );
    }
}
