//! Per-field merge rules for the id map.
//!
//! The same policy value is evaluated in Rust (to decide whether a targeted
//! update is needed) and rendered to SQL (so the database applies it
//! atomically against the row it actually holds).

use crate::types::IdColumn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergePolicy {
    /// Keep a non-empty existing value, else take the incoming one.
    FillIfEmpty,
    /// Keep a known type; only replace the unknown (empty) marker.
    FillIfUnknown,
    /// The existing value always wins.
    NeverOverwrite,
    /// The incoming value always wins.
    AlwaysOverwrite,
}

impl MergePolicy {
    pub fn apply<'a>(&self, existing: Option<&'a str>, incoming: Option<&'a str>) -> Option<&'a str> {
        let existing = existing.filter(|value| !value.is_empty());
        let incoming = incoming.filter(|value| !value.is_empty());
        match self {
            MergePolicy::FillIfEmpty | MergePolicy::FillIfUnknown => existing.or(incoming),
            MergePolicy::NeverOverwrite => existing,
            MergePolicy::AlwaysOverwrite => incoming,
        }
    }

    /// SQL expression computing the merged value from `existing` (a column
    /// reference) and `incoming` (a bound parameter or `excluded.` reference).
    pub fn render(&self, existing: &str, incoming: &str) -> String {
        match self {
            MergePolicy::FillIfEmpty => format!("COALESCE(NULLIF({existing}, ''), {incoming})"),
            MergePolicy::FillIfUnknown => format!(
                "CASE WHEN {existing} IS NULL OR {existing} = '' THEN {incoming} ELSE {existing} END"
            ),
            MergePolicy::NeverOverwrite => existing.to_string(),
            MergePolicy::AlwaysOverwrite => incoming.to_string(),
        }
    }
}

/// Fields of an id map row that participate in a merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeField {
    RecordId,
    Kind,
    Id(IdColumn),
    CreatedAt,
    UpdatedAt,
}

impl MergeField {
    pub fn column_name(&self) -> &'static str {
        match self {
            MergeField::RecordId => "id",
            MergeField::Kind => "type",
            MergeField::Id(column) => column.as_str(),
            MergeField::CreatedAt => "created_at",
            MergeField::UpdatedAt => "updated_at",
        }
    }
}

/// Policy table used for routine merges.
#[derive(Clone, Copy, Debug, Default)]
pub struct MergePolicies;

impl MergePolicies {
    pub fn policy_for(&self, field: MergeField) -> MergePolicy {
        match field {
            MergeField::RecordId | MergeField::CreatedAt => MergePolicy::NeverOverwrite,
            MergeField::Kind => MergePolicy::FillIfUnknown,
            MergeField::Id(_) => MergePolicy::FillIfEmpty,
            MergeField::UpdatedAt => MergePolicy::AlwaysOverwrite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_if_empty_never_replaces_a_value() {
        let policy = MergePolicy::FillIfEmpty;
        assert_eq!(policy.apply(Some("tt001"), Some("tt999")), Some("tt001"));
        assert_eq!(policy.apply(Some("tt001"), None), Some("tt001"));
        assert_eq!(policy.apply(Some(""), Some("tt999")), Some("tt999"));
        assert_eq!(policy.apply(None, Some("tt999")), Some("tt999"));
    }

    #[test]
    fn fill_if_unknown_keeps_known_type() {
        let policy = MergePolicies.policy_for(MergeField::Kind);
        assert_eq!(policy.apply(Some("movie"), Some("show")), Some("movie"));
        assert_eq!(policy.apply(Some(""), Some("show")), Some("show"));
        assert_eq!(policy.apply(Some("movie"), Some("")), Some("movie"));
    }

    #[test]
    fn rendered_expressions_reference_both_sides() {
        assert_eq!(
            MergePolicy::FillIfEmpty.render("id_map.tmdb", "excluded.tmdb"),
            "COALESCE(NULLIF(id_map.tmdb, ''), excluded.tmdb)"
        );
        assert_eq!(MergePolicy::NeverOverwrite.render("a", "b"), "a");
        assert_eq!(MergePolicy::AlwaysOverwrite.render("a", "b"), "b");
        assert!(
            MergePolicy::FillIfUnknown
                .render("id_map.type", "$2")
                .starts_with("CASE WHEN id_map.type IS NULL")
        );
    }
}
