use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::types::ExternalList;

/// Where a list sits in its sync lifecycle. `Fetching` is not persisted; it
/// is the window in which a sync pass for the key is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Missing,
    Fresh,
    Stale,
}

/// `now - updated_at > ttl`, strictly. A TTL too large to represent never
/// expires.
pub fn is_stale(updated_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    match TimeDelta::from_std(ttl) {
        Ok(ttl) => now.signed_duration_since(updated_at) > ttl,
        Err(_) => false,
    }
}

pub fn classify(list: Option<&ExternalList>, now: DateTime<Utc>, ttl: Duration) -> SyncState {
    match list {
        None => SyncState::Missing,
        Some(list) if is_stale(list.updated_at, now, ttl) => SyncState::Stale,
        Some(_) => SyncState::Fresh,
    }
}

/// Read-only snapshot of a list's sync bookkeeping.
#[derive(Clone, Debug, Serialize)]
pub struct ListStatus {
    pub state: SyncState,
    pub partially_synced: bool,
    pub item_count: i64,
    pub fetched_count: i64,
    pub updated_at: Option<DateTime<Utc>>,
    /// Earliest time a catch-up pass may run, for partially synced lists.
    pub catch_up_after: Option<DateTime<Utc>>,
}

impl ListStatus {
    pub fn missing() -> Self {
        Self {
            state: SyncState::Missing,
            partially_synced: false,
            item_count: 0,
            fetched_count: 0,
            updated_at: None,
            catch_up_after: None,
        }
    }

    pub fn of(list: &ExternalList, now: DateTime<Utc>, ttl: Duration, catch_up: Duration) -> Self {
        let partially_synced = list.is_partially_synced();
        let catch_up_after = partially_synced
            .then(|| TimeDelta::from_std(catch_up).ok())
            .flatten()
            .map(|delta| list.updated_at + delta);
        Self {
            state: classify(Some(list), now, ttl),
            partially_synced,
            item_count: list.item_count,
            fetched_count: list.fetched_count,
            updated_at: Some(list.updated_at),
            catch_up_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ListKey, Provider};

    fn list(updated_at: DateTime<Utc>) -> ExternalList {
        ExternalList {
            key: ListKey::new(Provider::Trakt, "1"),
            name: String::new(),
            slug: String::new(),
            owner_id: String::new(),
            owner_name: String::new(),
            description: String::new(),
            private: false,
            item_count: 7000,
            fetched_count: 5000,
            capped: true,
            updated_at,
        }
    }

    #[test]
    fn staleness_boundary_is_strict() {
        let now = Utc::now();
        let ttl = Duration::from_secs(3600);
        let just_over = now - TimeDelta::seconds(3600) - TimeDelta::nanoseconds(1);
        let exactly = now - TimeDelta::seconds(3600);

        assert!(is_stale(just_over, now, ttl));
        assert!(!is_stale(exactly, now, ttl));
        assert!(!is_stale(now, now, ttl));
        assert!(!is_stale(now - TimeDelta::days(365_000), now, Duration::MAX));
    }

    #[test]
    fn classify_covers_each_state() {
        let now = Utc::now();
        let ttl = Duration::from_secs(60);
        assert_eq!(classify(None, now, ttl), SyncState::Missing);
        assert_eq!(classify(Some(&list(now)), now, ttl), SyncState::Fresh);
        assert_eq!(
            classify(Some(&list(now - TimeDelta::minutes(5))), now, ttl),
            SyncState::Stale
        );
    }

    #[test]
    fn catch_up_is_independent_of_ttl() {
        let now = Utc::now();
        let status = ListStatus::of(
            &list(now),
            now,
            Duration::from_secs(24 * 3600),
            Duration::from_secs(15 * 60),
        );
        assert!(status.partially_synced);
        assert_eq!(status.state, SyncState::Fresh);
        assert_eq!(status.catch_up_after, Some(now + TimeDelta::minutes(15)));
    }
}
