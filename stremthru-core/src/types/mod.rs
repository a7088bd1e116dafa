//! Domain types shared by the storage, identity, and sync layers.

pub mod identity;
pub mod list;

pub use identity::{IdColumn, IdentityRecord, IdentityType, Observation, UnknownIdColumn};
pub use list::{ExternalList, ListItem, ListKey, Provider, StoredList, UnknownProvider};
