use async_trait::async_trait;

use crate::database::StoreResult;
use crate::types::{ExternalList, ListItem, ListKey, StoredList};

/// Persistence for mirrored external lists.
#[async_trait]
pub trait ListRepository: Send + Sync {
    /// Writes one sync pass atomically: the list row, its items, genre links
    /// reconciled by diff, and the rank-ordered membership replaced wholesale.
    async fn save_list(&self, list: &ExternalList, items: &[ListItem]) -> StoreResult<()>;

    async fn load_list(&self, key: &ListKey) -> StoreResult<Option<StoredList>>;
}
