use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use stremthru_core::providers::{ListMeta, ListPage, ListProvider, ProviderError, RawListItem};
use stremthru_core::types::{IdColumn, IdentityType, Observation, Provider};

/// Scriptable upstream. Lists are served in pages of `page_size`; every call
/// is counted so tests can assert how often the upstream was hit.
pub struct FakeProvider {
    provider: Provider,
    page_size: usize,
    latency: Duration,
    lists: Mutex<HashMap<String, FakeList>>,
    items: Mutex<HashMap<String, RawListItem>>,
    rate_limits: Mutex<usize>,
    failing: AtomicBool,
    page_calls: AtomicUsize,
    item_calls: AtomicUsize,
}

#[derive(Clone, Debug, Default)]
pub struct FakeList {
    pub meta: ListMeta,
    pub items: Vec<RawListItem>,
}

impl FakeProvider {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            page_size: 50,
            latency: Duration::ZERO,
            lists: Mutex::new(HashMap::new()),
            items: Mutex::new(HashMap::new()),
            rate_limits: Mutex::new(0),
            failing: AtomicBool::new(false),
            page_calls: AtomicUsize::new(0),
            item_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delay applied to every page call, to keep concurrent callers overlapping.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_list(&self, list_id: &str, list: FakeList) {
        self.lists.lock().insert(list_id.to_string(), list);
    }

    pub fn set_item(&self, id: &str, item: RawListItem) {
        self.items.lock().insert(id.to_string(), item);
    }

    /// The next `count` page calls answer with a rate limit.
    pub fn rate_limit_next(&self, count: usize) {
        *self.rate_limits.lock() = count;
    }

    /// While set, every page call answers with a 503.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn item_calls(&self) -> usize {
        self.item_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListProvider for FakeProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn fetch_list_page(
        &self,
        list_id: &str,
        cursor: Option<&str>,
    ) -> Result<ListPage, ProviderError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        {
            let mut remaining = self.rate_limits.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ProviderError::RateLimited {
                    retry_after: Some(Duration::from_millis(10)),
                });
            }
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }

        let list = self
            .lists
            .lock()
            .get(list_id)
            .cloned()
            .ok_or(ProviderError::NotFound)?;
        let page: usize = match cursor {
            Some(cursor) => cursor
                .parse()
                .map_err(|_| ProviderError::Parse(format!("bad cursor {cursor}")))?,
            None => 0,
        };
        let start = page * self.page_size;
        let end = (start + self.page_size).min(list.items.len());
        let items = list.items.get(start..end).unwrap_or_default().to_vec();

        Ok(ListPage {
            list: (page == 0).then(|| list.meta.clone()),
            items,
            next_cursor: (end < list.items.len()).then(|| (page + 1).to_string()),
        })
    }

    async fn fetch_item_by_id(
        &self,
        id: &str,
        _kind: IdentityType,
    ) -> Result<Option<RawListItem>, ProviderError> {
        self.item_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.lock().get(id).cloned())
    }
}

/// Movie whose native id is `id` and which also carries an imdb id.
pub fn movie(id: &str, imdb: &str, genres: &[&str]) -> RawListItem {
    RawListItem {
        id: id.to_string(),
        kind: IdentityType::Movie,
        title: format!("Movie {id}"),
        year: Some(2001),
        genres: genres.iter().map(|genre| genre.to_string()).collect(),
        ids: Observation::new(IdentityType::Movie).with(IdColumn::Imdb, imdb),
        ..RawListItem::default()
    }
}

pub fn meta(name: &str, item_count: Option<i64>) -> ListMeta {
    ListMeta {
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        owner_id: "u1".to_string(),
        owner_name: "someone".to_string(),
        item_count,
        ..ListMeta::default()
    }
}
