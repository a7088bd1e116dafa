//! List sync: freshness classification, paged fetching, locking, the debounced
//! refresh queue, and the engine that ties them to storage and cache.

mod engine;
pub mod fetch;
pub mod locks;
pub mod refresh_queue;
pub mod singleflight;
pub mod state;

pub use engine::{SyncEngine, SyncEngineBuilder};
pub use fetch::fetch_all;
pub use locks::SyncLocks;
pub use refresh_queue::{DebouncedRefreshQueue, QueueOutcome};
pub use singleflight::SingleFlight;
pub use state::{ListStatus, SyncState, classify, is_stale};
