use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::ListKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueOutcome {
    Scheduled,
    /// A job for the key is already pending; its time is left unchanged.
    Collapsed,
    /// The queue is at capacity; the request was dropped.
    Full,
}

/// Debounced, bounded set of pending refreshes keyed by list.
#[derive(Debug)]
pub struct DebouncedRefreshQueue {
    debounce: Duration,
    capacity: usize,
    pending: Mutex<HashMap<ListKey, Instant>>,
}

impl DebouncedRefreshQueue {
    pub fn new(debounce: Duration, capacity: usize) -> Self {
        Self {
            debounce,
            capacity,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Schedules a refresh one debounce window from now.
    pub fn queue(&self, key: ListKey) -> QueueOutcome {
        let now = Instant::now();
        self.schedule(key, now, now + self.debounce)
    }

    /// Schedules a refresh no earlier than `not_before`.
    pub fn queue_at(&self, key: ListKey, not_before: Instant) -> QueueOutcome {
        self.schedule(key, Instant::now(), not_before)
    }

    fn schedule(&self, key: ListKey, now: Instant, at: Instant) -> QueueOutcome {
        let mut pending = self.pending.lock();
        // A pending entry is never pushed later, including one that is due
        // and waiting for the next scan.
        if pending.contains_key(&key) {
            debug!(%key, "refresh already pending");
            return QueueOutcome::Collapsed;
        }
        if pending.len() >= self.capacity {
            warn!(%key, capacity = self.capacity, "refresh queue full; dropping request");
            return QueueOutcome::Full;
        }
        debug!(%key, delay_ms = at.saturating_duration_since(now).as_millis() as u64, "refresh scheduled");
        pending.insert(key, at);
        QueueOutcome::Scheduled
    }

    /// Removes and returns every key due at or before `now`.
    pub fn drain_due(&self, now: Instant) -> Vec<ListKey> {
        let mut pending = self.pending.lock();
        let due: Vec<ListKey> = pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &due {
            pending.remove(key);
        }
        due
    }

    pub fn scheduled_at(&self, key: &ListKey) -> Option<Instant> {
        self.pending.lock().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;

    fn key(id: &str) -> ListKey {
        ListKey::new(Provider::Letterboxd, id)
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_requests_inside_window_collapse() {
        let queue = DebouncedRefreshQueue::new(Duration::from_secs(10), 100);
        assert_eq!(queue.queue(key("a")), QueueOutcome::Scheduled);
        for _ in 0..9 {
            assert_eq!(queue.queue(key("a")), QueueOutcome::Collapsed);
        }
        assert_eq!(queue.len(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(queue.drain_due(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(queue.drain_due(Instant::now()), vec![key("a")]);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn due_entry_keeps_its_time_until_drained() {
        let queue = DebouncedRefreshQueue::new(Duration::from_secs(1), 100);
        queue.queue(key("a"));
        let first = queue.scheduled_at(&key("a"));
        tokio::time::advance(Duration::from_secs(2)).await;

        for _ in 0..5 {
            assert_eq!(queue.queue(key("a")), QueueOutcome::Collapsed);
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        assert_eq!(queue.scheduled_at(&key("a")), first);
        assert_eq!(queue.drain_due(Instant::now()), vec![key("a")]);

        assert_eq!(queue.queue(key("a")), QueueOutcome::Scheduled);
        assert_eq!(
            queue.scheduled_at(&key("a")),
            Some(Instant::now() + Duration::from_secs(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn catch_up_collapses_like_debounce() {
        let queue = DebouncedRefreshQueue::new(Duration::from_secs(1), 100);
        let at = Instant::now() + Duration::from_secs(900);
        assert_eq!(queue.queue_at(key("big"), at), QueueOutcome::Scheduled);
        assert_eq!(queue.queue(key("big")), QueueOutcome::Collapsed);
        assert_eq!(queue.scheduled_at(&key("big")), Some(at));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_bounds_pending_keys() {
        let queue = DebouncedRefreshQueue::new(Duration::from_secs(1), 2);
        queue.queue(key("a"));
        queue.queue(key("b"));
        assert_eq!(queue.queue(key("c")), QueueOutcome::Full);
        assert_eq!(queue.queue(key("a")), QueueOutcome::Collapsed);
        assert_eq!(queue.len(), 2);
    }
}
