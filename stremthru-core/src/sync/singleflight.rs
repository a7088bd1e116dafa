use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{EngineError, Result};

type Flight<T> = Shared<BoxFuture<'static, std::result::Result<T, Arc<EngineError>>>>;

/// Collapses concurrent calls for the same key into one execution whose
/// result (or error) every caller receives.
///
/// The work is driven by whichever caller is polling; a caller that goes
/// away does not cancel it for the others.
pub struct SingleFlight<T> {
    flights: Mutex<HashMap<String, Flight<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.flights.lock().len())
            .finish()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut>(&self, key: &str, work: F) -> std::result::Result<T, Arc<EngineError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let flight = {
            let mut flights = self.flights.lock();
            match flights.get(key) {
                Some(flight) => {
                    debug!(key, "joining in-flight call");
                    flight.clone()
                }
                None => {
                    let flight = work().map(|result| result.map_err(Arc::new)).boxed().shared();
                    flights.insert(key.to_string(), flight.clone());
                    flight
                }
            }
        };

        let result = flight.clone().await;

        let mut flights = self.flights.lock();
        if flights
            .get(key)
            .is_some_and(|current| current.ptr_eq(&flight))
        {
            flights.remove(key);
        }
        result
    }

    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flights = Arc::new(SingleFlight::<usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = flights.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flights
                    .run("list:trakt:1", move || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.expect("task").expect("shared ok"), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn errors_are_shared_and_not_cached() {
        let flights = SingleFlight::<u8>::new();
        let err = flights
            .run("k", || async { Err(EngineError::InvalidInput("boom".into())) })
            .await
            .expect_err("fails");
        assert!(matches!(*err, EngineError::InvalidInput(_)));

        let ok = flights.run("k", || async { Ok(7) }).await.expect("second call runs");
        assert_eq!(ok, 7);
    }
}
