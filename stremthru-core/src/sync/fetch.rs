use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ProviderSyncPolicy;
use crate::error::{EngineError, Result};
use crate::providers::{FetchOutcome, ListPage, ListProvider, ProviderError};

/// Pages through one list within the policy's page and item ceilings.
pub async fn fetch_all(
    provider: &dyn ListProvider,
    list_id: &str,
    policy: &ProviderSyncPolicy,
    cancel: &CancellationToken,
) -> Result<FetchOutcome> {
    let max_pages = policy.max_pages.max(1);
    let mut outcome = FetchOutcome::default();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch_page(provider, list_id, cursor.as_deref(), policy, cancel).await?;
        pages += 1;

        if outcome.meta.is_none() {
            outcome.meta = page.list;
        }
        outcome.items.extend(page.items);

        if outcome.items.len() >= policy.max_items {
            let truncated = outcome.items.len() > policy.max_items;
            outcome.items.truncate(policy.max_items);
            outcome.capped = truncated || page.next_cursor.is_some();
            break;
        }

        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
        if pages >= max_pages {
            outcome.capped = true;
            break;
        }

        pause(policy.page_delay(), cancel).await?;
    }

    debug!(
        provider = %provider.provider(),
        list_id,
        pages,
        items = outcome.items.len(),
        capped = outcome.capped,
        "list fetch finished"
    );
    Ok(outcome)
}

/// One page, retried in place while the upstream rate limits us.
async fn fetch_page(
    provider: &dyn ListProvider,
    list_id: &str,
    cursor: Option<&str>,
    policy: &ProviderSyncPolicy,
    cancel: &CancellationToken,
) -> Result<ListPage> {
    let name = provider.provider();
    let timeout = policy.request_timeout();
    let mut rate_limited = 0u32;

    loop {
        let call = tokio::time::timeout(timeout, provider.fetch_list_page(list_id, cursor));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(EngineError::Cancelled(format!("fetch of {name}:{list_id}")));
            }
            result = call => result,
        };

        match result {
            Ok(Ok(page)) => return Ok(page),
            Ok(Err(ProviderError::RateLimited { retry_after }))
                if rate_limited < policy.max_rate_limit_retries =>
            {
                rate_limited += 1;
                let wait = retry_after.unwrap_or_else(|| policy.rate_limit_fallback());
                warn!(
                    provider = %name,
                    list_id,
                    cursor,
                    attempt = rate_limited,
                    wait_ms = wait.as_millis() as u64,
                    "rate limited; retrying page"
                );
                pause(wait, cancel).await?;
            }
            Ok(Err(err)) => return Err(EngineError::upstream(name, err)),
            Err(_) => return Err(EngineError::upstream(name, ProviderError::Timeout(timeout))),
        }
    }
}

async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled("sync pass".to_string())),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
