//! List sync paths through the engine, backed by in-memory SQLite and a
//! scripted upstream. These run on the real clock with short intervals.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use stremthru_core::config::{EngineConfig, ProviderSyncPolicy};
use stremthru_core::types::{IdColumn, IdentityType, ListKey, Observation, Provider};
use stremthru_core::{EngineError, Store, SyncEngine, SyncState};

#[path = "support/mod.rs"]
mod support;

use support::memory_store;
use support::provider::{FakeList, FakeProvider, meta, movie};

fn config(provider: Provider, policy: ProviderSyncPolicy) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.refresh.debounce_ms = 150;
    config.refresh.scan_interval_ms = 10;
    config.sync.providers.insert(provider, policy);
    config
}

fn quick_policy() -> ProviderSyncPolicy {
    ProviderSyncPolicy {
        page_delay_ms: 0,
        request_timeout_ms: 2_000,
        ..ProviderSyncPolicy::default()
    }
}

fn three_movies() -> FakeList {
    FakeList {
        meta: meta("Favourites", Some(3)),
        items: vec![
            movie("a", "tt0000001", &["drama"]),
            movie("b", "tt0000002", &["comedy", "drama"]),
            movie("c", "tt0000003", &[]),
        ],
    }
}

fn engine_with(store: Store, upstream: Arc<FakeProvider>, config: EngineConfig) -> SyncEngine {
    SyncEngine::builder(store)
        .config(config)
        .provider(upstream)
        .build()
}

#[tokio::test]
async fn missing_list_is_fetched_synchronously_without_queueing() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(FakeProvider::new(Provider::Trakt).with_page_size(2));
    upstream.set_list("favs", three_movies());
    let engine = engine_with(store.clone(), upstream.clone(), config(Provider::Trakt, quick_policy()));

    let list = engine.get_list(Provider::Trakt, "favs").await?;

    assert_eq!(upstream.page_calls(), 2);
    assert!(engine.refresh_queue().is_empty());
    assert_eq!(list.list.name, "Favourites");
    assert_eq!(list.list.fetched_count, 3);
    let ids: Vec<&str> = list.items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);

    let status = engine.list_status(Provider::Trakt, "favs").await?;
    assert_eq!(status.state, SyncState::Fresh);
    assert!(!status.partially_synced);

    let persisted = store
        .lists()
        .load_list(&ListKey::new(Provider::Trakt, "favs"))
        .await?
        .context("list persisted")?;
    assert_eq!(persisted.items.len(), 3);
    assert_eq!(persisted.items[1].genre_ids, ["comedy", "drama"]);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stale_reads_collapse_into_one_background_refresh() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(FakeProvider::new(Provider::Trakt));
    upstream.set_list("favs", three_movies());
    let policy = ProviderSyncPolicy {
        ttl_secs: 0,
        ..quick_policy()
    };
    let engine = engine_with(store, upstream.clone(), config(Provider::Trakt, policy));

    engine.get_list(Provider::Trakt, "favs").await?;
    assert_eq!(upstream.page_calls(), 1);
    assert!(engine.refresh_queue().is_empty());

    tokio::time::sleep(Duration::from_millis(5)).await;
    let worker = engine.spawn_refresh_worker();
    for _ in 0..10 {
        let list = engine.get_list(Provider::Trakt, "favs").await?;
        assert_eq!(list.items.len(), 3);
    }
    assert_eq!(upstream.page_calls(), 1);
    assert_eq!(engine.refresh_queue().len(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(upstream.page_calls(), 2);
    assert!(engine.refresh_queue().is_empty());

    engine.shutdown().await;
    worker.await.context("refresh worker exits cleanly")?;
    Ok(())
}

#[tokio::test]
async fn steady_stale_reads_still_refresh() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(FakeProvider::new(Provider::Trakt));
    upstream.set_list("favs", three_movies());
    let policy = ProviderSyncPolicy {
        ttl_secs: 0,
        ..quick_policy()
    };
    let mut config = config(Provider::Trakt, policy);
    config.refresh.scan_interval_ms = 100;
    let engine = engine_with(store, upstream.clone(), config);

    engine.get_list(Provider::Trakt, "favs").await?;
    let worker = engine.spawn_refresh_worker();
    let until = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < until {
        engine.get_list(Provider::Trakt, "favs").await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // One refresh per debounce window plus up to one scan interval.
    let refreshes = upstream.page_calls() - 1;
    assert!(refreshes >= 4, "only {refreshes} refreshes under steady reads");

    engine.shutdown().await;
    worker.await.context("refresh worker exits cleanly")?;
    Ok(())
}

#[tokio::test]
async fn background_refresh_failure_keeps_serving_stored_list() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(FakeProvider::new(Provider::Trakt));
    upstream.set_list("favs", three_movies());
    let policy = ProviderSyncPolicy {
        ttl_secs: 0,
        ..quick_policy()
    };
    let engine = engine_with(store.clone(), upstream.clone(), config(Provider::Trakt, policy));
    let key = ListKey::new(Provider::Trakt, "favs");

    engine.get_list(Provider::Trakt, "favs").await?;
    let before = store.lists().load_list(&key).await?.context("list persisted")?;

    upstream.set_failing(true);
    tokio::time::sleep(Duration::from_millis(5)).await;
    let worker = engine.spawn_refresh_worker();
    let list = engine.get_list(Provider::Trakt, "favs").await?;
    assert_eq!(list.items.len(), 3);
    assert_eq!(engine.refresh_queue().len(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(upstream.page_calls(), 2);
    assert!(engine.refresh_queue().is_empty());

    let list = engine.get_list(Provider::Trakt, "favs").await?;
    let ids: Vec<&str> = list.items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);

    let after = store.lists().load_list(&key).await?.context("list still stored")?;
    assert_eq!(after.list.updated_at, before.list.updated_at);
    assert_eq!(after.items.len(), before.items.len());
    assert_eq!(
        engine.list_status(Provider::Trakt, "favs").await?.state,
        SyncState::Stale
    );

    engine.shutdown().await;
    worker.await.context("refresh worker exits cleanly")?;
    Ok(())
}

#[tokio::test]
async fn resync_rewrites_order_and_genres() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(FakeProvider::new(Provider::Letterboxd));
    upstream.set_list("user/list", three_movies());
    let engine = engine_with(
        store.clone(),
        upstream.clone(),
        config(Provider::Letterboxd, quick_policy()),
    );
    let key = ListKey::new(Provider::Letterboxd, "user/list");

    engine.get_list(Provider::Letterboxd, "user/list").await?;

    upstream.set_list(
        "user/list",
        FakeList {
            meta: meta("Favourites", None),
            items: vec![
                movie("c", "tt0000003", &["horror"]),
                movie("b", "tt0000002", &["drama", "thriller"]),
            ],
        },
    );
    engine.sync_now(key.clone()).await?;

    let persisted = store
        .lists()
        .load_list(&key)
        .await?
        .context("list persisted")?;
    let ids: Vec<&str> = persisted.items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, ["c", "b"]);
    assert_eq!(persisted.items[0].genre_ids, ["horror"]);
    assert_eq!(persisted.items[1].genre_ids, ["drama", "thriller"]);
    assert_eq!(persisted.list.item_count, 2);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn capped_list_is_partial_and_schedules_catch_up() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(FakeProvider::new(Provider::Mdblist).with_page_size(2));
    upstream.set_list(
        "big",
        FakeList {
            meta: meta("Big", Some(6)),
            items: (0..6)
                .map(|idx| movie(&format!("m{idx}"), &format!("tt10{idx}"), &[]))
                .collect(),
        },
    );
    let policy = ProviderSyncPolicy {
        max_pages: 1,
        ..quick_policy()
    };
    let engine = engine_with(store, upstream.clone(), config(Provider::Mdblist, policy));
    let key = ListKey::new(Provider::Mdblist, "big");

    let list = engine.get_list(Provider::Mdblist, "big").await?;
    assert_eq!(list.items.len(), 2);
    assert!(list.list.capped);
    assert!(list.list.is_partially_synced());
    assert_eq!(upstream.page_calls(), 1);

    let catch_up = engine.config().refresh.catch_up_interval();
    let scheduled = engine
        .refresh_queue()
        .scheduled_at(&key)
        .context("catch-up queued")?;
    let remaining = scheduled.saturating_duration_since(tokio::time::Instant::now());
    assert!(remaining > catch_up - Duration::from_secs(5));
    assert!(remaining <= catch_up);

    let status = engine.list_status(Provider::Mdblist, "big").await?;
    assert!(status.partially_synced);
    assert_eq!(status.item_count, 6);
    assert_eq!(status.fetched_count, 2);
    assert!(status.catch_up_after.is_some());

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_missing_reads_share_one_fetch() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(
        FakeProvider::new(Provider::Trakt).with_latency(Duration::from_millis(100)),
    );
    upstream.set_list("favs", three_movies());
    let engine = engine_with(store, upstream.clone(), config(Provider::Trakt, quick_policy()));

    let reads = (0..5).map(|_| engine.get_list(Provider::Trakt, "favs"));
    let results = futures::future::join_all(reads).await;

    for result in results {
        assert_eq!(result?.items.len(), 3);
    }
    assert_eq!(upstream.page_calls(), 1);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn rate_limited_page_is_retried() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(FakeProvider::new(Provider::Tmdb));
    upstream.set_list("8136", three_movies());
    upstream.rate_limit_next(2);
    let engine = engine_with(store, upstream.clone(), config(Provider::Tmdb, quick_policy()));

    let list = engine.get_list(Provider::Tmdb, "8136").await?;
    assert_eq!(list.items.len(), 3);
    assert_eq!(upstream.page_calls(), 3);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn upstream_failure_on_missing_list_is_returned() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(FakeProvider::new(Provider::Trakt));
    let engine = engine_with(store, upstream, config(Provider::Trakt, quick_policy()));

    let err = engine
        .get_list(Provider::Trakt, "nope")
        .await
        .expect_err("upstream has no such list");
    assert!(matches!(
        err.root(),
        EngineError::Upstream {
            provider: Provider::Trakt,
            ..
        }
    ));
    let status = engine.list_status(Provider::Trakt, "nope").await?;
    assert_eq!(status.state, SyncState::Missing);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unconfigured_provider_and_blank_id_are_rejected() -> Result<()> {
    let store = memory_store().await?;
    let engine = SyncEngine::builder(store).build();

    let err = engine
        .get_list(Provider::Anilist, "list")
        .await
        .expect_err("no anilist client");
    assert!(err.is_configuration());

    let err = engine
        .get_list(Provider::Anilist, " ")
        .await
        .expect_err("blank id");
    assert!(matches!(err, EngineError::InvalidInput(_)));
    Ok(())
}

#[tokio::test]
async fn list_hints_reach_the_id_map() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(FakeProvider::new(Provider::Letterboxd));
    upstream.set_list("user/list", three_movies());
    let engine = engine_with(
        store.clone(),
        upstream,
        config(Provider::Letterboxd, quick_policy()),
    );

    engine.get_list(Provider::Letterboxd, "user/list").await?;

    let identities = store.identities();
    let mut record = None;
    for _ in 0..50 {
        record = identities.find_by(IdColumn::Letterboxd, "b").await?;
        if record.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let record = record.context("hint merged in the background")?;
    assert_eq!(record.get(IdColumn::Imdb), Some("tt0000002"));

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn list_hints_replace_cached_lookups() -> Result<()> {
    let store = memory_store().await?;
    let upstream = Arc::new(FakeProvider::new(Provider::Letterboxd));
    upstream.set_list("user/list", three_movies());
    let engine = engine_with(
        store,
        upstream,
        config(Provider::Letterboxd, quick_policy()),
    );

    engine
        .merge_identities(
            vec![Observation::default()
                .with(IdColumn::Letterboxd, "b")
                .with(IdColumn::Tmdb, "222")],
            IdColumn::Letterboxd,
        )
        .await?;
    let cached = engine
        .resolve_identity(IdColumn::Letterboxd, "b", IdentityType::Unknown)
        .await?
        .context("seeded record")?;
    assert_eq!(cached.get(IdColumn::Imdb), None);

    engine.get_list(Provider::Letterboxd, "user/list").await?;

    let mut imdb = None;
    for _ in 0..50 {
        let record = engine
            .resolve_identity(IdColumn::Letterboxd, "b", IdentityType::Unknown)
            .await?
            .context("record survives the merge")?;
        imdb = record.get(IdColumn::Imdb).map(str::to_string);
        if imdb.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(imdb.as_deref(), Some("tt0000002"));

    engine.shutdown().await;
    Ok(())
}
