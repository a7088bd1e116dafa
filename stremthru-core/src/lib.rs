//! # StremThru Core
//!
//! Mirrors externally owned catalog lists (Letterboxd, Trakt, TMDB, TVDB,
//! MDBList, AniList) into a local store and reconciles the partial,
//! cross-provider id sightings those lists carry into a single id map.
//!
//! ## Overview
//!
//! - **Id map**: [`identity::IdentityMergeEngine`] merges [`types::Observation`]s
//!   by anchor column with a bulk upsert, a conflict-column retry, and a
//!   per-item fallback. Set ids are never overwritten by routine merges.
//! - **List sync**: [`sync::SyncEngine`] serves stored lists immediately,
//!   fetching synchronously only when a list is missing and queueing a
//!   debounced background refresh when it is stale.
//! - **Storage**: [`database::Store`] runs on PostgreSQL or SQLite behind the
//!   same repository ports.
//! - **Cache**: [`cache::TieredCache`] keeps a local tier in front of a shared
//!   (Redis or in-process) tier with jittered lifetimes.
//!
//! ## Examples
//!
//! ```no_run
//! use stremthru_core::{EngineConfig, Store, SyncEngine, types::Provider};
//!
//! async fn watchlist(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::connect(&config.database).await?;
//!     let engine = SyncEngine::builder(store)
//!         .config(config)
//!         .connect_shared_cache()
//!         .await?
//!         .build();
//!     let _worker = engine.spawn_refresh_worker();
//!
//!     match engine.get_list(Provider::Trakt, "watchlist").await {
//!         Ok(list) => println!("{} items", list.items.len()),
//!         Err(err) if err.is_configuration() => eprintln!("no trakt client: {err}"),
//!         Err(err) => return Err(err.into()),
//!     }
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Two-tier cache with jittered lifetimes
pub mod cache;

/// Engine configuration with serde defaults
pub mod config;

/// Storage ports and the PostgreSQL/SQLite backends
pub mod database;

/// Error types and error handling utilities
pub mod error;

/// Id map reconciliation
pub mod identity;

/// Upstream provider seam and response normalization
pub mod providers;

/// List freshness, fetching, and background refresh
pub mod sync;

/// Domain types shared across layers
pub mod types;

pub use config::EngineConfig;
pub use database::{Store, StoreError};
pub use error::{EngineError, Result};
pub use identity::{IdentityMergeEngine, MergePath, MergeReport};
pub use sync::{ListStatus, SyncEngine, SyncState};
