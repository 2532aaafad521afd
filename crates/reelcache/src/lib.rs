//! # Reelcache
//!
//! Local video cache and prefetch engine for vertical-scrolling feeds.
//! Keeps the active item playing with no stall and neighboring items warm,
//! while bounding on-device storage.
//!
//! ## Features
//!
//! - Content-addressed disk cache keyed by a hash of the source URL
//! - Size-bounded (FIFO) and age-bounded (TTL) eviction
//! - Atomic publish: a reader never observes a partially written file
//! - Sliding-window prefetch around the current scroll position
//! - Bounded download concurrency with in-flight deduplication
//! - Graceful degradation: resolution falls back to the remote URL, so
//!   playback is never blocked by a cache failure
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reelcache_engine::{CacheConfig, CacheStore, PrefetchScheduler};
//!
//! # async fn example() -> Result<(), reelcache_engine::CacheError> {
//! let store = Arc::new(CacheStore::new(CacheConfig::default()).await?);
//! let scheduler = PrefetchScheduler::new(Arc::clone(&store));
//!
//! let feed: Vec<String> = vec![
//!     "https://cdn.example.com/a.mp4".into(),
//!     "https://cdn.example.com/b.mp4".into(),
//! ];
//!
//! // On every meaningful scroll-position change:
//! scheduler.prefetch_around(&feed, 0);
//!
//! // Right before handing a URL to the player:
//! let playback_url = store.resolve(&feed[0]).await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod fetch;
pub mod scheduler;
pub mod store;

pub use builder::CacheConfigBuilder;
pub use config::CacheConfig;
pub use error::CacheError;
pub use fetch::{ByteStream, HttpFetcher, MediaFetcher, create_client};
pub use scheduler::{PrefetchConfig, PrefetchScheduler, SchedulerStatus};
pub use store::{CacheKey, CacheStats, CacheStore};
