//! # Affinity Cache Module
//!
//! Persistence of sticky channel assignments in a shared, TTL-capable
//! key/value cache.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AffinityStore`] | Key construction, record parsing, error swallowing |
//! | [`CacheBackend`] | Trait for the shared cache client |
//! | [`MemoryCache`] | In-process TTL cache |
//! | [`NullCache`] | Disabled cache |
//! | [`AffinityKey`] | `affinity:<group>:<model-hash>:<fingerprint>` |
//! | [`AffinityRecord`] | `"<channel>"` or `"<channel>:<sub-key>"` |
//!
//! ## Example
//!
//! ```rust
//! use channel_affinity::cache::{AffinityRecord, AffinityStore, MemoryCache};
//! use channel_affinity::config::AffinityConfig;
//! use channel_affinity::fingerprint::Fingerprint;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = AffinityStore::new(Arc::new(MemoryCache::new(1000)), &AffinityConfig::default());
//! let fp = Fingerprint::from_hex("9e107d9d372bb6826bd81d3542a419d6").unwrap();
//! store.set("default", "gpt-x", &fp, AffinityRecord::new(42)).await;
//! assert_eq!(store.get("default", "gpt-x", &fp).await, Some(AffinityRecord::new(42)));
//! # });
//! ```

mod backend;
mod key;
mod store;

#[cfg(feature = "redis")]
mod redis_backend;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use key::{AffinityKey, AffinityRecord, ParseRecordError};
pub use store::{AffinityStore, StoreStats};

#[cfg(feature = "redis")]
pub use redis_backend::RedisCache;
