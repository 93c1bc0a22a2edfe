//! Affinity store: key construction, record (de)serialization and error
//! swallowing on top of a [`CacheBackend`].

use super::backend::CacheBackend;
use super::key::{AffinityKey, AffinityRecord};
use crate::config::AffinityConfig;
use crate::fingerprint::Fingerprint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Backend failures plus unparsable records.
    pub errors: u64,
}

impl StoreStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
    fn to_stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Every operation is infallible from the caller's point of view: a disabled
/// or failing backend reads as a miss and silently drops writes.
pub struct AffinityStore {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    enabled: bool,
    stats: AtomicStats,
}

impl AffinityStore {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &AffinityConfig) -> Self {
        let ttl = if config.ttl.is_zero() {
            Duration::from_secs(crate::config::DEFAULT_TTL_SECS)
        } else {
            config.ttl
        };
        Self {
            backend,
            ttl,
            enabled: config.enabled,
            stats: AtomicStats::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.backend.is_enabled()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.to_stats()
    }

    /// `None` when the store is disabled or the fingerprint is empty.
    fn key_for(&self, group: &str, model: &str, fingerprint: &Fingerprint) -> Option<String> {
        if !self.is_enabled() || fingerprint.as_str().is_empty() {
            return None;
        }
        Some(AffinityKey::new(group, model, fingerprint).to_cache_key())
    }

    pub async fn get(
        &self,
        group: &str,
        model: &str,
        fingerprint: &Fingerprint,
    ) -> Option<AffinityRecord> {
        let key = self.key_for(group, model, fingerprint)?;
        match self.backend.get(&key).await {
            Ok(Some(raw)) => match raw.parse::<AffinityRecord>() {
                Ok(record) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    Some(record)
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, error = %e, "ignoring affinity record");
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, backend = self.backend.name(), error = %e, "affinity lookup failed");
                None
            }
        }
    }

    /// Last writer wins; the TTL is refreshed on every write.
    pub async fn set(
        &self,
        group: &str,
        model: &str,
        fingerprint: &Fingerprint,
        record: AffinityRecord,
    ) {
        if record.channel_id == 0 {
            return;
        }
        let Some(key) = self.key_for(group, model, fingerprint) else {
            return;
        };
        match self.backend.set(&key, &record.to_string(), self.ttl).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, record = %record, "affinity stored");
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, backend = self.backend.name(), error = %e, "affinity write failed");
            }
        }
    }

    pub async fn delete(&self, group: &str, model: &str, fingerprint: &Fingerprint) {
        let Some(key) = self.key_for(group, model, fingerprint) else {
            return;
        };
        match self.backend.delete(&key).await {
            Ok(removed) => {
                if removed {
                    self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, backend = self.backend.name(), error = %e, "affinity delete failed");
            }
        }
    }
}
