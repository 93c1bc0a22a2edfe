//! Affinity resolution: fingerprint → store lookup → channel validation.

use crate::cache::AffinityStore;
use crate::directory::ChannelValidator;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::state::{RequestState, AUTO_GROUP};
use crate::types::{Channel, Turn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Channel a conversation should stick to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffinityHint {
    pub channel_id: u32,
    /// Key index within a multi-key channel.
    pub sub_key_index: Option<u32>,
    /// Channel as returned by the directory during validation.
    pub channel: Channel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub hits: u64,
    pub misses: u64,
    /// Stored channel existed in cache but failed validation.
    pub rejected: u64,
    /// No fingerprint, or no resolved group/model.
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    rejected: AtomicU64,
    skipped: AtomicU64,
}

/// Read-only with respect to persistent state; every failure inside degrades
/// to "not applicable".
pub struct AffinityResolver {
    fingerprinter: Fingerprinter,
    store: Arc<AffinityStore>,
    validator: ChannelValidator,
    counters: Counters,
}

impl AffinityResolver {
    pub fn new(
        fingerprinter: Fingerprinter,
        store: Arc<AffinityStore>,
        validator: ChannelValidator,
    ) -> Self {
        Self {
            fingerprinter,
            store,
            validator,
            counters: Counters::default(),
        }
    }

    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    pub fn store(&self) -> &Arc<AffinityStore> {
        &self.store
    }

    /// Answer "which channel should this conversation stick to?" for an
    /// already resolved `group`.
    pub async fn resolve(&self, group: &str, model: &str, turns: &[Turn]) -> Option<AffinityHint> {
        let fingerprint = match self.fingerprinter.fingerprint(turns) {
            Some(fp) => fp,
            None => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        self.lookup(group, model, &fingerprint).await
    }

    /// Like [`resolve`](Self::resolve), reading group and model from `state`
    /// and recording the outcome into it.
    ///
    /// The fingerprint is stored whenever one was computed, hit or not, so the
    /// success hook can persist the mapping later without recomputing it.
    pub async fn resolve_request(
        &self,
        state: &mut RequestState,
        turns: &[Turn],
    ) -> Option<AffinityHint> {
        state.affinity_applied = false;
        state.fingerprint = self.fingerprinter.fingerprint(turns);
        let fingerprint = match state.fingerprint.clone() {
            Some(fp) => fp,
            None => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        let (group, model) = match (state.resolved_group(), state.model()) {
            (Some(g), Some(m)) => (g.to_string(), m.to_string()),
            _ => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        let hint = self.lookup(&group, &model, &fingerprint).await?;
        state.affinity_applied = true;
        Some(hint)
    }

    async fn lookup(&self, group: &str, model: &str, fingerprint: &Fingerprint) -> Option<AffinityHint> {
        if group.is_empty() || group == AUTO_GROUP || model.is_empty() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let record = match self.store.get(group, model, fingerprint).await {
            Some(r) => r,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        // A stale entry is left alone; it expires or gets overwritten by the
        // next successful write.
        let channel = match self.validator.validate(record.channel_id).await {
            Some(ch) => ch,
            None => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        debug!(
            group,
            channel_id = record.channel_id,
            hash_hint = fingerprint.hash_hint(),
            "session affinity hit"
        );
        Some(AffinityHint {
            channel_id: record.channel_id,
            sub_key_index: record.sub_key_index,
            channel,
        })
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}
