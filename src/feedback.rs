//! Post-request hooks that close the affinity loop.
//!
//! - [`AffinityFeedback::on_success`] persists the channel that actually served
//!   the request, off the request's critical path.
//! - [`AffinityFeedback::on_failure`] clears the entry when a request that used
//!   affinity failed because of the sticky channel, so the next turn is routed
//!   normally instead of hitting the same channel again.
//!
//! Both hooks are silent no-ops when the group or model cannot be determined.

use crate::cache::{AffinityRecord, AffinityStore};
use crate::failure::UpstreamFailure;
use crate::state::RequestState;
use crate::writer::{BackgroundWriter, WriterStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackStats {
    pub invalidations: u64,
    pub writes: WriterStats,
}

pub struct AffinityFeedback {
    store: Arc<AffinityStore>,
    writer: BackgroundWriter,
    invalidations: AtomicU64,
}

impl AffinityFeedback {
    pub fn new(store: Arc<AffinityStore>, max_pending_writes: usize) -> Self {
        Self {
            store,
            writer: BackgroundWriter::new(max_pending_writes),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Schedule the write of `(group, model, fingerprint) -> channel`.
    ///
    /// The channel recorded at dispatch time wins over `fallback_channel_id`.
    /// Returns whether a write was handed to the background writer; the write
    /// itself is best-effort and its outcome is never reported.
    pub fn on_success(&self, state: &RequestState, fallback_channel_id: Option<u32>) -> bool {
        let fingerprint = match state.fingerprint.clone() {
            Some(fp) => fp,
            None => return false,
        };
        let channel_id = match state
            .dispatched_channel_id
            .filter(|id| *id > 0)
            .or_else(|| fallback_channel_id.filter(|id| *id > 0))
        {
            Some(id) => id,
            None => return false,
        };
        let (group, model) = match (state.resolved_group(), state.model()) {
            (Some(g), Some(m)) => (g.to_string(), m.to_string()),
            _ => return false,
        };
        let mut record = AffinityRecord::new(channel_id);
        if let Some(idx) = state.multi_key_index {
            record = record.with_sub_key(idx);
        }

        let store = self.store.clone();
        self.writer.spawn(async move {
            store.set(&group, &model, &fingerprint, record).await;
        })
    }

    /// Clear the entry this request read, if affinity was applied on it.
    ///
    /// Afterwards `state.affinity_applied` is reset so retries within the
    /// same request do not delete again. Returns whether a delete was issued.
    pub async fn on_failure(&self, state: &mut RequestState) -> bool {
        if !state.affinity_applied {
            return false;
        }
        let fingerprint = match state.fingerprint.as_ref() {
            Some(fp) => fp,
            None => return false,
        };
        let (group, model) = match (state.resolved_group(), state.model()) {
            (Some(g), Some(m)) => (g, m),
            _ => return false,
        };
        if !self.store.is_enabled() {
            state.affinity_applied = false;
            return false;
        }
        self.store.delete(group, model, fingerprint).await;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!(group, hash_hint = fingerprint.hash_hint(), "session affinity cleared");
        state.affinity_applied = false;
        true
    }

    /// Route an upstream error through [`on_failure`](Self::on_failure) only
    /// when it is one that should undo stickiness.
    pub async fn on_upstream_error(
        &self,
        state: &mut RequestState,
        failure: UpstreamFailure,
    ) -> bool {
        if !failure.invalidates_affinity() {
            return false;
        }
        self.on_failure(state).await
    }

    /// Wait for pending success-path writes. Meant for shutdown and tests.
    pub async fn flush(&self) {
        self.writer.wait_idle().await;
    }

    pub fn stats(&self) -> FeedbackStats {
        FeedbackStats {
            invalidations: self.invalidations.load(Ordering::Relaxed),
            writes: self.writer.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::AffinityConfig;
    use crate::fingerprint::Fingerprint;

    fn fp() -> Fingerprint {
        Fingerprint::from_hex("92eb5ffee6ae2fec3ad71c777531578f").unwrap()
    }

    fn setup() -> (AffinityFeedback, Arc<AffinityStore>) {
        let store = Arc::new(AffinityStore::new(
            Arc::new(MemoryCache::new(64)),
            &AffinityConfig::default(),
        ));
        (AffinityFeedback::new(store.clone(), 8), store)
    }

    fn state_with_fp() -> RequestState {
        let mut state = RequestState::new("default", "gpt-x");
        state.fingerprint = Some(fp());
        state
    }

    #[tokio::test]
    async fn test_success_prefers_dispatched_channel() {
        let (feedback, store) = setup();
        let mut state = state_with_fp();
        state.dispatched_channel_id = Some(7);
        assert!(feedback.on_success(&state, Some(9)));
        feedback.flush().await;
        assert_eq!(
            store.get("default", "gpt-x", &fp()).await,
            Some(AffinityRecord::new(7))
        );
    }

    #[tokio::test]
    async fn test_success_uses_fallback_when_nothing_dispatched() {
        let (feedback, store) = setup();
        let state = state_with_fp();
        assert!(feedback.on_success(&state, Some(9)));
        feedback.flush().await;
        assert_eq!(
            store.get("default", "gpt-x", &fp()).await,
            Some(AffinityRecord::new(9))
        );
    }

    #[tokio::test]
    async fn test_success_writes_sub_key() {
        let (feedback, store) = setup();
        let mut state = state_with_fp();
        state.dispatched_channel_id = Some(7);
        state.multi_key_index = Some(0);
        assert!(feedback.on_success(&state, None));
        feedback.flush().await;
        assert_eq!(
            store.get("default", "gpt-x", &fp()).await,
            Some(AffinityRecord::new(7).with_sub_key(0))
        );
    }

    #[tokio::test]
    async fn test_success_skipped_without_fingerprint_or_channel() {
        let (feedback, _) = setup();
        let no_fp = RequestState::new("default", "gpt-x");
        assert!(!feedback.on_success(&no_fp, Some(9)));
        assert!(!feedback.on_success(&state_with_fp(), None));
        assert!(!feedback.on_success(&state_with_fp(), Some(0)));
        assert_eq!(feedback.stats().writes.dispatched, 0);
    }

    #[tokio::test]
    async fn test_success_skipped_for_unresolved_group() {
        let (feedback, _) = setup();
        let mut state = state_with_fp();
        state.using_group = "auto".into();
        assert!(!feedback.on_success(&state, Some(9)));
    }

    #[tokio::test]
    async fn test_failure_requires_applied_affinity() {
        let (feedback, store) = setup();
        store
            .set("default", "gpt-x", &fp(), AffinityRecord::new(7))
            .await;
        let mut state = state_with_fp();
        assert!(!feedback.on_failure(&mut state).await);
        assert!(store.get("default", "gpt-x", &fp()).await.is_some());
    }

    #[tokio::test]
    async fn test_failure_clears_once() {
        let (feedback, store) = setup();
        store
            .set("default", "gpt-x", &fp(), AffinityRecord::new(7))
            .await;
        let mut state = state_with_fp();
        state.affinity_applied = true;
        assert!(feedback.on_failure(&mut state).await);
        assert!(!state.affinity_applied);
        assert!(store.get("default", "gpt-x", &fp()).await.is_none());
        assert!(!feedback.on_failure(&mut state).await);
        assert_eq!(feedback.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn test_failure_with_disabled_store_is_not_counted() {
        let store = Arc::new(AffinityStore::new(
            Arc::new(MemoryCache::new(64)),
            &AffinityConfig::default().with_enabled(false),
        ));
        let feedback = AffinityFeedback::new(store, 8);
        let mut state = state_with_fp();
        state.affinity_applied = true;
        assert!(!feedback.on_failure(&mut state).await);
        assert!(!state.affinity_applied);
        assert_eq!(feedback.stats().invalidations, 0);
    }

    #[tokio::test]
    async fn test_upstream_error_filters_by_class() {
        let (feedback, store) = setup();
        store
            .set("default", "gpt-x", &fp(), AffinityRecord::new(7))
            .await;
        let mut state = state_with_fp();
        state.affinity_applied = true;
        assert!(
            !feedback
                .on_upstream_error(&mut state, UpstreamFailure::ServerError)
                .await
        );
        assert!(state.affinity_applied);
        assert!(
            feedback
                .on_upstream_error(&mut state, UpstreamFailure::from_http_status(429))
                .await
        );
        assert!(store.get("default", "gpt-x", &fp()).await.is_none());
    }
}
