//! Wiring of resolver and feedback hooks around one shared store.

use crate::cache::{AffinityStore, CacheBackend, StoreStats};
use crate::config::AffinityConfig;
use crate::directory::{ChannelDirectory, ChannelValidator};
use crate::failure::UpstreamFailure;
use crate::feedback::{AffinityFeedback, FeedbackStats};
use crate::fingerprint::Fingerprinter;
use crate::resolver::{AffinityHint, AffinityResolver, ResolverStats};
use crate::state::RequestState;
use crate::types::Turn;
use std::sync::Arc;

/// Point-in-time view of all affinity counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffinityStats {
    pub resolver: ResolverStats,
    pub store: StoreStats,
    pub feedback: FeedbackStats,
}

/// Entry point for the dispatch pipeline.
///
/// ```rust
/// use channel_affinity::{AffinityConfig, RequestState, SessionAffinity};
/// use channel_affinity::cache::MemoryCache;
/// use channel_affinity::directory::InMemoryChannelDirectory;
/// use channel_affinity::types::{Channel, Turn};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let affinity = SessionAffinity::new(
///     AffinityConfig::default(),
///     Arc::new(MemoryCache::new(10_000)),
///     Arc::new(InMemoryChannelDirectory::with_channels([Channel::new(42, "primary")])),
/// );
/// let turns: Vec<Turn> = (0..6).map(|i| Turn::user(format!("msg {}", i))).collect();
///
/// let mut state = RequestState::new("default", "gpt-x");
/// assert!(affinity.resolve_request(&mut state, &turns).await.is_none());
/// affinity.on_success(&state, Some(42));
/// affinity.flush().await;
///
/// let mut next = RequestState::new("default", "gpt-x");
/// let hint = affinity.resolve_request(&mut next, &turns).await.unwrap();
/// assert_eq!(hint.channel_id, 42);
/// # });
/// ```
pub struct SessionAffinity {
    resolver: AffinityResolver,
    feedback: AffinityFeedback,
}

impl SessionAffinity {
    pub fn new(
        config: AffinityConfig,
        backend: Arc<dyn CacheBackend>,
        directory: Arc<dyn ChannelDirectory>,
    ) -> Self {
        let store = Arc::new(AffinityStore::new(backend, &config));
        let resolver = AffinityResolver::new(
            Fingerprinter::from_config(&config),
            store.clone(),
            ChannelValidator::new(directory),
        );
        let feedback = AffinityFeedback::new(store, config.max_pending_writes);
        Self { resolver, feedback }
    }

    /// Same as [`new`](Self::new) with the process-wide configuration.
    pub fn with_global_config(
        backend: Arc<dyn CacheBackend>,
        directory: Arc<dyn ChannelDirectory>,
    ) -> Self {
        Self::new(AffinityConfig::global().clone(), backend, directory)
    }

    pub fn resolver(&self) -> &AffinityResolver {
        &self.resolver
    }

    pub fn feedback(&self) -> &AffinityFeedback {
        &self.feedback
    }

    pub async fn resolve(&self, group: &str, model: &str, turns: &[Turn]) -> Option<AffinityHint> {
        self.resolver.resolve(group, model, turns).await
    }

    pub async fn resolve_request(
        &self,
        state: &mut RequestState,
        turns: &[Turn],
    ) -> Option<AffinityHint> {
        self.resolver.resolve_request(state, turns).await
    }

    pub fn on_success(&self, state: &RequestState, fallback_channel_id: Option<u32>) -> bool {
        self.feedback.on_success(state, fallback_channel_id)
    }

    pub async fn on_failure(&self, state: &mut RequestState) -> bool {
        self.feedback.on_failure(state).await
    }

    pub async fn on_upstream_error(
        &self,
        state: &mut RequestState,
        failure: UpstreamFailure,
    ) -> bool {
        self.feedback.on_upstream_error(state, failure).await
    }

    pub async fn flush(&self) {
        self.feedback.flush().await;
    }

    pub fn stats(&self) -> AffinityStats {
        AffinityStats {
            resolver: self.resolver.stats(),
            store: self.resolver.store().stats(),
            feedback: self.feedback.stats(),
        }
    }
}
