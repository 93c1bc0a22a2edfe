//! Request-scoped affinity bookkeeping.
//!
//! One [`RequestState`] lives for the duration of a single client request. The
//! resolver fills it in before channel selection, the dispatch pipeline records
//! which channel it actually used, and the feedback hooks read it once the
//! upstream call is over. It is never persisted.

use crate::fingerprint::Fingerprint;
use crate::types::Channel;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Group placeholder meaning "let the gateway pick a group".
pub const AUTO_GROUP: &str = "auto";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestState {
    /// Group the token is using; may be [`AUTO_GROUP`].
    pub using_group: String,
    /// Concrete group picked when `using_group` is [`AUTO_GROUP`].
    pub auto_group: Option<String>,
    /// Model name as requested by the client, before any mapping.
    pub original_model: String,
    pub fingerprint: Option<Fingerprint>,
    pub affinity_applied: bool,
    /// Channel chosen at dispatch time.
    pub dispatched_channel_id: Option<u32>,
    /// Key index within the dispatched channel, set only for multi-key channels.
    pub multi_key_index: Option<u32>,
}

impl RequestState {
    pub fn new(using_group: impl Into<String>, original_model: impl Into<String>) -> Self {
        Self {
            using_group: using_group.into(),
            original_model: original_model.into(),
            ..Default::default()
        }
    }

    pub fn with_auto_group(mut self, group: impl Into<String>) -> Self {
        self.auto_group = Some(group.into());
        self
    }

    /// The concrete routing group, or `None` while it is still the `auto`
    /// placeholder (or empty). Affinity is skipped when this is `None`.
    pub fn resolved_group(&self) -> Option<&str> {
        let group = if self.using_group == AUTO_GROUP {
            self.auto_group.as_deref().unwrap_or("")
        } else {
            self.using_group.as_str()
        };
        if group.is_empty() || group == AUTO_GROUP {
            None
        } else {
            Some(group)
        }
    }

    pub fn model(&self) -> Option<&str> {
        if self.original_model.is_empty() {
            None
        } else {
            Some(&self.original_model)
        }
    }

    /// Record the channel the pipeline dispatched to. The key index is only
    /// kept when the channel actually has several keys.
    pub fn record_dispatch(&mut self, channel: &Channel, key_index: Option<u32>) {
        if channel.id == 0 {
            return;
        }
        self.dispatched_channel_id = Some(channel.id);
        self.multi_key_index = if channel.is_multi_key() {
            key_index
        } else {
            None
        };
    }

    /// Populated only when affinity was applied to this request.
    pub fn summary(&self) -> Option<AffinitySummary> {
        if !self.affinity_applied {
            return None;
        }
        let fp = self.fingerprint.as_ref()?;
        Some(AffinitySummary {
            hit: true,
            hash_hint: fp.hash_hint().to_string(),
        })
    }

    /// Adds a `channel_affinity` entry to admin/debug response metadata when
    /// affinity was applied; leaves `admin_info` untouched otherwise.
    pub fn append_admin_info(&self, admin_info: &mut Map<String, Value>) {
        if let Some(summary) = self.summary() {
            admin_info.insert(
                "channel_affinity".to_string(),
                serde_json::json!({
                    "reason": "session_affinity",
                    "hit": summary.hit,
                    "hash_hint": summary.hash_hint,
                }),
            );
        }
    }
}

/// Read-only view for admin/debug metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinitySummary {
    pub hit: bool,
    pub hash_hint: String,
}
