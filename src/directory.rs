//! Channel directory seam and the validator that gates affinity hints on it.

use crate::types::{Channel, ChannelStatus};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Read access to configured channels. Implementations are expected to be
/// cheap (typically backed by an in-process channel cache).
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn lookup_channel(&self, id: u32) -> Result<Option<Channel>>;
}

/// Directory held in memory. Useful for single-node deployments and tests.
#[derive(Default)]
pub struct InMemoryChannelDirectory {
    channels: RwLock<HashMap<u32, Channel>>,
}

impl InMemoryChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        let dir = Self::new();
        for ch in channels {
            dir.upsert(ch);
        }
        dir
    }

    pub fn upsert(&self, channel: Channel) {
        if let Ok(mut map) = self.channels.write() {
            map.insert(channel.id, channel);
        }
    }

    pub fn remove(&self, id: u32) -> Option<Channel> {
        self.channels.write().ok()?.remove(&id)
    }

    /// Returns `false` if the channel does not exist.
    pub fn set_status(&self, id: u32, status: ChannelStatus) -> bool {
        match self.channels.write() {
            Ok(mut map) => match map.get_mut(&id) {
                Some(ch) => {
                    ch.status = status;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ChannelDirectory for InMemoryChannelDirectory {
    async fn lookup_channel(&self, id: u32) -> Result<Option<Channel>> {
        let map = self.channels.read().map_err(|_| {
            Error::directory_with_context(
                "channel map lock poisoned",
                ErrorContext::new().with_source("in_memory_directory"),
            )
        })?;
        Ok(map.get(&id).cloned())
    }
}

/// Pure gate: a remembered channel is usable only if it exists and is enabled.
#[derive(Clone)]
pub struct ChannelValidator {
    directory: Arc<dyn ChannelDirectory>,
}

impl ChannelValidator {
    pub fn new(directory: Arc<dyn ChannelDirectory>) -> Self {
        Self { directory }
    }

    pub async fn validate(&self, channel_id: u32) -> Option<Channel> {
        if channel_id == 0 {
            return None;
        }
        match self.directory.lookup_channel(channel_id).await {
            Ok(Some(channel)) if channel.is_enabled() => Some(channel),
            Ok(Some(channel)) => {
                debug!(channel_id, status = %channel.status, "affinity channel not enabled");
                None
            }
            Ok(None) => {
                debug!(channel_id, "affinity channel no longer exists");
                None
            }
            Err(e) => {
                debug!(channel_id, error = %e, "channel lookup failed");
                None
            }
        }
    }
}
