//! Backend channel as exposed by the channel directory.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Administrative status of a channel.
///
/// Numeric codes match the ones stored by the channel directory
/// (`1` enabled, `2` manually disabled, `3` auto disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Enabled,
    ManuallyDisabled,
    AutoDisabled,
}

impl ChannelStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::Enabled => 1,
            Self::ManuallyDisabled => 2,
            Self::AutoDisabled => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Enabled),
            2 => Some(Self::ManuallyDisabled),
            3 => Some(Self::AutoDisabled),
            _ => None,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Enabled => "enabled",
            Self::ManuallyDisabled => "manually_disabled",
            Self::AutoDisabled => "auto_disabled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: u32,
    pub name: String,
    pub status: ChannelStatus,
    /// Number of upstream keys the channel rotates through. More than one
    /// makes the sub-key index meaningful.
    #[serde(default = "default_key_count")]
    pub key_count: u32,
}

fn default_key_count() -> u32 {
    1
}

impl Channel {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: ChannelStatus::Enabled,
            key_count: 1,
        }
    }

    pub fn with_status(mut self, status: ChannelStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_key_count(mut self, n: u32) -> Self {
        self.key_count = n.max(1);
        self
    }

    pub fn is_multi_key(&self) -> bool {
        self.key_count > 1
    }

    pub fn is_enabled(&self) -> bool {
        self.status.is_enabled()
    }
}
