//! # Types Module
//!
//! Core data types shared by the affinity components.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Turn`] | Provider-neutral `(role, text)` pair consumed by the fingerprinter |
//! | [`Channel`] | Backend channel as seen by the validator |
//! | [`ChannelStatus`] | Administrative status of a channel |
//! | [`OpenAiMessage`], [`ClaudeMessage`], [`GeminiContent`] | Provider wire shapes the turns are extracted from |
//!
//! ## Example
//!
//! ```rust
//! use channel_affinity::types::{Channel, ChannelStatus, Turn};
//!
//! let turn = Turn::new("user", "hello");
//! assert_eq!(turn.role, "user");
//!
//! let channel = Channel::new(42, "claude-primary");
//! assert_eq!(channel.status, ChannelStatus::Enabled);
//! ```

pub mod channel;
pub mod message;
pub mod turn;

pub use channel::{Channel, ChannelStatus};
pub use message::{
    ClaudeMessage, ContentBlock, GeminiContent, GeminiPart, MessageContent, OpenAiMessage,
};
pub use turn::Turn;
