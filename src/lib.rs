//! # channel-affinity
//!
//! Session affinity routing core for multi-provider LLM gateways.
//!
//! ## Overview
//!
//! A gateway that spreads traffic over many upstream channels loses
//! provider-side prompt caching whenever consecutive turns of one conversation
//! land on different channels. This crate remembers, per conversation, which
//! channel served it last and hints the dispatch pipeline to go there again.
//!
//! Affinity is advisory: every failure mode (cache down, malformed entry,
//! disabled channel) degrades to "no hint" and normal channel selection.
//!
//! ## Request Flow
//!
//! 1. The pipeline extracts [`Turn`]s from the client request ([`extract`]).
//! 2. [`SessionAffinity::resolve_request`] fingerprints the leading turns,
//!    looks the fingerprint up in the shared cache, and validates the stored
//!    channel against the channel directory.
//! 3. The pipeline selects a channel, preferring the hint, and records it with
//!    [`RequestState::record_dispatch`].
//! 4. After the upstream call, [`SessionAffinity::on_success`] persists the
//!    mapping in the background, or [`SessionAffinity::on_upstream_error`]
//!    clears it on rate limiting.
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`fingerprint`] | Conversation fingerprinting |
//! | [`cache`] | Affinity store and cache backends |
//! | [`directory`] | Channel directory seam and validator |
//! | [`resolver`] | Affinity resolution |
//! | [`feedback`] | Success/failure hooks |
//! | [`writer`] | Bounded background writes |
//! | [`state`] | Request-scoped bookkeeping |
//! | [`extract`] | Provider format → turns |
//! | [`failure`] | Upstream failure classification |
//! | [`config`] | Tunables |

pub mod cache;
pub mod config;
pub mod directory;
pub mod extract;
pub mod failure;
pub mod feedback;
pub mod fingerprint;
pub mod resolver;
pub mod service;
pub mod state;
pub mod types;
pub mod writer;

pub use config::AffinityConfig;
pub use failure::UpstreamFailure;
pub use fingerprint::{Fingerprint, Fingerprinter};
pub use resolver::AffinityHint;
pub use service::{AffinityStats, SessionAffinity};
pub use state::{AffinitySummary, RequestState};
pub use types::{Channel, ChannelStatus, Turn};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
