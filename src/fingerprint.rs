//! Conversation fingerprinting.
//!
//! A fingerprint identifies the *leading* turns of a conversation: the first
//! `min_rounds` turns, each truncated to `max_chars_per_turn` characters, are
//! rendered as `role:text|` and digested with MD5. Later turns never affect the
//! result, so a growing conversation keeps the same identity.

use crate::config::AffinityConfig;
use crate::types::Turn;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded 128-bit digest of a conversation prefix. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing hex digest. Returns `None` for the empty string, which
    /// stands for "no fingerprint".
    pub fn from_hex(hex: impl Into<String>) -> Option<Self> {
        let hex = hex.into();
        if hex.is_empty() {
            None
        } else {
            Some(Self(hex))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex characters, for debug/admin metadata.
    pub fn hash_hint(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(hex: String) -> Result<Self> {
        Self::from_hex(hex).ok_or_else(|| {
            Error::validation_with_context(
                "fingerprint must not be empty",
                ErrorContext::new().with_source("fingerprint"),
            )
        })
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprinter {
    min_rounds: usize,
    max_chars_per_turn: usize,
}

impl Fingerprinter {
    pub fn new(min_rounds: usize, max_chars_per_turn: usize) -> Self {
        Self {
            min_rounds: min_rounds.max(1),
            max_chars_per_turn,
        }
    }

    pub fn from_config(config: &AffinityConfig) -> Self {
        Self::new(config.min_rounds, config.max_chars_per_turn)
    }

    pub fn min_rounds(&self) -> usize {
        self.min_rounds
    }

    /// `None` when the conversation is shorter than `min_rounds`.
    pub fn fingerprint(&self, turns: &[Turn]) -> Option<Fingerprint> {
        if turns.len() < self.min_rounds {
            return None;
        }
        let mut buf = String::new();
        for turn in &turns[..self.min_rounds] {
            buf.push_str(&turn.role);
            buf.push(':');
            buf.push_str(truncate_chars(&turn.text, self.max_chars_per_turn));
            buf.push('|');
        }
        Some(Fingerprint(format!("{:x}", md5::compute(buf.as_bytes()))))
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::from_config(&AffinityConfig::default())
    }
}

/// Longest prefix of `s` holding at most `max` characters, cut on a char
/// boundary.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Hex of the first 8 bytes of MD5(model). Bounds key length; not a security
/// boundary.
pub fn model_hash_prefix(model: &str) -> String {
    let mut hex = format!("{:x}", md5::compute(model.as_bytes()));
    hex.truncate(16);
    hex
}
