//! Affinity cache key and stored record.

use crate::fingerprint::{model_hash_prefix, Fingerprint};
use std::fmt;
use std::str::FromStr;

const KEY_NAMESPACE: &str = "affinity";

/// Address of one affinity entry: `affinity:<group>:<model-hash>:<fingerprint>`.
///
/// The model name is hashed, never stored raw, so arbitrary model ids cannot
/// blow up the key length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffinityKey {
    pub group: String,
    pub model_hash: String,
    pub fingerprint: Fingerprint,
}

impl AffinityKey {
    pub fn new(group: impl Into<String>, model: &str, fingerprint: &Fingerprint) -> Self {
        Self {
            group: group.into(),
            model_hash: model_hash_prefix(model),
            fingerprint: fingerprint.clone(),
        }
    }

    pub fn to_cache_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            KEY_NAMESPACE, self.group, self.model_hash, self.fingerprint
        )
    }
}

impl fmt::Display for AffinityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cache_key())
    }
}

/// Sticky channel assignment: `"<channel>"` or `"<channel>:<sub-key>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AffinityRecord {
    pub channel_id: u32,
    pub sub_key_index: Option<u32>,
}

impl AffinityRecord {
    pub fn new(channel_id: u32) -> Self {
        Self {
            channel_id,
            sub_key_index: None,
        }
    }

    pub fn with_sub_key(mut self, index: u32) -> Self {
        self.sub_key_index = Some(index);
        self
    }

    /// Sub-key index in the wire convention, `-1` when absent.
    pub fn sub_key_or_negative(&self) -> i64 {
        self.sub_key_index.map(i64::from).unwrap_or(-1)
    }
}

impl fmt::Display for AffinityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub_key_index {
            Some(idx) => write!(f, "{}:{}", self.channel_id, idx),
            None => write!(f, "{}", self.channel_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRecordError(String);

impl fmt::Display for ParseRecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed affinity record: {:?}", self.0)
    }
}

impl std::error::Error for ParseRecordError {}

impl FromStr for AffinityRecord {
    type Err = ParseRecordError;

    /// The channel id must be a positive integer. A sub-key part that does not
    /// parse as a non-negative integer (including the legacy `-1`) is read as
    /// "no sub-key" rather than rejecting the whole record.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let channel_id = parts
            .next()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| ParseRecordError(s.to_string()))?;
        let sub_key_index = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
        Ok(Self {
            channel_id,
            sub_key_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint::from_hex("d41d8cd98f00b204e9800998ecf8427e").unwrap()
    }

    #[test]
    fn test_key_layout() {
        let key = AffinityKey::new("default", "gpt-x", &fp());
        let rendered = key.to_cache_key();
        let parts: Vec<&str> = rendered.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "affinity");
        assert_eq!(parts[1], "default");
        assert_eq!(parts[2].len(), 16);
        assert_eq!(parts[3], fp().as_str());
        assert!(!rendered.contains("gpt-x"));
    }

    #[test]
    fn test_keys_partition_by_group_and_model() {
        let a = AffinityKey::new("default", "gpt-x", &fp()).to_cache_key();
        let b = AffinityKey::new("vip", "gpt-x", &fp()).to_cache_key();
        let c = AffinityKey::new("default", "gpt-y", &fp()).to_cache_key();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_record_format() {
        assert_eq!(AffinityRecord::new(42).to_string(), "42");
        assert_eq!(AffinityRecord::new(42).with_sub_key(3).to_string(), "42:3");
        assert_eq!(AffinityRecord::new(42).sub_key_or_negative(), -1);
    }

    #[test]
    fn test_record_parse() {
        assert_eq!("42".parse::<AffinityRecord>(), Ok(AffinityRecord::new(42)));
        assert_eq!("42:0".parse::<AffinityRecord>(), Ok(AffinityRecord::new(42).with_sub_key(0)));
        assert_eq!("42:-1".parse::<AffinityRecord>(), Ok(AffinityRecord::new(42)));
        assert_eq!("42:x".parse::<AffinityRecord>(), Ok(AffinityRecord::new(42)));
    }

    #[test]
    fn test_record_parse_malformed() {
        for raw in ["", "abc", "0", "-5", ":3", "4 2"] {
            assert!(raw.parse::<AffinityRecord>().is_err(), "{:?}", raw);
        }
    }
}
