//! Affinity tunables.
//!
//! All values are read once and treated as process-wide constants. Defaults can
//! be overridden through the environment:
//! - `AI_AFFINITY_ENABLED` (`0`/`false` disables, default enabled)
//! - `AI_AFFINITY_TTL_SECS` (default 300; values <= 0 fall back to the default)
//! - `AI_AFFINITY_MIN_ROUNDS` (default 5)
//! - `AI_AFFINITY_MAX_CHARS_PER_TURN` (default 1024)
//! - `AI_AFFINITY_MAX_PENDING_WRITES` (default 256)
//! - `AI_AFFINITY_BACKEND_TIMEOUT_MS` (default 200; deadline per shared-cache call)
//!
//! or loaded from a YAML document with the same field names in snake case.

use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TTL_SECS: u64 = 300;
pub const DEFAULT_MIN_ROUNDS: usize = 5;
pub const DEFAULT_MAX_CHARS_PER_TURN: usize = 1024;
pub const DEFAULT_MAX_PENDING_WRITES: usize = 256;
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffinityConfig {
    pub enabled: bool,
    pub ttl: Duration,
    /// Conversations with fewer turns never get a fingerprint.
    pub min_rounds: usize,
    /// Per-turn cap, in characters, applied before hashing.
    pub max_chars_per_turn: usize,
    /// Upper bound on detached success-path writes in flight.
    pub max_pending_writes: usize,
    /// Deadline for a single call to a network cache backend.
    pub backend_timeout: Duration,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            min_rounds: DEFAULT_MIN_ROUNDS,
            max_chars_per_turn: DEFAULT_MAX_CHARS_PER_TURN,
            max_pending_writes: DEFAULT_MAX_PENDING_WRITES,
            backend_timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
        }
    }
}

/// On-disk shape. TTL is signed so a misconfigured `0` or `-1` can be
/// normalized instead of rejected.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    enabled: Option<bool>,
    ttl_secs: Option<i64>,
    min_rounds: Option<usize>,
    max_chars_per_turn: Option<usize>,
    max_pending_writes: Option<usize>,
    backend_timeout_ms: Option<u64>,
}

static GLOBAL_CONFIG: Lazy<AffinityConfig> = Lazy::new(AffinityConfig::from_env);

impl AffinityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide configuration, read from the environment on first use.
    pub fn global() -> &'static AffinityConfig {
        &GLOBAL_CONFIG
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// TTLs are whole seconds: a fractional part rounds up, zero falls back
    /// to the default.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = if ttl.is_zero() {
            Duration::from_secs(DEFAULT_TTL_SECS)
        } else {
            let secs = ttl.as_secs();
            Duration::from_secs(if ttl.subsec_nanos() > 0 {
                secs.saturating_add(1)
            } else {
                secs
            })
        };
        self
    }

    pub fn with_min_rounds(mut self, n: usize) -> Self {
        self.min_rounds = n.max(1);
        self
    }

    pub fn with_max_chars_per_turn(mut self, n: usize) -> Self {
        self.max_chars_per_turn = n;
        self
    }

    pub fn with_max_pending_writes(mut self, n: usize) -> Self {
        self.max_pending_writes = n.max(1);
        self
    }

    /// A zero timeout falls back to the default.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = if timeout.is_zero() {
            Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS)
        } else {
            timeout
        };
        self
    }

    /// Build a configuration from `AI_AFFINITY_*` environment variables.
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(enabled) = std::env::var("AI_AFFINITY_ENABLED")
            .ok()
            .and_then(|s| parse_bool(&s))
        {
            cfg.enabled = enabled;
        }
        if let Some(secs) = std::env::var("AI_AFFINITY_TTL_SECS")
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
        {
            cfg.ttl = normalize_ttl(secs);
        }
        if let Some(n) = std::env::var("AI_AFFINITY_MIN_ROUNDS")
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
        {
            cfg = cfg.with_min_rounds(n);
        }
        if let Some(n) = std::env::var("AI_AFFINITY_MAX_CHARS_PER_TURN")
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
        {
            cfg.max_chars_per_turn = n;
        }
        if let Some(n) = std::env::var("AI_AFFINITY_MAX_PENDING_WRITES")
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
        {
            cfg = cfg.with_max_pending_writes(n);
        }
        if let Some(ms) = std::env::var("AI_AFFINITY_BACKEND_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            cfg = cfg.with_backend_timeout(Duration::from_millis(ms));
        }
        cfg
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(content)?;
        let mut cfg = Self::default();
        if let Some(enabled) = file.enabled {
            cfg.enabled = enabled;
        }
        if let Some(secs) = file.ttl_secs {
            cfg.ttl = normalize_ttl(secs);
        }
        if let Some(n) = file.min_rounds {
            if n == 0 {
                return Err(Error::configuration_with_context(
                    "min_rounds must be at least 1",
                    ErrorContext::new()
                        .with_field_path("min_rounds")
                        .with_source("affinity_config"),
                ));
            }
            cfg.min_rounds = n;
        }
        if let Some(n) = file.max_chars_per_turn {
            cfg.max_chars_per_turn = n;
        }
        if let Some(n) = file.max_pending_writes {
            cfg = cfg.with_max_pending_writes(n);
        }
        if let Some(ms) = file.backend_timeout_ms {
            cfg = cfg.with_backend_timeout(Duration::from_millis(ms));
        }
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("Failed to read config: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("affinity_config"),
            )
        })?;
        Self::from_yaml_str(&content)
    }
}

fn normalize_ttl(secs: i64) -> Duration {
    if secs <= 0 {
        Duration::from_secs(DEFAULT_TTL_SECS)
    } else {
        Duration::from_secs(secs as u64)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
