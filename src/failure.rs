//! Upstream failure classification.
//!
//! Only failures attributable to the chosen channel's own health should undo
//! stickiness, and of those only rate limiting does: a throttled channel will
//! keep throttling the same conversation, whereas a one-off 5xx usually will
//! not.
//!
//! ```rust
//! use channel_affinity::failure::UpstreamFailure;
//!
//! assert!(UpstreamFailure::from_http_status(429).invalidates_affinity());
//! assert!(!UpstreamFailure::from_http_status(500).invalidates_affinity());
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamFailure {
    /// Provider-side request rate limit.
    RateLimited,
    /// Account quota or billing limit.
    QuotaExhausted,
    Overloaded,
    ServerError,
    Timeout,
    /// Errors caused by the request itself (bad input, auth, not found).
    Client,
    Other,
}

impl UpstreamFailure {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::Overloaded => "overloaded",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::Client => "client",
            Self::Other => "other",
        }
    }

    /// Whether this failure should clear the conversation's affinity entry.
    #[inline]
    pub fn invalidates_affinity(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    pub fn from_http_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            400 | 401 | 403 | 404 | 409 | 413 | 422 => Self::Client,
            408 | 504 => Self::Timeout,
            503 | 529 => Self::Overloaded,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }

    /// Maps provider error type strings (OpenAI `error.code`, Anthropic
    /// `error.type`, ...) to a failure class.
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "rate_limited" | "rate_limit_exceeded" | "rate_limit_error" | "RESOURCE_EXHAUSTED"
            | "ThrottlingException" => Self::RateLimited,
            "quota_exhausted" | "insufficient_quota" | "billing_hard_limit_reached" => {
                Self::QuotaExhausted
            }
            "overloaded" | "overloaded_error" | "UNAVAILABLE" => Self::Overloaded,
            "server_error" | "api_error" | "INTERNAL" => Self::ServerError,
            "timeout" | "DEADLINE_EXCEEDED" => Self::Timeout,
            "invalid_request" | "invalid_request_error" | "authentication_error"
            | "invalid_api_key" | "permission_error" | "not_found_error" | "model_not_found"
            | "context_length_exceeded" => Self::Client,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
