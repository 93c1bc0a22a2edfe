//! Conversation extraction: one function per provider wire format, all
//! producing the same `Vec<Turn>` shape so the fingerprint does not depend on
//! which API the client spoke.

use crate::types::{ClaudeMessage, GeminiContent, OpenAiMessage, Turn};
use crate::{Error, ErrorContext, Result};
use serde_json::Value;

pub fn openai_turns(messages: &[OpenAiMessage]) -> Vec<Turn> {
    messages
        .iter()
        .map(|m| Turn::new(m.role.clone(), m.string_content()))
        .collect()
}

pub fn anthropic_turns(messages: &[ClaudeMessage]) -> Vec<Turn> {
    messages
        .iter()
        .map(|m| Turn::new(m.role.clone(), m.string_content()))
        .collect()
}

pub fn gemini_turns(contents: &[GeminiContent]) -> Vec<Turn> {
    contents
        .iter()
        .map(|c| Turn::new(c.role.clone(), c.first_text()))
        .collect()
}

/// Wire format a request body was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFormat {
    OpenAi,
    Anthropic,
    Gemini,
}

impl RequestFormat {
    /// Guess the wire format from the body shape: Gemini uses `contents`,
    /// Anthropic carries a top-level `system` or `anthropic_version` next to
    /// `messages`, anything else with `messages` is treated as OpenAI.
    pub fn detect(body: &Value) -> Option<Self> {
        if body.get("contents").map(Value::is_array).unwrap_or(false) {
            return Some(Self::Gemini);
        }
        if !body.get("messages").map(Value::is_array).unwrap_or(false) {
            return None;
        }
        if body.get("system").is_some() || body.get("anthropic_version").is_some() {
            Some(Self::Anthropic)
        } else {
            Some(Self::OpenAi)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

/// Extract turns from a raw request body in the given format.
pub fn turns_from_json(format: RequestFormat, body: &Value) -> Result<Vec<Turn>> {
    let field = match format {
        RequestFormat::Gemini => "contents",
        RequestFormat::OpenAi | RequestFormat::Anthropic => "messages",
    };
    let raw = body.get(field).cloned().ok_or_else(|| {
        Error::validation_with_context(
            format!("request body has no `{}` array", field),
            ErrorContext::new()
                .with_field_path(field)
                .with_source(format.as_str()),
        )
    })?;
    let turns = match format {
        RequestFormat::OpenAi => openai_turns(&serde_json::from_value::<Vec<OpenAiMessage>>(raw)?),
        RequestFormat::Anthropic => {
            anthropic_turns(&serde_json::from_value::<Vec<ClaudeMessage>>(raw)?)
        }
        RequestFormat::Gemini => gemini_turns(&serde_json::from_value::<Vec<GeminiContent>>(raw)?),
    };
    Ok(turns)
}
