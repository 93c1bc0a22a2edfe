//! Provider wire shapes for chat history.
//!
//! Only the parts that matter for fingerprinting are modelled: the role and
//! the textual content. Everything else in a request body is ignored on
//! deserialization.

use serde::{Deserialize, Serialize};

/// Message content (can be string or array of content blocks)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text(text.into())
    }

    pub fn blocks(blocks: Vec<ContentBlock>) -> Self {
        MessageContent::Blocks(blocks)
    }

    /// Plain string content, or all text blocks joined in order.
    pub fn joined_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Other => None,
                })
                .collect(),
        }
    }
}

/// Content block. Images, tool calls and the like carry no text and are
/// collapsed into [`ContentBlock::Other`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// OpenAI chat-completions message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    /// `null` for assistant messages that only carry tool calls.
    #[serde(default)]
    pub content: Option<MessageContent>,
}

impl OpenAiMessage {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(MessageContent::text(text)),
        }
    }

    pub fn string_content(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::joined_text)
            .unwrap_or_default()
    }
}

/// Anthropic messages-API message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ClaudeMessage {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: MessageContent::text(text),
        }
    }

    pub fn string_content(&self) -> String {
        self.content.joined_text()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Gemini `contents[]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![GeminiPart {
                text: Some(text.into()),
            }],
        }
    }

    /// First non-empty text part; other parts are ignored.
    pub fn first_text(&self) -> &str {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .find(|t| !t.is_empty())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_block_content_joined() {
        let msg: OpenAiMessage = serde_json::from_value(serde_json::json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "look at "},
                {"type": "image_url", "image_url": {"url": "https://x/y.png"}},
                {"type": "text", "text": "this"}
            ]
        }))
        .unwrap();
        assert_eq!(msg.string_content(), "look at this");
    }

    #[test]
    fn test_openai_null_content() {
        let msg: OpenAiMessage = serde_json::from_value(serde_json::json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{"id": "call_1"}]
        }))
        .unwrap();
        assert_eq!(msg.string_content(), "");
    }

    #[test]
    fn test_claude_tool_result_has_no_text() {
        let msg: ClaudeMessage = serde_json::from_value(serde_json::json!({
            "role": "user",
            "content": [{"type": "tool_result", "tool_use_id": "t1", "content": "42"}]
        }))
        .unwrap();
        assert_eq!(msg.string_content(), "");
    }

    #[test]
    fn test_gemini_first_non_empty_part() {
        let content: GeminiContent = serde_json::from_value(serde_json::json!({
            "role": "model",
            "parts": [{"text": ""}, {"inlineData": {"mimeType": "image/png"}}, {"text": "second"}, {"text": "third"}]
        }))
        .unwrap();
        assert_eq!(content.first_text(), "second");
    }
}
