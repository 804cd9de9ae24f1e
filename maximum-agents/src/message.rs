//! Message types for agent-model communication.
//!
//! This module defines the message format exchanged with language models,
//! following the chat completion API conventions. Message content is either a
//! single text payload or an ordered list of [`ContentBlock`]s; only blocks can
//! carry a [`CacheControl`] marker, which is what the cache annotation pass in
//! [`crate::model::cache`] rewrites.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;

use crate::usage::TokenUsage;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message providing instructions.
    System,
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
    /// Tool call message.
    #[serde(rename = "tool-call")]
    ToolCall,
    /// Tool response message.
    #[serde(rename = "tool-response")]
    ToolResponse,
}

impl MessageRole {
    /// Get the string representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::ToolCall => "tool-call",
            Self::ToolResponse => "tool-response",
        }
    }
}

/// Marks a content block as eligible for transport-level prompt caching.
///
/// Serializes as `{"type": "ephemeral"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheControl {
    /// Short-lived cache entry.
    Ephemeral,
}

/// Image URL structure with detail level for vision APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrlDetail {
    /// The URL of the image (can be http(s) URL or data URL).
    pub url: String,
    /// Detail level for image processing: "low", "high", or "auto".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The payload of a content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentKind {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Image URL content.
    ImageUrl {
        /// The image URL details.
        image_url: ImageUrlDetail,
    },
    /// Image content (base64 encoded).
    Image {
        /// The image data (base64 encoded).
        image: String,
        /// Optional format hint (e.g., "png", "jpeg").
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
}

/// One fragment of structured message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// What the block carries.
    #[serde(flatten)]
    pub kind: ContentKind,
    /// Cache marker, if the block is cache-eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl ContentBlock {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Text { text: text.into() },
            cache_control: None,
        }
    }

    /// Create an image URL block.
    #[must_use]
    pub fn image_url(url: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::ImageUrl {
                image_url: ImageUrlDetail {
                    url: url.into(),
                    detail: None,
                },
            },
            cache_control: None,
        }
    }

    /// Create a base64 image block.
    #[must_use]
    pub fn image(image: impl Into<String>, format: Option<String>) -> Self {
        Self {
            kind: ContentKind::Image {
                image: image.into(),
                format,
            },
            cache_control: None,
        }
    }

    /// Mark the block as cache-eligible.
    #[must_use]
    pub const fn cached(mut self) -> Self {
        self.cache_control = Some(CacheControl::Ephemeral);
        self
    }

    /// Get the text if this is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            ContentKind::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Check whether the block carries a cache marker.
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        self.cache_control.is_some()
    }
}

/// Content of a message: a single text payload or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// A single text payload.
    Text(String),
    /// Ordered content blocks, oldest first.
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Concatenate the text of this content, joining blocks with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Number of content fragments (a text payload counts as one).
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        match self {
            Self::Text(_) => 1,
            Self::Blocks(blocks) => blocks.len(),
        }
    }
}

/// Function call information in a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    /// Name of the function to call.
    pub name: String,
    /// Arguments to pass to the function (as JSON string or object).
    pub arguments: Value,
}

/// A tool call made by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageToolCall {
    /// Unique identifier for the tool call.
    pub id: String,
    /// Type of the tool call (usually "function").
    #[serde(rename = "type")]
    pub call_type: String,
    /// The function to call.
    pub function: ToolCallFunction,
}

impl ChatMessageToolCall {
    /// Create a new tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: ToolCallFunction {
                name: name.into(),
                arguments,
            },
        }
    }

    /// Get the name of the function being called.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Parse arguments as a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments do not deserialize into `T`.
    pub fn parse_arguments<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        match &self.function.arguments {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        }
    }
}

/// A chat message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: MessageRole,
    /// Content of the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    /// Tool calls made by the model (for assistant messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatMessageToolCall>>,
    /// Tool call ID (for tool response messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    const fn with_text(role: MessageRole, text: String) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(text)),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_text(MessageRole::System, content.into())
    }

    /// Create a new user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_text(MessageRole::User, content.into())
    }

    /// Create a new assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_text(MessageRole::Assistant, content.into())
    }

    /// Create a new assistant message with tool calls.
    #[must_use]
    pub const fn assistant_with_tool_calls(tool_calls: Vec<ChatMessageToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Create a new tool response message.
    #[must_use]
    pub fn tool_response(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_text(MessageRole::ToolResponse, content.into())
        }
    }

    /// Create a new message with structured content blocks.
    #[must_use]
    pub const fn with_blocks(role: MessageRole, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Blocks(blocks)),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Get the text content of the message.
    #[must_use]
    pub fn text_content(&self) -> Option<String> {
        self.content.as_ref().map(MessageContent::text)
    }

    /// Number of blocks in this message that carry a cache marker.
    #[must_use]
    pub fn cached_block_count(&self) -> usize {
        match &self.content {
            Some(MessageContent::Blocks(blocks)) => {
                blocks.iter().filter(|b| b.is_cached()).count()
            }
            _ => 0,
        }
    }

    /// Check if this message has tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .is_some_and(|calls| !calls.is_empty())
    }

    /// Render the message as markdown.
    #[must_use]
    pub fn render_as_markdown(&self) -> String {
        let mut result = self.text_content().unwrap_or_default();

        if let Some(tool_calls) = &self.tool_calls {
            for call in tool_calls {
                let _ = write!(
                    result,
                    "\n[Tool Call: {} with args: {}]",
                    call.function.name, call.function.arguments
                );
            }
        }

        result
    }
}

/// Streaming delta for incremental message updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageStreamDelta {
    /// Incremental content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Token usage information (usually only in the final delta).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl ChatMessageStreamDelta {
    /// Create a delta carrying text.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            token_usage: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    mod content_block {
        use super::*;

        #[test]
        fn text_block_serializes_flat() {
            let value = serde_json::to_value(ContentBlock::text("hi")).unwrap();
            assert_eq!(value, json!({"type": "text", "text": "hi"}));
        }

        #[test]
        fn cached_block_carries_ephemeral_marker() {
            let value = serde_json::to_value(ContentBlock::text("hi").cached()).unwrap();
            assert_eq!(
                value,
                json!({"type": "text", "text": "hi", "cache_control": {"type": "ephemeral"}})
            );
        }

        #[test]
        fn image_url_block_deserializes() {
            let block: ContentBlock = serde_json::from_value(json!({
                "type": "image_url",
                "image_url": {"url": "https://example.com/a.png"}
            }))
            .unwrap();
            assert!(block.as_text().is_none());
            assert!(!block.is_cached());
        }
    }

    mod message_content {
        use super::*;

        #[test]
        fn untagged_text_and_blocks() {
            let text: MessageContent = serde_json::from_value(json!("plain")).unwrap();
            assert_eq!(text, MessageContent::Text("plain".into()));

            let blocks: MessageContent =
                serde_json::from_value(json!([{"type": "text", "text": "a"}])).unwrap();
            assert_eq!(blocks.fragment_count(), 1);
        }

        #[test]
        fn text_joins_text_blocks_only() {
            let content = MessageContent::Blocks(vec![
                ContentBlock::text("one"),
                ContentBlock::image_url("https://example.com/x.png"),
                ContentBlock::text("two"),
            ]);
            assert_eq!(content.text(), "one\ntwo");
            assert_eq!(content.fragment_count(), 3);
        }
    }

    mod chat_message {
        use super::*;

        #[test]
        fn constructors_set_role() {
            assert_eq!(ChatMessage::system("s").role, MessageRole::System);
            assert_eq!(ChatMessage::user("u").role, MessageRole::User);
            assert_eq!(ChatMessage::assistant("a").role, MessageRole::Assistant);
            let tool = ChatMessage::tool_response("call_1", "ok");
            assert_eq!(tool.role, MessageRole::ToolResponse);
            assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
        }

        #[test]
        fn role_serializes_with_dashes() {
            let json = serde_json::to_value(ChatMessage::tool_response("id", "x")).unwrap();
            assert_eq!(json["role"], "tool-response");
        }

        #[test]
        fn cached_block_count() {
            let msg = ChatMessage::with_blocks(
                MessageRole::User,
                vec![ContentBlock::text("a").cached(), ContentBlock::text("b")],
            );
            assert_eq!(msg.cached_block_count(), 1);
            assert_eq!(ChatMessage::user("x").cached_block_count(), 0);
        }

        #[test]
        fn render_as_markdown_lists_tool_calls() {
            let msg = ChatMessage::assistant_with_tool_calls(vec![ChatMessageToolCall::new(
                "1",
                "python_interpreter",
                json!({"code": "print(1)"}),
            )]);
            assert!(msg.render_as_markdown().contains("python_interpreter"));
        }

        #[test]
        fn parse_string_arguments() {
            #[derive(Deserialize)]
            struct Args {
                code: String,
            }
            let call = ChatMessageToolCall::new("1", "run", json!("{\"code\":\"x=1\"}"));
            let args: Args = call.parse_arguments().unwrap();
            assert_eq!(args.code, "x=1");
        }
    }
}
