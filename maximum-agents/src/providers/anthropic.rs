//! Anthropic Messages API transport.
//!
//! Content blocks keep their `cache_control` markers on the wire, including
//! system blocks, so annotated histories are cached by the API.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{api_key_from_env, send_json, usage_count};
use crate::error::Result;
use crate::message::{
    ChatMessage, ChatMessageToolCall, ContentBlock, ContentKind, MessageContent, MessageRole,
};
use crate::model::{GenerateOptions, Model, ModelResponse};
use crate::usage::TokenUsage;

/// Default Anthropic API base URL.
pub const ANTHROPIC_API_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const PROVIDER: &str = "anthropic";

/// Anthropic Claude model.
#[derive(Clone)]
pub struct AnthropicModel {
    model_id: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    /// Default max tokens for generation.
    pub max_tokens: u32,
}

impl std::fmt::Debug for AnthropicModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicModel")
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl AnthropicModel {
    /// Create a new Anthropic model with explicit API key.
    #[must_use]
    pub fn new(model_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            max_tokens: 4096,
        }
    }

    /// Create a model reading `ANTHROPIC_API_KEY` (and optionally
    /// `ANTHROPIC_BASE_URL`) from the environment.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if the API key is not set.
    pub fn from_env(model_id: impl Into<String>) -> Result<Self> {
        let model = Self::new(model_id, api_key_from_env("ANTHROPIC_API_KEY", PROVIDER)?);
        Ok(match std::env::var("ANTHROPIC_BASE_URL") {
            Ok(url) => model.with_base_url(url),
            Err(_) => model,
        })
    }

    /// Set custom base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set max tokens.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn convert_block(block: &ContentBlock) -> Value {
        let mut value = match &block.kind {
            ContentKind::Text { text } => json!({"type": "text", "text": text}),
            ContentKind::ImageUrl { image_url } => json!({
                "type": "image",
                "source": {"type": "url", "url": image_url.url}
            }),
            ContentKind::Image { image, format } => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": format!("image/{}", format.as_deref().unwrap_or("png")),
                    "data": image
                }
            }),
        };
        if let Some(cache) = &block.cache_control {
            value["cache_control"] = json!(cache);
        }
        value
    }

    fn convert_content(content: &MessageContent) -> Value {
        match content {
            MessageContent::Text(text) => json!(text),
            MessageContent::Blocks(blocks) => {
                Value::Array(blocks.iter().map(Self::convert_block).collect())
            }
        }
    }

    fn tool_use_blocks(calls: &[ChatMessageToolCall]) -> Vec<Value> {
        calls
            .iter()
            .map(|tc| {
                json!({
                    "type": "tool_use",
                    "id": tc.id,
                    "name": tc.function.name,
                    "input": tc.function.arguments
                })
            })
            .collect()
    }

    /// Build the request body for the API.
    pub(crate) fn build_request_body(
        &self,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Value {
        let mut system_blocks: Vec<Value> = Vec::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in messages {
            match msg.role {
                MessageRole::System => match &msg.content {
                    Some(MessageContent::Text(text)) => {
                        system_blocks.push(json!({"type": "text", "text": text}));
                    }
                    Some(MessageContent::Blocks(blocks)) => {
                        system_blocks.extend(blocks.iter().map(Self::convert_block));
                    }
                    None => {}
                },
                MessageRole::User => {
                    if let Some(content) = &msg.content {
                        api_messages.push(json!({
                            "role": "user",
                            "content": Self::convert_content(content)
                        }));
                    }
                }
                MessageRole::Assistant | MessageRole::ToolCall => {
                    let mut content = match &msg.content {
                        Some(MessageContent::Blocks(blocks)) => {
                            blocks.iter().map(Self::convert_block).collect()
                        }
                        Some(MessageContent::Text(text)) => vec![json!({"type": "text", "text": text})],
                        None => Vec::new(),
                    };
                    if let Some(calls) = &msg.tool_calls {
                        content.extend(Self::tool_use_blocks(calls));
                    }
                    if !content.is_empty() {
                        api_messages.push(json!({"role": "assistant", "content": content}));
                    }
                }
                MessageRole::ToolResponse => {
                    if let Some(content) = &msg.content {
                        api_messages.push(json!({
                            "role": "user",
                            "content": [{
                                "type": "tool_result",
                                "tool_use_id": msg.tool_call_id.as_deref().unwrap_or(""),
                                "content": Self::convert_content(content)
                            }]
                        }));
                    }
                }
            }
        }

        let mut body = json!({
            "model": self.model_id,
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
            "messages": api_messages
        });

        if !system_blocks.is_empty() {
            body["system"] = Value::Array(system_blocks);
        }
        if let Some(temp) = options.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(stop) = &options.stop_sequences
            && !stop.is_empty()
        {
            body["stop_sequences"] = json!(stop);
        }
        if let Some(tools) = &options.tools
            && !tools.is_empty()
        {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters
                    })
                })
                .collect();
            body["tools"] = json!(tool_defs);
        }
        if options.grammar.is_some() {
            debug!(model = %self.model_id, "Grammar is not supported by the Messages API, ignoring");
        }

        body
    }

    /// Parse the API response into a `ModelResponse`.
    pub(crate) fn parse_response(json: Value) -> ModelResponse {
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        if let Some(blocks) = json["content"].as_array() {
            for block in blocks {
                match block["type"].as_str() {
                    Some("text") => {
                        if let Some(text) = block["text"].as_str() {
                            if !text_content.is_empty() {
                                text_content.push('\n');
                            }
                            text_content.push_str(text);
                        }
                    }
                    Some("tool_use") => {
                        let id = block["id"].as_str().unwrap_or_default();
                        let name = block["name"].as_str().unwrap_or_default();
                        tool_calls.push(ChatMessageToolCall::new(id, name, block["input"].clone()));
                    }
                    _ => {}
                }
            }
        }

        let message = ChatMessage {
            role: MessageRole::Assistant,
            content: (!text_content.is_empty()).then(|| MessageContent::Text(text_content)),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        };

        let token_usage = json.get("usage").map(|usage| {
            TokenUsage::new(
                usage_count(usage, "input_tokens"),
                usage_count(usage, "output_tokens"),
            )
            .with_cache(
                usage_count(usage, "cache_creation_input_tokens"),
                usage_count(usage, "cache_read_input_tokens"),
            )
        });

        let response = ModelResponse::new(message);
        match token_usage {
            Some(usage) => response.with_token_usage(usage),
            None => response,
        }
        .with_raw(json)
    }
}

#[async_trait]
impl Model for AnthropicModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip(self, messages, options), fields(model = %self.model_id))]
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerateOptions,
    ) -> Result<ModelResponse> {
        let body = self.build_request_body(&messages, &options);

        debug!("Sending request to Anthropic API");

        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let json = send_json(request, PROVIDER).await?;
        Ok(Self::parse_response(json))
    }
}
