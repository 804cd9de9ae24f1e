//! OpenAI-compatible chat completions transport.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{api_key_from_env, send_json, usage_count};
use crate::error::{LlmError, Result};
use crate::message::{ChatMessage, ContentBlock, ContentKind, MessageContent, MessageRole};
use crate::model::{GenerateOptions, Model, ModelResponse};
use crate::usage::TokenUsage;

/// Default OpenAI API base URL.
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "openai";

/// OpenAI-compatible model.
#[derive(Clone)]
pub struct OpenAiModel {
    model_id: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiModel")
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl OpenAiModel {
    /// Create a new model with explicit API key.
    #[must_use]
    pub fn new(model_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key: api_key.into(),
            base_url: OPENAI_API_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a model reading `OPENAI_API_KEY` (and optionally
    /// `OPENAI_BASE_URL`) from the environment.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if the API key is not set.
    pub fn from_env(model_id: impl Into<String>) -> Result<Self> {
        let model = Self::new(model_id, api_key_from_env("OPENAI_API_KEY", PROVIDER)?);
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) => model.with_base_url(url),
            Err(_) => model,
        })
    }

    /// Set custom base URL (for Azure, local models, etc.).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn convert_block(block: &ContentBlock) -> Value {
        match &block.kind {
            ContentKind::Text { text } => json!({"type": "text", "text": text}),
            ContentKind::ImageUrl { image_url } => json!({
                "type": "image_url",
                "image_url": {
                    "url": image_url.url,
                    "detail": image_url.detail.as_deref().unwrap_or("auto")
                }
            }),
            ContentKind::Image { image, format } => json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/{};base64,{image}", format.as_deref().unwrap_or("jpeg"))
                }
            }),
        }
    }

    fn convert_messages(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant | MessageRole::ToolCall => "assistant",
                    MessageRole::ToolResponse => "tool",
                };

                let mut obj = json!({ "role": role });

                match &msg.content {
                    Some(MessageContent::Text(text)) => obj["content"] = json!(text),
                    Some(MessageContent::Blocks(blocks)) => {
                        obj["content"] = Value::Array(blocks.iter().map(Self::convert_block).collect());
                    }
                    None => {}
                }
                if let Some(tool_calls) = &msg.tool_calls {
                    obj["tool_calls"] = serde_json::to_value(tool_calls).unwrap_or_default();
                }
                if let Some(tool_call_id) = &msg.tool_call_id {
                    obj["tool_call_id"] = json!(tool_call_id);
                }

                obj
            })
            .collect()
    }

    /// Build the request body for the API.
    pub(crate) fn build_request_body(
        &self,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Value {
        let mut body = json!({
            "model": self.model_id,
            "messages": Self::convert_messages(messages),
        });

        if let Some(temp) = options.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max) = options.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if let Some(stop) = &options.stop_sequences
            && !stop.is_empty()
            && self.supports_stop_parameter()
        {
            body["stop"] = json!(stop);
        }
        if let Some(tools) = &options.tools
            && !tools.is_empty()
        {
            let tool_defs: Vec<_> = tools.iter().map(|t| t.to_openai_format()).collect();
            body["tools"] = json!(tool_defs);
        }
        if let Some(grammar) = &options.grammar {
            body["response_format"] = grammar.clone();
        }

        body
    }

    /// Parse the API response into a `ModelResponse`.
    pub(crate) fn parse_response(json: Value) -> Result<ModelResponse> {
        let choice = json["choices"]
            .get(0)
            .ok_or_else(|| LlmError::response_format("choices", "none").with_provider(PROVIDER))?;

        let message_json = &choice["message"];
        let content = message_json["content"].as_str().map(String::from);
        let tool_calls = if message_json["tool_calls"].is_array() {
            Some(serde_json::from_value(message_json["tool_calls"].clone())?)
        } else {
            None
        };

        let message = ChatMessage {
            role: MessageRole::Assistant,
            content: content.map(MessageContent::Text),
            tool_calls,
            tool_call_id: None,
        };

        let token_usage = json.get("usage").map(|usage| {
            TokenUsage::new(
                usage_count(usage, "prompt_tokens"),
                usage_count(usage, "completion_tokens"),
            )
            .with_cache(0, usage_count(&usage["prompt_tokens_details"], "cached_tokens"))
        });

        let response = ModelResponse::new(message);
        Ok(match token_usage {
            Some(usage) => response.with_token_usage(usage),
            None => response,
        }
        .with_raw(json))
    }
}

#[async_trait]
impl Model for OpenAiModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn supports_stop_parameter(&self) -> bool {
        // o3, o4 and gpt-5 reject `stop`
        let model = self.model_id.as_str();
        !model.starts_with("o3") && !model.starts_with("o4") && !model.starts_with("gpt-5")
    }

    #[instrument(skip(self, messages, options), fields(model = %self.model_id))]
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerateOptions,
    ) -> Result<ModelResponse> {
        let body = self.build_request_body(&messages, &options);

        debug!("Sending request to OpenAI API");

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let json = send_json(request, PROVIDER).await?;
        Self::parse_response(json)
    }
}
