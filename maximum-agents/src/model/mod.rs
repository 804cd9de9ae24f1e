//! Model trait and the resilient invoker layers built on it.
//!
//! A [`Model`] is a single chat-completion call. The invoker used by a run is
//! a stack of layers over a base transport:
//!
//! - [`RetryingModel`] retries transient transport failures with exponential
//!   backoff.
//! - [`CachingModel`] marks the most recent message content as cache-eligible
//!   before delegating to a [`RetryingModel`].
//!
//! [`select`] decides which stack backs a given model name.

pub mod cache;
pub mod retry;
pub mod select;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LlmError, Result};
use crate::message::ChatMessage;
use crate::tool::ToolDefinition;
use crate::usage::TokenUsage;

pub use cache::{CachePolicy, CachingModel, annotate_cache};
pub use retry::{RetryPolicy, RetryingModel, Sleeper};
pub use select::{DefaultSelector, ModelFactory, ProviderFactory, default_selector};

/// Shared, thread-safe model handle.
pub type SharedModel = Arc<dyn Model>;

/// Response from a model generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated message.
    pub message: ChatMessage,
    /// Token usage information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Raw response from the API.
    #[serde(skip)]
    pub raw: Option<Value>,
}

impl ModelResponse {
    /// Create a new model response.
    #[must_use]
    pub const fn new(message: ChatMessage) -> Self {
        Self {
            message,
            token_usage: None,
            raw: None,
        }
    }

    /// Set token usage.
    #[must_use]
    pub const fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    /// Set raw response.
    #[must_use]
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Get the text content of the response.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.message.text_content()
    }
}

/// Options for model generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Stop sequences to end generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Grammar constraining the output, passed through to the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grammar: Option<Value>,
    /// Available tools for function calling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Temperature for sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    /// Create new generate options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set stop sequences.
    #[must_use]
    pub fn with_stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.stop_sequences = Some(sequences);
        self
    }

    /// Set grammar.
    #[must_use]
    pub fn with_grammar(mut self, grammar: Value) -> Self {
        self.grammar = Some(grammar);
        self
    }

    /// Set tools.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Set max tokens.
    #[must_use]
    pub const fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }
}

/// The core trait for language model implementations.
#[async_trait]
pub trait Model: Send + Sync {
    /// Get the model identifier.
    fn model_id(&self) -> &str;

    /// Name of the provider serving the model, for errors and logging.
    fn provider_name(&self) -> &'static str {
        "unknown"
    }

    /// Generate a response for the given messages.
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerateOptions,
    ) -> Result<ModelResponse>;

    /// Check if the model supports the stop parameter.
    fn supports_stop_parameter(&self) -> bool {
        true
    }
}

/// One scripted reply of a [`MockModel`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Reply with this assistant text.
    Text(String),
    /// Fail with this transport error.
    Fail(LlmError),
}

/// A scripted model for testing.
///
/// Scripted replies are consumed in order; once exhausted, the fallback
/// responses are cycled. Every call records the messages it received.
#[derive(Debug)]
pub struct MockModel {
    model_id: String,
    responses: Vec<String>,
    script: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockModel {
    /// Create a new mock model with predefined responses.
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            model_id: "mock-model".to_string(),
            responses,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock model that plays a script before falling back to `"ok"`.
    #[must_use]
    pub fn scripted(script: Vec<MockReply>) -> Self {
        let model = Self::new(vec!["ok".to_string()]);
        *model.script.lock().unwrap_or_else(PoisonError::into_inner) = script.into();
        model
    }

    /// Set the model identifier.
    #[must_use]
    pub fn with_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The messages received by every call, oldest call first.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Model for MockModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        _options: GenerateOptions,
    ) -> Result<ModelResponse> {
        let index = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(messages);
            calls.len() - 1
        };
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let text = match scripted {
            Some(MockReply::Fail(err)) => return Err(err.into()),
            Some(MockReply::Text(text)) => text,
            None if self.responses.is_empty() => "No response".to_string(),
            None => self.responses[index % self.responses.len()].clone(),
        };
        Ok(ModelResponse::new(ChatMessage::assistant(text)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_cycles_responses_and_records_calls() {
        let model = MockModel::new(vec!["a".into(), "b".into()]);
        let opts = GenerateOptions::new();

        let first = model.generate(vec![ChatMessage::user("1")], opts.clone()).await.unwrap();
        let second = model.generate(vec![], opts.clone()).await.unwrap();
        let third = model.generate(vec![], opts).await.unwrap();

        assert_eq!(first.text().as_deref(), Some("a"));
        assert_eq!(second.text().as_deref(), Some("b"));
        assert_eq!(third.text().as_deref(), Some("a"));
        assert_eq!(model.call_count(), 3);
        assert_eq!(model.calls()[0][0].text_content().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn mock_plays_script_first() {
        let model = MockModel::scripted(vec![
            MockReply::Fail(LlmError::internal_server("down")),
            MockReply::Text("up".into()),
        ]);
        let opts = GenerateOptions::new();

        assert!(model.generate(vec![], opts.clone()).await.is_err());
        let ok = model.generate(vec![], opts.clone()).await.unwrap();
        assert_eq!(ok.text().as_deref(), Some("up"));
        let fallback = model.generate(vec![], opts).await.unwrap();
        assert_eq!(fallback.text().as_deref(), Some("ok"));
    }

    #[test]
    fn options_builder() {
        let opts = GenerateOptions::new()
            .with_stop_sequences(vec!["<end_code>".into()])
            .with_max_tokens(256)
            .with_temperature(0.0);
        assert_eq!(opts.max_tokens, Some(256));
        assert!(opts.grammar.is_none());
        let json = serde_json::to_value(&opts).unwrap();
        assert!(json.get("tools").is_none());
    }
}
