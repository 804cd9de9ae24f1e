//! HTTP transports for hosted chat-completion APIs.
//!
//! Each provider implements [`Model`](crate::model::Model) directly over
//! `reqwest`. Non-success responses are classified with
//! [`LlmError::from_status`] so the retry layer can recognize transient
//! server failures.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicModel;
pub use openai::OpenAiModel;

use serde_json::Value;
use tracing::debug;

use crate::error::{LlmError, Result};

/// Read a provider API key from the environment.
pub(crate) fn api_key_from_env(var: &str, provider: &str) -> Result<String> {
    std::env::var(var)
        .map_err(|_| LlmError::auth(provider, format!("{var} environment variable not set")).into())
}

/// Send a JSON request and decode the JSON response.
pub(crate) async fn send_json(request: reqwest::RequestBuilder, provider: &str) -> Result<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| LlmError::from(e).with_provider(provider))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!(provider, status = status.as_u16(), "Provider returned an error status");
        return Err(LlmError::from_status(provider, status.as_u16(), body).into());
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::response_format("JSON body", e.to_string()).with_provider(provider).into())
}

/// Read a token counter from a usage object.
pub(crate) fn usage_count(usage: &Value, key: &str) -> u32 {
    usage[key]
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}
