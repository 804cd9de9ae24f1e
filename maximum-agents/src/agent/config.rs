//! Agent configuration.
//!
//! [`AgentConfig`] is plain data: every field has a default, so a partial
//! JSON document is enough to configure an agent.
//!
//! # Example
//!
//! ```rust,ignore
//! use maximum_agents::agent::AgentConfig;
//!
//! let config = AgentConfig::from_json(r#"{"model": "openai/gpt-4o", "max_steps": 10}"#)?
//!     .with_system_prompt("You are a careful analyst. Solve: {task}");
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{CachePolicy, RetryPolicy};

/// Default model name.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4-20250514";

/// Default step budget.
pub const DEFAULT_MAX_STEPS: usize = 35;

/// Default description of the final-answer tool.
pub const DEFAULT_FINAL_ANSWER_DESCRIPTION: &str = "The final answer to the user's question.";

/// Configuration of an [`Agent`](super::Agent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// System prompt template. Every `{task}` is replaced by the task;
    /// without a placeholder the task is appended.
    pub system_prompt: String,
    /// Model name handed to model-setup hooks and then to selection.
    pub model: String,
    /// Step budget enforced by the engine.
    pub max_steps: usize,
    /// Extra modules the generated code may import.
    pub additional_authorized_imports: Vec<String>,
    /// Description of the final-answer tool.
    pub final_answer_description: String,
    /// Retry policy of the default selector.
    pub retry: RetryPolicy,
    /// Cache policy of the default selector.
    pub cache: CachePolicy,
    /// Model names containing this marker get the caching layer.
    pub cache_provider_marker: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            model: DEFAULT_MODEL.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            additional_authorized_imports: Vec::new(),
            final_answer_description: DEFAULT_FINAL_ANSWER_DESCRIPTION.to_string(),
            retry: RetryPolicy::default(),
            cache: CachePolicy::default(),
            cache_provider_marker: "anthropic".to_string(),
        }
    }
}

impl AgentConfig {
    /// Create a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] on malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the system prompt template.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the step budget.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the extra authorized imports.
    #[must_use]
    pub fn with_authorized_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_authorized_imports = imports.into_iter().map(Into::into).collect();
        self
    }

    /// Set the final-answer tool description.
    #[must_use]
    pub fn with_final_answer_description(mut self, description: impl Into<String>) -> Self {
        self.final_answer_description = description.into();
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the cache policy.
    #[must_use]
    pub const fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// Set the caching provider marker.
    #[must_use]
    pub fn with_cache_provider_marker(mut self, marker: impl Into<String>) -> Self {
        self.cache_provider_marker = marker.into();
        self
    }

    /// Build the system prompt for `task`.
    #[must_use]
    pub fn render_system_prompt(&self, task: &str) -> String {
        if self.system_prompt.contains("{task}") {
            self.system_prompt.replace("{task}", task)
        } else {
            format!("{}\n\n Task: {task}", self.system_prompt)
        }
    }
}
