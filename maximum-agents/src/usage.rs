//! Token usage accounting.

use serde::{Deserialize, Serialize};

/// Token usage reported by a model call or accumulated over a step.
///
/// Providers that support prompt caching also report how many input tokens
/// were written to, or served from, the cache.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Number of tokens in the input/prompt.
    pub input_tokens: u32,
    /// Number of tokens in the output/completion.
    pub output_tokens: u32,
    /// Input tokens written to the prompt cache.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cache_creation_input_tokens: u32,
    /// Input tokens served from the prompt cache.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cache_read_input_tokens: u32,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl TokenUsage {
    /// Create new token usage with specified counts.
    #[must_use]
    pub const fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 0,
        }
    }

    /// Set the cache counters.
    #[must_use]
    pub const fn with_cache(mut self, created: u32, read: u32) -> Self {
        self.cache_creation_input_tokens = created;
        self.cache_read_input_tokens = read;
        self
    }

    /// Get total token count.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::Add for TokenUsage {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.cache_creation_input_tokens += rhs.cache_creation_input_tokens;
        self.cache_read_input_tokens += rhs.cache_read_input_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accumulates_all_counters() {
        let a = TokenUsage::new(100, 50).with_cache(10, 0);
        let b = TokenUsage::new(200, 100).with_cache(0, 90);
        let sum = a + b;

        assert_eq!(sum.total(), 450);
        assert_eq!(sum.cache_creation_input_tokens, 10);
        assert_eq!(sum.cache_read_input_tokens, 90);
    }

    #[test]
    fn zero_cache_counters_are_not_serialized() {
        let json = serde_json::to_value(TokenUsage::new(1, 2)).unwrap_or_default();
        assert_eq!(json, serde_json::json!({"input_tokens": 1, "output_tokens": 2}));
    }
}
