//! Prompt-cache annotation.
//!
//! Providers that support prompt caching reuse a prefix of the conversation
//! when content blocks carry a cache marker. Only a handful of markers are
//! allowed per request, so the most recent messages get them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerateOptions, Model, ModelResponse, RetryingModel};
use crate::error::Result;
use crate::message::{ChatMessage, ContentBlock, MessageContent};

/// How many content fragments may be marked per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Maximum number of cache-marked fragments across the whole history.
    pub budget: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self { budget: 4 }
    }
}

/// Mark up to `budget` content fragments as cache-eligible.
///
/// Messages are visited newest first. A single text payload is turned into
/// one text block and marked while budget remains. Block content is visited
/// in its own order, each block marked while budget remains; blocks past the
/// budget lose any marker they carried. Messages without content pass
/// through unchanged. Message order is preserved.
#[must_use]
pub fn annotate_cache(messages: Vec<ChatMessage>, budget: usize) -> Vec<ChatMessage> {
    let mut remaining = budget;
    let mut mark = |mut block: ContentBlock| {
        if remaining > 0 {
            remaining -= 1;
            block.cached()
        } else {
            block.cache_control = None;
            block
        }
    };

    let mut annotated: Vec<ChatMessage> = messages
        .into_iter()
        .rev()
        .map(|mut message| {
            message.content = match message.content.take() {
                Some(MessageContent::Text(text)) => {
                    Some(MessageContent::Blocks(vec![mark(ContentBlock::text(text))]))
                }
                Some(MessageContent::Blocks(blocks)) => Some(MessageContent::Blocks(
                    blocks.into_iter().map(&mut mark).collect(),
                )),
                None => None,
            };
            message
        })
        .collect();
    annotated.reverse();
    annotated
}

/// A retrying model that annotates the history for prompt caching first.
#[derive(Debug, Clone)]
pub struct CachingModel {
    inner: RetryingModel,
    policy: CachePolicy,
}

impl CachingModel {
    /// Wrap a retrying model.
    #[must_use]
    pub const fn new(inner: RetryingModel, policy: CachePolicy) -> Self {
        Self { inner, policy }
    }

    /// The cache policy.
    #[must_use]
    pub const fn policy(&self) -> CachePolicy {
        self.policy
    }
}

#[async_trait]
impl Model for CachingModel {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn supports_stop_parameter(&self) -> bool {
        self.inner.supports_stop_parameter()
    }

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerateOptions,
    ) -> Result<ModelResponse> {
        let messages = annotate_cache(messages, self.policy.budget);
        debug!(
            model = %self.model_id(),
            marked = messages.iter().map(ChatMessage::cached_block_count).sum::<usize>(),
            "Annotated history for prompt caching"
        );
        self.inner.generate(messages, options).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::message::MessageRole;
    use crate::model::{MockModel, RetryPolicy};
    use std::sync::Arc;

    fn total_marked(messages: &[ChatMessage]) -> usize {
        messages.iter().map(ChatMessage::cached_block_count).sum()
    }

    fn blocks(message: &ChatMessage) -> &[ContentBlock] {
        match &message.content {
            Some(MessageContent::Blocks(blocks)) => blocks,
            other => panic!("expected blocks, got {other:?}"),
        }
    }

    mod annotate {
        use super::*;

        #[test]
        fn empty_history_is_unchanged() {
            assert!(annotate_cache(Vec::new(), 4).is_empty());
        }

        #[test]
        fn short_history_is_fully_marked() {
            let history = vec![ChatMessage::system("s"), ChatMessage::user("u")];
            let out = annotate_cache(history, 4);
            assert_eq!(total_marked(&out), 2);
            assert_eq!(out[0].role, MessageRole::System);
            assert_eq!(blocks(&out[1])[0].as_text(), Some("u"));
        }

        #[test]
        fn long_history_marks_four_most_recent() {
            let history: Vec<_> = (0..6).map(|i| ChatMessage::user(i.to_string())).collect();
            let out = annotate_cache(history, 4);

            assert_eq!(total_marked(&out), 4);
            let marked: Vec<bool> = out.iter().map(|m| m.cached_block_count() == 1).collect();
            assert_eq!(marked, vec![false, false, true, true, true, true]);
            assert_eq!(out[0].text_content().as_deref(), Some("0"));
        }

        #[test]
        fn blocks_are_marked_in_their_own_order() {
            let history = vec![
                ChatMessage::user("old"),
                ChatMessage::with_blocks(
                    MessageRole::User,
                    vec![
                        ContentBlock::text("a"),
                        ContentBlock::image_url("https://example.com/x.png"),
                        ContentBlock::text("b"),
                    ],
                ),
                ChatMessage::assistant("new"),
            ];
            let out = annotate_cache(history, 3);

            assert_eq!(total_marked(&out), 3);
            assert_eq!(out[2].cached_block_count(), 1);
            let middle = blocks(&out[1]);
            assert!(middle[0].is_cached());
            assert!(middle[1].is_cached());
            assert!(!middle[2].is_cached());
            assert_eq!(out[0].cached_block_count(), 0);
        }

        #[test]
        fn markers_past_budget_are_removed() {
            let history = vec![
                ChatMessage::with_blocks(MessageRole::User, vec![ContentBlock::text("x").cached()]),
                ChatMessage::user("y"),
            ];
            let out = annotate_cache(history, 1);
            assert_eq!(out[0].cached_block_count(), 0);
            assert_eq!(out[1].cached_block_count(), 1);
        }

        #[test]
        fn messages_without_content_pass_through() {
            let call = ChatMessage::assistant_with_tool_calls(vec![]);
            let out = annotate_cache(vec![call.clone(), ChatMessage::user("u")], 4);
            assert_eq!(out[0], call);
            assert_eq!(total_marked(&out), 1);
        }

        #[test]
        fn zero_budget_marks_nothing() {
            let out = annotate_cache(vec![ChatMessage::user("u")], 0);
            assert_eq!(total_marked(&out), 0);
            assert_eq!(blocks(&out[0]).len(), 1);
        }
    }

    #[tokio::test]
    async fn caching_model_sends_annotated_history() {
        let mock = Arc::new(MockModel::new(vec!["ok".into()]).with_id("claude"));
        let retrying = RetryingModel::new(Arc::<MockModel>::clone(&mock), RetryPolicy::default());
        let model = CachingModel::new(retrying, CachePolicy::default());

        let history: Vec<_> = (0..5).map(|i| ChatMessage::user(i.to_string())).collect();
        model.generate(history, GenerateOptions::new()).await.unwrap();

        let sent = &mock.calls()[0];
        assert_eq!(sent.len(), 5);
        assert_eq!(total_marked(sent), 4);
        assert_eq!(sent[0].cached_block_count(), 0);
        assert_eq!(model.model_id(), "claude");
    }
}
