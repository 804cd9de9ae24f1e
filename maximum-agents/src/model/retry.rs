//! Exponential-backoff retry around a model call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{GenerateOptions, Model, ModelResponse, SharedModel};
use crate::error::{Error, LlmErrorKind, Result};
use crate::message::ChatMessage;

/// Async sleep used between attempts.
pub type Sleeper = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Sleeper backed by [`futures_timer::Delay`].
#[must_use]
pub fn timer_sleeper() -> Sleeper {
    Arc::new(|delay| -> BoxFuture<'static, ()> { Box::pin(futures_timer::Delay::new(delay)) })
}

/// When and how long to wait before retrying a failed call.
///
/// Durations are (de)serialized as fractional seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    #[serde(with = "secs")]
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    #[serde(with = "secs")]
    pub max_delay: Duration,
    /// Transport error kinds that are retried. Everything else propagates
    /// immediately.
    pub retry_on: Vec<LlmErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            retry_on: vec![LlmErrorKind::InternalServer],
        }
    }
}

impl RetryPolicy {
    /// Set the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base and maximum delays.
    #[must_use]
    pub const fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Set the retried error kinds.
    #[must_use]
    pub fn with_retry_on(mut self, kinds: Vec<LlmErrorKind>) -> Self {
        self.retry_on = kinds;
        self
    }

    /// Delay after failed attempt `attempt` (1-based):
    /// `min(base_delay * 2^(attempt - 1), max_delay)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1));
        factor
            .and_then(|f| self.base_delay.checked_mul(f))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Whether an error belongs to the retried class.
    #[must_use]
    pub fn is_transient(&self, err: &Error) -> bool {
        err.llm_kind().is_some_and(|kind| self.retry_on.contains(&kind))
    }
}

/// A model that retries transient failures of its inner model.
#[derive(Clone)]
pub struct RetryingModel {
    inner: SharedModel,
    policy: RetryPolicy,
    sleeper: Sleeper,
}

impl fmt::Debug for RetryingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingModel")
            .field("model_id", &self.inner.model_id())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryingModel {
    /// Wrap a model with the given policy.
    #[must_use]
    pub fn new(inner: SharedModel, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            sleeper: timer_sleeper(),
        }
    }

    /// Replace the sleeper used between attempts.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Model for RetryingModel {
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
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.generate(messages.clone(), options.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < max_attempts && self.policy.is_transient(&err) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        model = %self.inner.model_id(),
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Transient model failure, retrying"
                    );
                    (self.sleeper)(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::model::{MockModel, MockReply};
    use std::sync::Mutex;

    fn recording_sleeper() -> (Sleeper, Arc<Mutex<Vec<Duration>>>) {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delays);
        let sleeper: Sleeper = Arc::new(move |d| -> BoxFuture<'static, ()> {
            sink.lock().unwrap().push(d);
            Box::pin(async {})
        });
        (sleeper, delays)
    }

    fn failing(n: usize, err: &LlmError) -> Vec<MockReply> {
        (0..n).map(|_| MockReply::Fail(err.clone())).collect()
    }

    fn seconds(list: &[u64]) -> Vec<Duration> {
        list.iter().copied().map(Duration::from_secs).collect()
    }

    mod policy {
        use super::*;

        #[test]
        fn defaults() {
            let policy = RetryPolicy::default();
            assert_eq!(policy.max_attempts, 5);
            assert_eq!(policy.base_delay, Duration::from_secs(1));
            assert_eq!(policy.max_delay, Duration::from_secs(60));
            assert_eq!(policy.retry_on, vec![LlmErrorKind::InternalServer]);
        }

        #[test]
        fn delays_double_and_cap() {
            let policy = RetryPolicy::default();
            let delays: Vec<_> = (1..=8).map(|n| policy.delay_for(n)).collect();
            assert_eq!(delays, seconds(&[1, 2, 4, 8, 16, 32, 60, 60]));
            assert_eq!(policy.delay_for(200), Duration::from_secs(60));
        }

        #[test]
        fn transient_class_only() {
            let policy = RetryPolicy::default();
            assert!(policy.is_transient(&LlmError::internal_server("x").into()));
            assert!(!policy.is_transient(&LlmError::rate_limited("openai").into()));
            assert!(!policy.is_transient(&Error::NoFinalResult));
        }

        #[test]
        fn deserializes_fractional_seconds() {
            let policy: RetryPolicy =
                serde_json::from_str(r#"{"base_delay": 0.5, "retry_on": ["rate_limited"]}"#)
                    .unwrap();
            assert_eq!(policy.base_delay, Duration::from_millis(500));
            assert_eq!(policy.max_attempts, 5);
            assert_eq!(policy.retry_on, vec![LlmErrorKind::RateLimited]);
        }
    }

    mod retrying_model {
        use super::*;

        #[tokio::test]
        async fn succeeds_on_fifth_attempt_after_four_delays() {
            let mut script = failing(4, &LlmError::internal_server("503"));
            script.push(MockReply::Text("done".into()));
            let mock = Arc::new(MockModel::scripted(script));
            let (sleeper, delays) = recording_sleeper();
            let model = RetryingModel::new(Arc::<MockModel>::clone(&mock), RetryPolicy::default()).with_sleeper(sleeper);

            let response = model
                .generate(vec![ChatMessage::user("hi")], GenerateOptions::new())
                .await
                .unwrap();

            assert_eq!(response.text().as_deref(), Some("done"));
            assert_eq!(mock.call_count(), 5);
            assert_eq!(*delays.lock().unwrap(), seconds(&[1, 2, 4, 8]));
        }

        #[tokio::test]
        async fn exhaustion_returns_last_failure_without_sixth_attempt() {
            let mut script = failing(4, &LlmError::internal_server("early"));
            script.push(MockReply::Fail(LlmError::internal_server("fifth")));
            let mock = Arc::new(MockModel::scripted(script));
            let (sleeper, delays) = recording_sleeper();
            let model = RetryingModel::new(Arc::<MockModel>::clone(&mock), RetryPolicy::default()).with_sleeper(sleeper);

            let err = model.generate(vec![], GenerateOptions::new()).await.unwrap_err();

            assert!(err.to_string().contains("fifth"));
            assert_eq!(mock.call_count(), 5);
            assert_eq!(delays.lock().unwrap().len(), 4);
        }

        #[tokio::test]
        async fn non_transient_propagates_immediately() {
            let mock = Arc::new(MockModel::scripted(vec![MockReply::Fail(LlmError::auth(
                "anthropic",
                "bad key",
            ))]));
            let (sleeper, delays) = recording_sleeper();
            let model = RetryingModel::new(Arc::<MockModel>::clone(&mock), RetryPolicy::default()).with_sleeper(sleeper);

            let err = model.generate(vec![], GenerateOptions::new()).await.unwrap_err();

            assert_eq!(err.llm_kind(), Some(LlmErrorKind::Auth));
            assert_eq!(mock.call_count(), 1);
            assert!(delays.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn delays_are_capped_by_max_delay() {
            let mock = Arc::new(MockModel::scripted(failing(4, &LlmError::internal_server("x"))));
            let (sleeper, delays) = recording_sleeper();
            let policy = RetryPolicy::default()
                .with_delays(Duration::from_secs(10), Duration::from_secs(15));
            let model = RetryingModel::new(mock, policy).with_sleeper(sleeper);

            model.generate(vec![], GenerateOptions::new()).await.unwrap();

            assert_eq!(*delays.lock().unwrap(), seconds(&[10, 15, 15, 15]));
        }
    }
}
