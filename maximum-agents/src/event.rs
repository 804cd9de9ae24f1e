//! Raw progress events emitted by an execution engine.
//!
//! An engine reports progress as a finite, ordered sequence of [`RawEvent`]s.
//! The set of event kinds is closed; untyped engine output is decoded once at
//! the boundary by [`RawEvent::from_value`], and anything with an unknown kind
//! tag is rejected there.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::message::ChatMessageStreamDelta;
use crate::usage::TokenUsage;

/// Action step representing one think/act/observe cycle of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// Step number.
    #[serde(default)]
    pub step_number: usize,
    /// Raw model output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_output: Option<String>,
    /// Code the engine executed for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_action: Option<String>,
    /// Observations from execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    /// Output of the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_output: Option<Value>,
    /// Whether this is the final answer step.
    #[serde(default)]
    pub is_final_answer: bool,
    /// Error that occurred (if any).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Token usage for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl ActionStep {
    /// Create an empty action step with the given number.
    #[must_use]
    pub fn new(step_number: usize) -> Self {
        Self {
            step_number,
            ..Self::default()
        }
    }

    /// Set the model output.
    #[must_use]
    pub fn with_model_output(mut self, output: impl Into<String>) -> Self {
        self.model_output = Some(output.into());
        self
    }

    /// Set the code action.
    #[must_use]
    pub fn with_code_action(mut self, code: impl Into<String>) -> Self {
        self.code_action = Some(code.into());
        self
    }

    /// Set the observations.
    #[must_use]
    pub fn with_observations(mut self, observations: impl Into<String>) -> Self {
        self.observations = Some(observations.into());
        self
    }

    /// Mark the step as the final answer with the given output.
    #[must_use]
    pub fn with_final_output(mut self, output: Value) -> Self {
        self.action_output = Some(output);
        self.is_final_answer = true;
        self
    }

    /// The final answer payload, if this step carries one.
    ///
    /// A step flagged as final with a null or absent output carries none.
    #[must_use]
    pub fn final_output(&self) -> Option<&Value> {
        if !self.is_final_answer {
            return None;
        }
        self.action_output.as_ref().filter(|v| !v.is_null())
    }
}

/// Planning step carrying the engine's current plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningStep {
    /// The plan text.
    pub plan: String,
    /// Token usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl PlanningStep {
    /// Create a planning step.
    #[must_use]
    pub fn new(plan: impl Into<String>) -> Self {
        Self {
            plan: plan.into(),
            token_usage: None,
        }
    }
}

/// Final answer step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswerStep {
    /// The final output.
    pub output: Value,
}

/// One progress notification from the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    /// An action step.
    Action(ActionStep),
    /// A planning step.
    Planning(PlanningStep),
    /// The final answer.
    FinalAnswer(FinalAnswerStep),
    /// An incremental streaming delta.
    StreamDelta(ChatMessageStreamDelta),
}

impl RawEvent {
    /// All recognized kind tags.
    pub const KINDS: [&'static str; 4] = ["action", "planning", "final_answer", "stream_delta"];

    /// Decode an untyped engine event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedEventKind`] if the `type` tag is missing or
    /// unknown, and [`Error::Json`] if a known kind has malformed fields.
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(other) => return Err(Error::UnrecognizedEventKind(other.to_string())),
            None => return Err(Error::UnrecognizedEventKind("<missing>".into())),
        };
        if !Self::KINDS.contains(&kind.as_str()) {
            return Err(Error::UnrecognizedEventKind(kind));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The event's kind tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Action(_) => "action",
            Self::Planning(_) => "planning",
            Self::FinalAnswer(_) => "final_answer",
            Self::StreamDelta(_) => "stream_delta",
        }
    }

    /// Token usage reported with this event, if any.
    #[must_use]
    pub const fn token_usage(&self) -> Option<TokenUsage> {
        match self {
            Self::Action(step) => step.token_usage,
            Self::Planning(step) => step.token_usage,
            Self::StreamDelta(delta) => delta.token_usage,
            Self::FinalAnswer(_) => None,
        }
    }
}

impl From<ActionStep> for RawEvent {
    fn from(step: ActionStep) -> Self {
        Self::Action(step)
    }
}

impl From<PlanningStep> for RawEvent {
    fn from(step: PlanningStep) -> Self {
        Self::Planning(step)
    }
}

impl From<FinalAnswerStep> for RawEvent {
    fn from(step: FinalAnswerStep) -> Self {
        Self::FinalAnswer(step)
    }
}

impl From<ChatMessageStreamDelta> for RawEvent {
    fn from(delta: ChatMessageStreamDelta) -> Self {
        Self::StreamDelta(delta)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    mod from_value {
        use super::*;

        #[test]
        fn decodes_action() {
            let event = RawEvent::from_value(json!({
                "type": "action",
                "step_number": 2,
                "observations": "4"
            }))
            .unwrap();
            let RawEvent::Action(step) = event else {
                panic!("expected action");
            };
            assert_eq!(step.step_number, 2);
            assert_eq!(step.observations.as_deref(), Some("4"));
            assert!(!step.is_final_answer);
        }

        #[test]
        fn decodes_final_answer_and_delta() {
            let event =
                RawEvent::from_value(json!({"type": "final_answer", "output": {"answer": "4"}}))
                    .unwrap();
            assert_eq!(event.kind(), "final_answer");

            let delta = RawEvent::from_value(json!({"type": "stream_delta"})).unwrap();
            assert_eq!(delta, RawEvent::StreamDelta(ChatMessageStreamDelta::default()));
        }

        #[test]
        fn unknown_kind_is_rejected() {
            let err = RawEvent::from_value(json!({"type": "tool_call"})).unwrap_err();
            assert!(matches!(err, Error::UnrecognizedEventKind(ref k) if k == "tool_call"));
        }

        #[test]
        fn missing_kind_is_rejected() {
            let err = RawEvent::from_value(json!({"plan": "x"})).unwrap_err();
            assert!(matches!(err, Error::UnrecognizedEventKind(_)));
        }

        #[test]
        fn malformed_known_kind_is_json_error() {
            let err = RawEvent::from_value(json!({"type": "planning", "plan": 7})).unwrap_err();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    mod action_step {
        use super::*;

        #[test]
        fn final_output_requires_flag_and_non_null() {
            let mut step = ActionStep::new(1);
            step.action_output = Some(json!("4"));
            assert!(step.final_output().is_none());

            let step = ActionStep::new(1).with_final_output(Value::Null);
            assert!(step.final_output().is_none());

            let step = ActionStep::new(1).with_final_output(json!({"answer": "4"}));
            assert_eq!(step.final_output(), Some(&json!({"answer": "4"})));
        }

        #[test]
        fn token_usage_is_exposed() {
            let mut step = ActionStep::new(1);
            step.token_usage = Some(TokenUsage::new(10, 2));
            assert_eq!(RawEvent::from(step).token_usage().unwrap().total(), 12);
        }
    }
}
