//! Typed records emitted by a run.
//!
//! Every raw engine event is formatted into exactly one [`Formatted`] value:
//! either a [`Step`] delivered to the caller's log sink, or the run's single
//! [`RunResult`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One observable fragment produced during a step.
///
/// Serializes as `{"type": "thinking", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum Part {
    /// Model reasoning text.
    Thinking(String),
    /// Code the model chose to execute.
    Code(String),
    /// Textual output of the execution.
    Output(String),
}

impl Part {
    /// The text payload.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Thinking(s) | Self::Code(s) | Self::Output(s) => s,
        }
    }

    /// The part's kind tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Thinking(_) => "thinking",
            Self::Code(_) => "code",
            Self::Output(_) => "output",
        }
    }
}

/// One formatted progress unit, parts in the order they were produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Sequence position; absent for planning and streaming events.
    #[serde(default)]
    pub step_number: Option<usize>,
    /// Fragments in chronological order.
    pub parts: Vec<Part>,
}

impl Step {
    /// Create a numbered step.
    #[must_use]
    pub const fn numbered(step_number: usize, parts: Vec<Part>) -> Self {
        Self {
            step_number: Some(step_number),
            parts,
        }
    }

    /// Create an unnumbered step holding a single thinking part.
    #[must_use]
    pub fn thinking(content: impl Into<String>) -> Self {
        Self {
            step_number: None,
            parts: vec![Part::Thinking(content.into())],
        }
    }

    /// Check if the step has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Discriminates the shape of a result's payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// A validated answer payload.
    #[default]
    Basic,
}

/// The single validated terminal output of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult<T> {
    /// Output kind tag.
    #[serde(default)]
    pub output: OutputKind,
    /// The validated answer.
    pub answer: T,
}

impl<T> RunResult<T> {
    /// Wrap a validated answer.
    #[must_use]
    pub const fn new(answer: T) -> Self {
        Self {
            output: OutputKind::Basic,
            answer,
        }
    }

    /// Consume the result, returning the answer.
    #[must_use]
    pub fn into_answer(self) -> T {
        self.answer
    }
}

/// The default answer schema: a single text answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct BasicAnswer {
    /// The answer text.
    pub answer: String,
}

impl BasicAnswer {
    /// Create a basic answer.
    #[must_use]
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

/// A formatted engine event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formatted<T> {
    /// A progress step for the log sink.
    Step(Step),
    /// The run's final result.
    Result(RunResult<T>),
}

impl<T> Formatted<T> {
    /// Check if this is the final result.
    #[must_use]
    pub const fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// Get the step, if this is one.
    #[must_use]
    pub const fn as_step(&self) -> Option<&Step> {
        match self {
            Self::Step(step) => Some(step),
            Self::Result(_) => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn part_serializes_with_type_and_content() {
        let value = serde_json::to_value(Part::Code("print(4)".into())).unwrap();
        assert_eq!(value, json!({"type": "code", "content": "print(4)"}));
    }

    #[test]
    fn part_accessors() {
        let part = Part::Output("4".into());
        assert_eq!(part.content(), "4");
        assert_eq!(part.kind(), "output");
    }

    #[test]
    fn unnumbered_step_serializes_null_number() {
        let value = serde_json::to_value(Step::thinking("plan")).unwrap();
        assert_eq!(
            value,
            json!({"step_number": null, "parts": [{"type": "thinking", "content": "plan"}]})
        );
    }

    #[test]
    fn result_defaults_to_basic_output() {
        let result: RunResult<BasicAnswer> =
            serde_json::from_value(json!({"answer": {"answer": "4"}})).unwrap();
        assert_eq!(result.output, OutputKind::Basic);
        assert_eq!(result.into_answer(), BasicAnswer::new("4"));
    }

    #[test]
    fn formatted_helpers() {
        let step: Formatted<BasicAnswer> = Formatted::Step(Step::default());
        assert!(!step.is_result());
        assert!(step.as_step().unwrap().is_empty());

        let result = Formatted::Result(RunResult::new(BasicAnswer::new("x")));
        assert!(result.is_result());
        assert!(result.as_step().is_none());
    }
}
