//! Step formatting: raw engine event to typed record.

use crate::error::Result;
use crate::event::{ActionStep, RawEvent};
use crate::record::{Formatted, Part, RunResult, Step};
use crate::schema::AnswerSchema;

/// Classify and reformat one raw event.
///
/// Final answers, and action steps flagged as final with a non-null output,
/// become a [`RunResult`] validated against `T`. Every other event becomes a
/// [`Step`].
///
/// # Errors
///
/// Returns [`crate::Error::Validation`] if a final payload does not satisfy `T`.
pub fn format_step<T: AnswerSchema>(event: &RawEvent) -> Result<Formatted<T>> {
    match event {
        RawEvent::FinalAnswer(step) => Ok(Formatted::Result(RunResult::new(T::validate(
            &step.output,
        )?))),
        RawEvent::Action(step) => {
            if let Some(output) = step.final_output() {
                return Ok(Formatted::Result(RunResult::new(T::validate(output)?)));
            }
            Ok(Formatted::Step(action_parts(step)))
        }
        RawEvent::Planning(step) => Ok(Formatted::Step(Step::thinking(step.plan.clone()))),
        RawEvent::StreamDelta(delta) => Ok(Formatted::Step(Step::thinking(
            delta.content.clone().unwrap_or_default(),
        ))),
    }
}

fn action_parts(step: &ActionStep) -> Step {
    let non_empty = |s: &Option<String>| s.as_deref().filter(|s| !s.is_empty()).map(str::to_owned);

    let mut parts = Vec::with_capacity(3);
    if let Some(text) = non_empty(&step.model_output) {
        parts.push(Part::Thinking(text));
    }
    if let Some(code) = non_empty(&step.code_action) {
        parts.push(Part::Code(code));
    }
    if let Some(output) = non_empty(&step.observations) {
        parts.push(Part::Output(output));
    }
    Step::numbered(step.step_number, parts)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::event::{FinalAnswerStep, PlanningStep};
    use crate::message::ChatMessageStreamDelta;
    use crate::record::BasicAnswer;
    use serde_json::json;

    fn step_of(event: RawEvent) -> Step {
        match format_step::<BasicAnswer>(&event).unwrap() {
            Formatted::Step(step) => step,
            Formatted::Result(_) => panic!("expected a step"),
        }
    }

    #[test]
    fn action_parts_in_order() {
        let step = step_of(
            ActionStep::new(3)
                .with_model_output("compute")
                .with_code_action("print(2+2)")
                .with_observations("4")
                .into(),
        );
        assert_eq!(step.step_number, Some(3));
        assert_eq!(
            step.parts,
            vec![
                Part::Thinking("compute".into()),
                Part::Code("print(2+2)".into()),
                Part::Output("4".into()),
            ]
        );
    }

    #[test]
    fn empty_action_yields_empty_step() {
        let step = step_of(ActionStep::new(1).with_model_output("").into());
        assert_eq!(step.step_number, Some(1));
        assert!(step.is_empty());
    }

    #[test]
    fn final_action_becomes_result() {
        let event: RawEvent = ActionStep::new(2)
            .with_observations("ignored")
            .with_final_output(json!({"answer": "4"}))
            .into();
        let Formatted::Result(result) = format_step::<BasicAnswer>(&event).unwrap() else {
            panic!("expected a result");
        };
        assert_eq!(result.answer, BasicAnswer::new("4"));
    }

    #[test]
    fn final_action_with_null_output_is_a_step() {
        let step = step_of(ActionStep::new(2).with_final_output(serde_json::Value::Null).into());
        assert_eq!(step.step_number, Some(2));
    }

    #[test]
    fn planning_and_delta_are_unnumbered_thinking() {
        let plan = step_of(PlanningStep::new("1. add").into());
        assert_eq!(plan, Step::thinking("1. add"));

        let delta = step_of(ChatMessageStreamDelta::text("partial").into());
        assert_eq!(delta, Step::thinking("partial"));

        let empty = step_of(ChatMessageStreamDelta::default().into());
        assert_eq!(empty, Step::thinking(""));
    }

    #[test]
    fn invalid_final_answer_is_validation_error() {
        let event = RawEvent::FinalAnswer(FinalAnswerStep {
            output: json!({"wrong": 1}),
        });
        let err = format_step::<BasicAnswer>(&event).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
