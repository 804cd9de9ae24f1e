//! Run pipeline.
//!
//! A run moves through [`RunPhase`]s:
//!
//! 1. **Preparing**: pre-run hooks, extra options, model setup and
//!    selection, system prompt.
//! 2. **Streaming**: every raw event goes through pre-step hooks, the step
//!    formatter and post-step hooks. Steps reach the log sink in engine
//!    order; the first result stops consumption.
//! 3. **Finalizing**: post-run hooks on the result.
//!
//! Any failure enters **ErrorRecovery**, where error hooks may substitute a
//! result. All per-run state lives in the `run` call itself.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{Instrument, debug, info, info_span, warn};

use super::Agent;
use crate::engine::EngineRun;
use crate::error::{Error, Result};
use crate::format::format_step;
use crate::record::{Formatted, RunResult, Step};
use crate::schema::AnswerSchema;
use crate::tool::{FinalAnswerTool, SharedTool};

/// States of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Not started.
    Idle,
    /// Applying pre-run hooks and resolving the model and prompt.
    Preparing,
    /// Consuming engine events.
    Streaming,
    /// Applying post-run hooks.
    Finalizing,
    /// Finished with a result.
    Done,
    /// Offering a failure to the error hooks.
    ErrorRecovery,
}

impl RunPhase {
    /// The phase's name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::ErrorRecovery => "error_recovery",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(phase: RunPhase) {
    debug!(%phase, "Run phase");
}

impl<T: AnswerSchema> Agent<T> {
    /// Run `task` to completion.
    ///
    /// Every formatted [`Step`] is passed to `log` in the order the engine
    /// emitted it. Events after the first result are not consumed.
    ///
    /// # Errors
    ///
    /// Returns the original failure when no error hook substitutes a result:
    /// [`Error::NoFinalResult`] if the engine never produced an answer,
    /// [`Error::Validation`] if the answer does not satisfy `T`,
    /// [`Error::UnrecognizedEventKind`] for undecodable events, or any model,
    /// engine or selection error.
    pub async fn run<F>(&self, task: &str, mut log: F) -> Result<RunResult<T>>
    where
        F: FnMut(Step) + Send,
    {
        let span = info_span!("agent.run", model = %self.config.model);
        async {
            match self.execute(task, &mut log).await {
                Ok(result) => {
                    enter(RunPhase::Done);
                    Ok(result)
                }
                Err(err) => self.recover(err, task),
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        task: &str,
        log: &mut (impl FnMut(Step) + Send),
    ) -> Result<RunResult<T>> {
        enter(RunPhase::Preparing);
        let (task, run) = self.prepare(task)?;

        enter(RunPhase::Streaming);
        let result = self.stream(run, log).await?;

        enter(RunPhase::Finalizing);
        let result = result.ok_or(Error::NoFinalResult)?;
        Ok(self.hooks.apply_post_run(&task, result))
    }

    /// Resolve everything the engine needs. Returns the transformed task.
    fn prepare(&self, task: &str) -> Result<(String, EngineRun)> {
        let task = self.hooks.apply_pre_run(task.to_string());
        let extra_options = self.hooks.merged_options();

        let model_name = self.hooks.apply_model_setup(self.config.model.clone());
        let model = match self.hooks.select_model(&model_name) {
            Some(selected) => selected?,
            None => self.default_selector().select(&model_name)?,
        };
        debug!(model = %model_name, "Model resolved");

        let system_prompt = self
            .hooks
            .apply_system_prompt(self.config.render_system_prompt(&task), &task);

        let mut tools = self.tools.clone();
        let final_answer: SharedTool = Arc::new(FinalAnswerTool::<T>::new(
            self.config.final_answer_description.clone(),
        ));
        tools.push(final_answer);

        let run = EngineRun {
            system_prompt,
            model,
            tools,
            authorized_imports: self.config.additional_authorized_imports.clone(),
            max_steps: self.config.max_steps,
            extra_options,
        };
        Ok((task, run))
    }

    async fn stream(
        &self,
        run: EngineRun,
        log: &mut (impl FnMut(Step) + Send),
    ) -> Result<Option<RunResult<T>>> {
        let mut events = self.engine.start(run).await?;

        while let Some(event) = events.next().await {
            let event = self.hooks.apply_pre_step(event?);
            let formatted = format_step::<T>(&event)?;
            match self.hooks.apply_post_step(&event, formatted) {
                Formatted::Result(result) => {
                    debug!(kind = event.kind(), "Final result received");
                    return Ok(Some(result));
                }
                Formatted::Step(step) => {
                    debug!(
                        step_number = ?step.step_number,
                        parts = step.parts.len(),
                        tokens = ?event.token_usage().map(|usage| usage.total()),
                        "Step formatted"
                    );
                    log(step);
                }
            }
        }
        Ok(None)
    }

    fn recover(&self, err: Error, task: &str) -> Result<RunResult<T>> {
        enter(RunPhase::ErrorRecovery);
        match self.hooks.apply_error(&err, task) {
            Some(result) => {
                info!(error = %err, "Run recovered by error hook");
                Ok(result)
            }
            None => {
                warn!(error = %err, "Run failed");
                Err(err)
            }
        }
    }
}
