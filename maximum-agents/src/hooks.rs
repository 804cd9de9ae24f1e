//! Hook registry for intercepting every phase of a run.
//!
//! Hooks are plain synchronous callbacks grouped by [`HookPoint`]. Each point
//! has a fixed [`Combination`] rule, reported by [`HookPoint::combination`].
//! Dispatch consults it to pick the participating hooks before combining
//! their outputs. Registration order is always significant.
//!
//! # Example
//!
//! ```rust,ignore
//! use maximum_agents::hooks::{HookPoint, HookRegistry};
//! use maximum_agents::record::BasicAnswer;
//!
//! let mut hooks = HookRegistry::<BasicAnswer>::new();
//! hooks
//!     .add_pre_run(|task| task.trim().to_string())
//!     .add_system_prompt(|prompt, _task| format!("{prompt}\nBe concise."));
//! hooks.clear_named("pre_run")?;
//! assert!(hooks.is_empty_at(HookPoint::PreRun));
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::event::RawEvent;
use crate::model::SharedModel;
use crate::record::{Formatted, RunResult};

/// Extra engine options contributed by hooks.
pub type ExtraOptions = Map<String, Value>;

/// `task -> task`
pub type PreRunHook = Arc<dyn Fn(String) -> String + Send + Sync>;
/// `(task, result) -> result`
pub type PostRunHook<T> = Arc<dyn Fn(&str, RunResult<T>) -> RunResult<T> + Send + Sync>;
/// `raw event -> raw event`
pub type PreStepHook = Arc<dyn Fn(RawEvent) -> RawEvent + Send + Sync>;
/// `(raw event, formatted) -> formatted`
pub type PostStepHook<T> = Arc<dyn Fn(&RawEvent, Formatted<T>) -> Formatted<T> + Send + Sync>;
/// `(error, task) -> optional result`
pub type ErrorHook<T> = Arc<dyn Fn(&Error, &str) -> Option<RunResult<T>> + Send + Sync>;
/// `model name -> model name`
pub type ModelSetupHook = Arc<dyn Fn(String) -> String + Send + Sync>;
/// `model name -> invoker`
pub type ModelSelectionHook = Arc<dyn Fn(&str) -> Result<SharedModel> + Send + Sync>;
/// `() -> extra engine options`
pub type EngineOptionsHook = Arc<dyn Fn() -> ExtraOptions + Send + Sync>;
/// `(prompt, task) -> prompt`
pub type SystemPromptHook = Arc<dyn Fn(String, &str) -> String + Send + Sync>;

/// How multiple hooks registered on one point are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combination {
    /// Every hook runs in registration order, each receiving the previous output.
    Transform,
    /// Hooks run in order until one returns a value.
    FirstSome,
    /// Only the most recently registered hook runs.
    LastWins,
    /// Every hook runs; their maps are merged, later keys winning.
    Merge,
}

/// A named extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before the run, on the task.
    PreRun,
    /// After the run, on the result.
    PostRun,
    /// Before formatting each raw event.
    PreStep,
    /// After formatting each raw event.
    PostStep,
    /// When the run fails.
    Error,
    /// On the model name, before selection.
    ModelSetup,
    /// Turning the model name into an invoker.
    ModelSelection,
    /// Extra engine options.
    CodeagentKwargs,
    /// On the built system prompt.
    SystemPrompt,
}

impl HookPoint {
    /// Every hook point.
    pub const ALL: [Self; 9] = [
        Self::PreRun,
        Self::PostRun,
        Self::PreStep,
        Self::PostStep,
        Self::Error,
        Self::ModelSetup,
        Self::ModelSelection,
        Self::CodeagentKwargs,
        Self::SystemPrompt,
    ];

    /// The point's name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PreRun => "pre_run",
            Self::PostRun => "post_run",
            Self::PreStep => "pre_step",
            Self::PostStep => "post_step",
            Self::Error => "error",
            Self::ModelSetup => "model_setup",
            Self::ModelSelection => "model_selection",
            Self::CodeagentKwargs => "codeagent_kwargs",
            Self::SystemPrompt => "system_prompt",
        }
    }

    /// How hooks on this point combine.
    #[must_use]
    pub const fn combination(&self) -> Combination {
        match self {
            Self::Error => Combination::FirstSome,
            Self::ModelSelection => Combination::LastWins,
            Self::CodeagentKwargs => Combination::Merge,
            Self::PreRun
            | Self::PostRun
            | Self::PreStep
            | Self::PostStep
            | Self::ModelSetup
            | Self::SystemPrompt => Combination::Transform,
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|point| point.as_str() == s)
            .ok_or_else(|| Error::invalid_argument(format!("Unknown hook type: {s}")))
    }
}

/// Ordered hook collections, one per [`HookPoint`].
pub struct HookRegistry<T> {
    pre_run: Vec<PreRunHook>,
    post_run: Vec<PostRunHook<T>>,
    pre_step: Vec<PreStepHook>,
    post_step: Vec<PostStepHook<T>>,
    error: Vec<ErrorHook<T>>,
    model_setup: Vec<ModelSetupHook>,
    model_selection: Vec<ModelSelectionHook>,
    codeagent_kwargs: Vec<EngineOptionsHook>,
    system_prompt: Vec<SystemPromptHook>,
}

impl<T> Default for HookRegistry<T> {
    fn default() -> Self {
        Self {
            pre_run: Vec::new(),
            post_run: Vec::new(),
            pre_step: Vec::new(),
            post_step: Vec::new(),
            error: Vec::new(),
            model_setup: Vec::new(),
            model_selection: Vec::new(),
            codeagent_kwargs: Vec::new(),
            system_prompt: Vec::new(),
        }
    }
}

impl<T> Clone for HookRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            pre_run: self.pre_run.clone(),
            post_run: self.post_run.clone(),
            pre_step: self.pre_step.clone(),
            post_step: self.post_step.clone(),
            error: self.error.clone(),
            model_setup: self.model_setup.clone(),
            model_selection: self.model_selection.clone(),
            codeagent_kwargs: self.codeagent_kwargs.clone(),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

impl<T> fmt::Debug for HookRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for point in HookPoint::ALL {
            map.entry(&point.as_str(), &self.len(point));
        }
        map.finish()
    }
}

impl<T> HookRegistry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-run hook.
    pub fn add_pre_run<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.pre_run.push(Arc::new(hook));
        self
    }

    /// Register a post-run hook.
    pub fn add_post_run<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&str, RunResult<T>) -> RunResult<T> + Send + Sync + 'static,
    {
        self.post_run.push(Arc::new(hook));
        self
    }

    /// Register a pre-step hook.
    pub fn add_pre_step<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(RawEvent) -> RawEvent + Send + Sync + 'static,
    {
        self.pre_step.push(Arc::new(hook));
        self
    }

    /// Register a post-step hook.
    pub fn add_post_step<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RawEvent, Formatted<T>) -> Formatted<T> + Send + Sync + 'static,
    {
        self.post_step.push(Arc::new(hook));
        self
    }

    /// Register an error hook.
    pub fn add_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Error, &str) -> Option<RunResult<T>> + Send + Sync + 'static,
    {
        self.error.push(Arc::new(hook));
        self
    }

    /// Register a model-setup hook.
    pub fn add_model_setup<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.model_setup.push(Arc::new(hook));
        self
    }

    /// Register a model-selection hook. Only the latest one is ever used.
    pub fn add_model_selection<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&str) -> Result<SharedModel> + Send + Sync + 'static,
    {
        self.model_selection.push(Arc::new(hook));
        self
    }

    /// Register an extra-engine-options hook.
    pub fn add_codeagent_kwargs<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn() -> ExtraOptions + Send + Sync + 'static,
    {
        self.codeagent_kwargs.push(Arc::new(hook));
        self
    }

    /// Register a system-prompt hook.
    pub fn add_system_prompt<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(String, &str) -> String + Send + Sync + 'static,
    {
        self.system_prompt.push(Arc::new(hook));
        self
    }

    /// Empty one point, or every point when `point` is `None`.
    pub fn clear(&mut self, point: Option<HookPoint>) {
        let Some(point) = point else {
            for point in HookPoint::ALL {
                self.clear(Some(point));
            }
            return;
        };
        match point {
            HookPoint::PreRun => self.pre_run.clear(),
            HookPoint::PostRun => self.post_run.clear(),
            HookPoint::PreStep => self.pre_step.clear(),
            HookPoint::PostStep => self.post_step.clear(),
            HookPoint::Error => self.error.clear(),
            HookPoint::ModelSetup => self.model_setup.clear(),
            HookPoint::ModelSelection => self.model_selection.clear(),
            HookPoint::CodeagentKwargs => self.codeagent_kwargs.clear(),
            HookPoint::SystemPrompt => self.system_prompt.clear(),
        }
    }

    /// Empty a point by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the name is not a hook point.
    pub fn clear_named(&mut self, name: &str) -> Result<()> {
        let point = name.parse()?;
        self.clear(Some(point));
        Ok(())
    }

    /// Number of hooks registered on a point.
    #[must_use]
    pub fn len(&self, point: HookPoint) -> usize {
        match point {
            HookPoint::PreRun => self.pre_run.len(),
            HookPoint::PostRun => self.post_run.len(),
            HookPoint::PreStep => self.pre_step.len(),
            HookPoint::PostStep => self.post_step.len(),
            HookPoint::Error => self.error.len(),
            HookPoint::ModelSetup => self.model_setup.len(),
            HookPoint::ModelSelection => self.model_selection.len(),
            HookPoint::CodeagentKwargs => self.codeagent_kwargs.len(),
            HookPoint::SystemPrompt => self.system_prompt.len(),
        }
    }

    /// Check if a point has no hooks.
    #[must_use]
    pub fn is_empty_at(&self, point: HookPoint) -> bool {
        self.len(point) == 0
    }

    /// Total number of registered hooks.
    #[must_use]
    pub fn total(&self) -> usize {
        HookPoint::ALL.into_iter().map(|p| self.len(p)).sum()
    }

    pub(crate) fn apply_pre_run(&self, task: String) -> String {
        active(HookPoint::PreRun, &self.pre_run)
            .iter()
            .fold(task, |task, hook| hook(task))
    }

    pub(crate) fn apply_post_run(&self, task: &str, result: RunResult<T>) -> RunResult<T> {
        active(HookPoint::PostRun, &self.post_run)
            .iter()
            .fold(result, |result, hook| hook(task, result))
    }

    pub(crate) fn apply_pre_step(&self, event: RawEvent) -> RawEvent {
        active(HookPoint::PreStep, &self.pre_step)
            .iter()
            .fold(event, |event, hook| hook(event))
    }

    pub(crate) fn apply_post_step(&self, event: &RawEvent, formatted: Formatted<T>) -> Formatted<T> {
        active(HookPoint::PostStep, &self.post_step)
            .iter()
            .fold(formatted, |formatted, hook| hook(event, formatted))
    }

    pub(crate) fn apply_error(&self, error: &Error, task: &str) -> Option<RunResult<T>> {
        active(HookPoint::Error, &self.error)
            .iter()
            .find_map(|hook| hook(error, task))
    }

    pub(crate) fn apply_model_setup(&self, model: String) -> String {
        active(HookPoint::ModelSetup, &self.model_setup)
            .iter()
            .fold(model, |model, hook| hook(model))
    }

    /// Run the latest model-selection hook, if any is registered.
    pub(crate) fn select_model(&self, model: &str) -> Option<Result<SharedModel>> {
        active(HookPoint::ModelSelection, &self.model_selection)
            .first()
            .map(|hook| hook(model))
    }

    pub(crate) fn merged_options(&self) -> ExtraOptions {
        let mut merged = ExtraOptions::new();
        for hook in active(HookPoint::CodeagentKwargs, &self.codeagent_kwargs) {
            merged.extend(hook());
        }
        merged
    }

    pub(crate) fn apply_system_prompt(&self, prompt: String, task: &str) -> String {
        active(HookPoint::SystemPrompt, &self.system_prompt)
            .iter()
            .fold(prompt, |prompt, hook| hook(prompt, task))
    }
}

/// The hooks on `point` that take part in dispatch, in registration order.
fn active<H>(point: HookPoint, hooks: &[H]) -> &[H] {
    match point.combination() {
        Combination::LastWins => hooks.last().map_or(hooks, std::slice::from_ref),
        Combination::Transform | Combination::FirstSome | Combination::Merge => hooks,
    }
}
