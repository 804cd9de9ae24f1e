//! Execution engine seam.
//!
//! The engine decides what the agent does next: it prompts the model, runs
//! the code the model writes and reports progress as an ordered, finite
//! stream of [`RawEvent`]s. The pipeline only consumes that stream.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::RawEvent;
use crate::hooks::ExtraOptions;
use crate::message::{ChatMessage, ChatMessageStreamDelta};
use crate::model::{GenerateOptions, Model, SharedModel};
use crate::tool::{DynTool, SharedTool, ToolDefinition};

/// Ordered stream of raw events from one engine run.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RawEvent>> + Send>>;

/// Everything an engine needs to start one run.
#[derive(Clone)]
pub struct EngineRun {
    /// Fully built system prompt, task included.
    pub system_prompt: String,
    /// The resolved model invoker.
    pub model: SharedModel,
    /// Tools available to the engine, `final_answer` last.
    pub tools: Vec<SharedTool>,
    /// Modules the generated code may import.
    pub authorized_imports: Vec<String>,
    /// Step budget enforced by the engine.
    pub max_steps: usize,
    /// Extra engine options merged from hooks.
    pub extra_options: ExtraOptions,
}

impl fmt::Debug for EngineRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRun")
            .field("system_prompt", &self.system_prompt)
            .field("model", &self.model.model_id())
            .field("tools", &self.tool_names())
            .field("authorized_imports", &self.authorized_imports)
            .field("max_steps", &self.max_steps)
            .field("extra_options", &self.extra_options)
            .finish()
    }
}

impl EngineRun {
    /// Names of the available tools, in order.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Definitions of the available tools, in order.
    #[must_use]
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }
}

/// Produces the raw event stream for a run.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Start a run.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot start; failures after start are
    /// reported as items of the stream.
    async fn start(&self, run: EngineRun) -> Result<EventStream>;
}

/// A shared execution engine.
pub type SharedEngine = Arc<dyn ExecutionEngine>;

/// One item of a [`ScriptedEngine`] script.
#[derive(Debug, Clone)]
pub enum ScriptItem {
    /// Emit a typed event.
    Event(RawEvent),
    /// Emit an untyped event, decoded at the boundary.
    Raw(Value),
    /// Fail the stream with an engine error.
    Fail(String),
}

impl From<RawEvent> for ScriptItem {
    fn from(event: RawEvent) -> Self {
        Self::Event(event)
    }
}

/// An engine that replays a fixed script.
///
/// With a model probe enabled, each run first calls the model once with the
/// system prompt and the tool definitions and emits the reply as a stream
/// delta. The last [`EngineRun`] and the number of items pulled are recorded.
#[derive(Default)]
pub struct ScriptedEngine {
    script: Vec<ScriptItem>,
    probe_model: bool,
    start_error: Option<String>,
    last_run: Mutex<Option<EngineRun>>,
    pulled: Arc<AtomicUsize>,
}

impl fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("script", &self.script)
            .field("probe_model", &self.probe_model)
            .field("start_error", &self.start_error)
            .finish_non_exhaustive()
    }
}

impl ScriptedEngine {
    /// Create an engine replaying `script`.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = ScriptItem>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Create an engine replaying typed events.
    #[must_use]
    pub fn from_events(events: impl IntoIterator<Item = RawEvent>) -> Self {
        Self::new(events.into_iter().map(ScriptItem::Event))
    }

    /// Call the model once before replaying the script.
    #[must_use]
    pub const fn with_model_probe(mut self) -> Self {
        self.probe_model = true;
        self
    }

    /// Fail every start with an engine error.
    #[must_use]
    pub fn failing_start(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    /// The most recent run request.
    #[must_use]
    pub fn last_run(&self) -> Option<EngineRun> {
        self.last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of script items pulled from streams so far.
    #[must_use]
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    async fn start(&self, run: EngineRun) -> Result<EventStream> {
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = Some(run.clone());

        if let Some(message) = &self.start_error {
            return Err(Error::engine(message.clone()));
        }

        let mut prelude = Vec::new();
        if self.probe_model {
            let options = GenerateOptions::new()
                .with_stop_sequences(vec!["<end_code>".to_string(), "Observation:".to_string()])
                .with_tools(run.tool_definitions());
            let response = run
                .model
                .generate(vec![ChatMessage::system(run.system_prompt.clone())], options)
                .await?;
            prelude.push(Ok(RawEvent::StreamDelta(ChatMessageStreamDelta {
                content: response.text(),
                token_usage: response.token_usage,
            })));
        }

        let pulled = Arc::clone(&self.pulled);
        let scripted = stream::iter(self.script.clone()).map(move |item| {
            pulled.fetch_add(1, Ordering::SeqCst);
            match item {
                ScriptItem::Event(event) => Ok(event),
                ScriptItem::Raw(value) => RawEvent::from_value(value),
                ScriptItem::Fail(message) => Err(Error::engine(message)),
            }
        });

        Ok(Box::pin(stream::iter(prelude).chain(scripted)))
    }
}
