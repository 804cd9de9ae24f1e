//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```rust,ignore
//! use maximum_agents::prelude::*;
//! ```

pub use crate::agent::{Agent, AgentConfig, RunPhase};
pub use crate::datastore::{AccessControl, ColumnInfo, DataStore, Row, SqlQueryTool};
pub use crate::engine::{
    EngineRun, EventStream, ExecutionEngine, ScriptItem, ScriptedEngine, SharedEngine,
};
pub use crate::error::{Error, LlmError, LlmErrorKind, Result, ToolError, ValidationError};
pub use crate::event::{ActionStep, FinalAnswerStep, PlanningStep, RawEvent};
pub use crate::format::format_step;
pub use crate::hooks::{Combination, ExtraOptions, HookPoint, HookRegistry};
pub use crate::message::{
    CacheControl, ChatMessage, ChatMessageStreamDelta, ContentBlock, MessageContent, MessageRole,
};
pub use crate::model::{
    CachePolicy, CachingModel, DefaultSelector, GenerateOptions, MockModel, MockReply, Model,
    ModelFactory, ModelResponse, ProviderFactory, RetryPolicy, RetryingModel, SharedModel,
    Sleeper,
};
pub use crate::providers::{AnthropicModel, OpenAiModel};
pub use crate::record::{BasicAnswer, Formatted, OutputKind, Part, RunResult, Step};
pub use crate::schema::AnswerSchema;
pub use crate::tool::{
    DynTool, FINAL_ANSWER_TOOL, FinalAnswerTool, SharedTool, Tool, ToolDefinition, ToolResult,
};
pub use crate::usage::TokenUsage;
