//! Maximum Agents - a hookable pipeline for code-executing reasoning agents.
//!
//! An [`Agent`](agent::Agent) hands a task to an execution engine, formats
//! every engine event into a typed [`Step`](record::Step) for the caller's log
//! sink, and returns the first final answer validated against a caller-chosen
//! schema. Nine [hook points](hooks::HookPoint) intercept the pipeline, and
//! model calls go through a resilient invoker that retries transient failures
//! and marks recent context as cache-eligible.

pub mod agent;
pub mod datastore;
pub mod engine;
pub mod error;
pub mod event;
pub mod format;
pub mod hooks;
pub mod message;
pub mod model;
pub mod prelude;
pub mod providers;
pub mod record;
pub mod schema;
pub mod tool;
pub mod usage;

pub use error::{Error, LlmError, Result, ToolError, ValidationError};
