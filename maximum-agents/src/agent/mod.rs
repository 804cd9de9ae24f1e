//! The agent: a hookable pipeline around an execution engine.
//!
//! An [`Agent`] owns its configuration, its tools, its [`HookRegistry`] and
//! the engine it drives. [`Agent::run`] turns a task into a validated
//! [`RunResult`](crate::record::RunResult), delivering every intermediate
//! [`Step`](crate::record::Step) to a caller-supplied log sink.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use maximum_agents::prelude::*;
//!
//! let mut agent = Agent::<BasicAnswer>::new(engine)
//!     .with_config(AgentConfig::new().with_system_prompt("You are a calculator."));
//! agent.hooks_mut().add_pre_run(|task| task.trim().to_string());
//!
//! let result = agent.run("2+2", |step| println!("{step:?}")).await?;
//! assert_eq!(result.answer.answer, "4");
//! ```

mod config;
mod runner;

use std::fmt;
use std::sync::Arc;

pub use config::{
    AgentConfig, DEFAULT_FINAL_ANSWER_DESCRIPTION, DEFAULT_MAX_STEPS, DEFAULT_MODEL,
};
pub use runner::RunPhase;

use crate::engine::SharedEngine;
use crate::hooks::HookRegistry;
use crate::model::{DefaultSelector, ModelFactory, ProviderFactory, default_selector};
use crate::record::BasicAnswer;
use crate::tool::{DynTool, SharedTool};

/// A hookable agent producing answers of type `T`.
pub struct Agent<T = BasicAnswer> {
    config: AgentConfig,
    tools: Vec<SharedTool>,
    hooks: HookRegistry<T>,
    engine: SharedEngine,
    factory: Option<Arc<dyn ModelFactory>>,
}

impl<T> fmt::Debug for Agent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("tools", &self.tool_names())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl<T> Agent<T> {
    /// Create an agent driving `engine` with the default configuration.
    #[must_use]
    pub fn new(engine: SharedEngine) -> Self {
        Self {
            config: AgentConfig::default(),
            tools: Vec::new(),
            hooks: HookRegistry::new(),
            engine,
            factory: None,
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a tool.
    #[must_use]
    pub fn tool(mut self, tool: impl DynTool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Add several shared tools.
    #[must_use]
    pub fn tools(mut self, tools: impl IntoIterator<Item = SharedTool>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Replace the factory used by the default selector.
    ///
    /// Without one, a [`ProviderFactory`] routing on the configured
    /// `cache_provider_marker` is used.
    #[must_use]
    pub fn with_model_factory(mut self, factory: Arc<dyn ModelFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Replace the hook registry.
    #[must_use]
    pub fn with_hooks(mut self, hooks: HookRegistry<T>) -> Self {
        self.hooks = hooks;
        self
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The hook registry.
    #[must_use]
    pub const fn hooks(&self) -> &HookRegistry<T> {
        &self.hooks
    }

    /// The hook registry, for registration and clearing.
    pub fn hooks_mut(&mut self) -> &mut HookRegistry<T> {
        &mut self.hooks
    }

    /// Names of the agent's own tools; `final_answer` is added per run.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// The selector used when no model-selection hook is registered.
    #[must_use]
    pub fn default_selector(&self) -> DefaultSelector {
        default_selector(
            self.model_factory(),
            self.config.cache_provider_marker.clone(),
            self.config.retry.clone(),
            self.config.cache,
        )
    }

    /// The factory building base transports for the default selector.
    #[must_use]
    pub fn model_factory(&self) -> Arc<dyn ModelFactory> {
        self.factory.as_ref().map_or_else(
            || {
                Arc::new(ProviderFactory::new(self.config.cache_provider_marker.clone()))
                    as Arc<dyn ModelFactory>
            },
            Arc::clone,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::engine::ScriptedEngine;
    use crate::error::Error;
    use crate::hooks::HookPoint;
    use crate::model::{Model, SharedModel};
    use crate::record::BasicAnswer;
    use crate::tool::FinalAnswerTool;

    #[test]
    fn builder_collects_tools_and_hooks() {
        let mut agent = Agent::<BasicAnswer>::new(Arc::new(ScriptedEngine::default()))
            .with_config(AgentConfig::new().with_max_steps(3))
            .tool(FinalAnswerTool::<BasicAnswer>::new("custom"));
        agent.hooks_mut().add_pre_run(|t| t);

        assert_eq!(agent.config().max_steps, 3);
        assert_eq!(agent.tool_names(), vec!["final_answer"]);
        assert_eq!(agent.hooks().len(HookPoint::PreRun), 1);
        assert!(format!("{agent:?}").contains("pre_run"));
    }

    fn assert_routed_to_anthropic(model: crate::error::Result<SharedModel>) {
        match model {
            Ok(model) => assert_eq!(model.provider_name(), "anthropic"),
            Err(Error::Llm(err)) => assert_eq!(err.provider.as_deref(), Some("anthropic")),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_factory_follows_configured_marker() {
        let agent = Agent::<BasicAnswer>::new(Arc::new(ScriptedEngine::default())).with_config(
            AgentConfig::new()
                .with_cache_provider_marker("claude")
                .with_model("claude-3-5-sonnet"),
        );

        assert_routed_to_anthropic(agent.model_factory().create("claude-3-5-sonnet"));
        assert_routed_to_anthropic(agent.default_selector().select("claude-3-5-sonnet"));
    }

    #[test]
    fn custom_factory_survives_config_changes() {
        let factory = |name: &str| -> crate::error::Result<SharedModel> {
            Ok(Arc::new(crate::model::MockModel::new(vec![]).with_id(name)) as SharedModel)
        };
        let agent = Agent::<BasicAnswer>::new(Arc::new(ScriptedEngine::default()))
            .with_model_factory(Arc::new(factory))
            .with_config(AgentConfig::new().with_cache_provider_marker("claude"));

        let model = agent.default_selector().select("claude-3-5-sonnet").unwrap();
        assert_eq!(model.model_id(), "claude-3-5-sonnet");
        assert_eq!(model.provider_name(), "unknown");
    }
}
