//! Tool trait and the built-in final-answer tool.
//!
//! Tools are capabilities the execution engine may call during a run. Every
//! run's tool set ends with a [`FinalAnswerTool`], through which the engine
//! reports its answer.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ToolError;
use crate::schema::AnswerSchema;

/// A type alias for `Result<T, ToolError>`.
pub type ToolResult<T> = Result<T, ToolError>;

/// Definition of a tool for LLM function calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool (e.g., "final_answer").
    pub name: String,
    /// Description of what the tool does.
    pub description: String,
    /// JSON schema for the tool's parameters.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// OpenAI function calling format:
    /// `{"type": "function", "function": {name, description, parameters}}`.
    #[must_use]
    pub fn to_openai_format(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

/// The core trait for all tools that agents can use.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Arguments type for the tool.
    type Args: for<'de> Deserialize<'de> + Send;

    /// Output type of the tool.
    type Output: Serialize + Send;

    /// Get the name of the tool.
    fn name(&self) -> &str;

    /// Get the description of the tool.
    fn description(&self) -> String;

    /// Get the JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn call(&self, args: Self::Args) -> ToolResult<Self::Output>;

    /// Get the tool definition for LLM function calling.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }

    /// Call the tool with JSON arguments and return JSON output.
    async fn call_json(&self, args: Value) -> ToolResult<Value>
    where
        Self::Output: 'static,
    {
        // Arguments may arrive as an encoded JSON string
        let typed_args: Self::Args = match &args {
            Value::String(s) => serde_json::from_str(s)?,
            _ => serde_json::from_value(args)?,
        };

        let result = self.call(typed_args).await?;
        serde_json::to_value(result).map_err(|e| ToolError::execution(e.to_string()))
    }
}

/// Object-safe version of the Tool trait for dynamic dispatch.
#[async_trait]
pub trait DynTool: Send + Sync {
    /// Get the name of the tool.
    fn name(&self) -> &str;

    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Call the tool with JSON arguments.
    async fn call_json(&self, args: Value) -> ToolResult<Value>;
}

#[async_trait]
impl<T: Tool + 'static> DynTool for T
where
    T::Output: 'static,
{
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn definition(&self) -> ToolDefinition {
        Tool::definition(self)
    }

    async fn call_json(&self, args: Value) -> ToolResult<Value> {
        Tool::call_json(self, args).await
    }
}

/// A shared dynamic tool.
pub type SharedTool = Arc<dyn DynTool>;

/// Name of the built-in final-answer tool.
pub const FINAL_ANSWER_TOOL: &str = "final_answer";

/// The tool through which the engine submits its final answer.
///
/// Its parameter schema is generated from the answer type `T`, and every
/// call is validated against `T` before the payload is accepted.
pub struct FinalAnswerTool<T> {
    description: String,
    _answer: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for FinalAnswerTool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalAnswerTool")
            .field("description", &self.description)
            .finish()
    }
}

impl<T> Clone for FinalAnswerTool<T> {
    fn clone(&self) -> Self {
        Self::new(self.description.clone())
    }
}

impl<T> FinalAnswerTool<T> {
    /// Create the tool with the given description.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            _answer: PhantomData,
        }
    }
}

#[async_trait]
impl<T: AnswerSchema> Tool for FinalAnswerTool<T> {
    type Args = Value;
    type Output = Value;

    fn name(&self) -> &str {
        FINAL_ANSWER_TOOL
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn parameters_schema(&self) -> Value {
        T::parameters_schema()
    }

    async fn call(&self, args: Value) -> ToolResult<Value> {
        T::validate(&args)?;
        Ok(args)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::BasicAnswer;

    struct Echo;

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
    }

    #[async_trait]
    impl Tool for Echo {
        type Args = EchoArgs;
        type Output = String;

        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> String {
            "Echo the input".into()
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn call(&self, args: EchoArgs) -> ToolResult<String> {
            Ok(args.text)
        }
    }

    #[test]
    fn openai_format_wraps_function() {
        let def = ToolDefinition::new("echo", "Echo", json!({"type": "object"}));
        let value = def.to_openai_format();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "echo");
    }

    #[tokio::test]
    async fn dyn_tool_accepts_string_or_object_args() {
        let tool: SharedTool = Arc::new(Echo);
        assert_eq!(tool.call_json(json!({"text": "a"})).await.unwrap(), json!("a"));
        assert_eq!(tool.call_json(json!("{\"text\":\"b\"}")).await.unwrap(), json!("b"));
        assert!(matches!(
            tool.call_json(json!({})).await.unwrap_err(),
            ToolError::InvalidArguments(_)
        ));
    }

    mod final_answer {
        use super::*;

        #[test]
        fn definition_uses_answer_schema() {
            let tool = FinalAnswerTool::<BasicAnswer>::new("The final answer to the user's question.");
            let def = Tool::definition(&tool);
            assert_eq!(def.name, FINAL_ANSWER_TOOL);
            assert_eq!(def.description, "The final answer to the user's question.");
            assert!(def.parameters["properties"].get("answer").is_some());
        }

        #[tokio::test]
        async fn call_validates_payload() {
            let tool: SharedTool = Arc::new(FinalAnswerTool::<BasicAnswer>::new("done"));
            let ok = tool.call_json(json!({"answer": "4"})).await.unwrap();
            assert_eq!(ok, json!({"answer": "4"}));

            let err = tool.call_json(json!({"answer": 4})).await.unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
    }
}
