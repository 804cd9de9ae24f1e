//! Answer schema capability.
//!
//! A run is parameterized by the shape of its final answer. Any plain data
//! type that can be deserialized and described as JSON Schema qualifies.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ValidationError;

/// A typed shape a final-answer payload is validated into.
pub trait AnswerSchema: Sized + Send + Sync + 'static {
    /// Human-readable schema name, used in validation errors.
    fn answer_name() -> String;

    /// Validate an untyped payload into the typed answer.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the payload does not fit the schema.
    fn validate(payload: &Value) -> Result<Self, ValidationError>;

    /// JSON Schema describing the answer, without the `$schema` meta key.
    ///
    /// Used as the parameter schema of the `final_answer` tool.
    fn parameters_schema() -> Value;
}

impl<T> AnswerSchema for T
where
    T: DeserializeOwned + JsonSchema + Send + Sync + 'static,
{
    fn answer_name() -> String {
        <T as JsonSchema>::schema_name().into_owned()
    }

    fn validate(payload: &Value) -> Result<Self, ValidationError> {
        T::deserialize(payload)
            .map_err(|e| ValidationError::new(<T as AnswerSchema>::answer_name(), e.to_string()))
    }

    fn parameters_schema() -> Value {
        schema_value::<T>()
    }
}

/// JSON Schema of `T` without the `$schema` meta key, as LLM APIs expect it.
#[must_use]
pub fn schema_value<T: JsonSchema>() -> Value {
    let root = schemars::schema_for!(T);
    let mut value = serde_json::to_value(&root).unwrap_or_default();
    if let Value::Object(ref mut map) = value {
        map.remove("$schema");
    }
    value
}
