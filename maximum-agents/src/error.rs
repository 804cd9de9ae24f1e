//! Unified error types for the agent pipeline.
//!
//! This module provides the error hierarchy covering:
//! - Model transport errors, classified by [`LlmErrorKind`] so the retry layer
//!   can tell transient failures from fatal ones
//! - Pipeline errors (unknown event kinds, missing final result, hook misuse)
//! - Final-answer validation errors
//! - Tool and storage policy errors

use std::fmt;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the agent pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Model transport error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// The execution engine emitted an event of a kind the formatter does not know.
    #[error("Unrecognized event kind: {0}")]
    UnrecognizedEventKind(String),

    /// An argument was outside the accepted domain (e.g. an unknown hook point name).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A final-answer payload did not satisfy the answer schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The event sequence ended without producing a final result.
    #[error("No final result found")]
    NoFinalResult,

    /// The execution engine failed to start or aborted mid-run.
    #[error("Engine error: {0}")]
    Engine(String),

    /// A storage operation was rejected by its access control.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Tool execution error.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Create an engine error with a message.
    #[must_use]
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an access denied error.
    #[must_use]
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Returns the transport error kind, if this is a model transport error.
    #[must_use]
    pub const fn llm_kind(&self) -> Option<LlmErrorKind> {
        match self {
            Self::Llm(err) => Some(err.kind),
            _ => None,
        }
    }
}

/// A final-answer payload rejected by its answer schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Validation failed for {schema}: {message}")]
pub struct ValidationError {
    /// Name of the schema the payload was validated against.
    pub schema: String,
    /// Why the payload was rejected.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error.
    #[must_use]
    pub fn new(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            message: message.into(),
        }
    }
}

/// Error type for model transport operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LlmError {
    /// The error kind.
    pub kind: LlmErrorKind,
    /// The provider name (e.g., "openai", "anthropic").
    pub provider: Option<String>,
    /// Additional error message.
    pub message: String,
    /// Optional error code from the provider.
    pub code: Option<String>,
}

/// Categories of model transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum LlmErrorKind {
    /// Authentication or authorization failure.
    Auth,
    /// Rate limit exceeded.
    RateLimited,
    /// Invalid request parameters.
    InvalidRequest,
    /// Response format error.
    ResponseFormat,
    /// Network or connection error.
    Network,
    /// Non-success HTTP status outside the other categories.
    HttpStatus,
    /// The provider reported an internal server error (HTTP 5xx).
    InternalServer,
    /// Provider-specific error.
    Provider,
    /// Feature not supported.
    NotSupported,
}

impl LlmError {
    const fn with_kind(kind: LlmErrorKind, message: String) -> Self {
        Self {
            kind,
            provider: None,
            message,
            code: None,
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(LlmErrorKind::Auth, message.into()).with_provider(provider)
    }

    /// Create a rate limit error.
    #[must_use]
    pub fn rate_limited(provider: impl Into<String>) -> Self {
        Self::with_kind(
            LlmErrorKind::RateLimited,
            "Rate limit exceeded. Please retry after some time.".into(),
        )
        .with_provider(provider)
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_kind(LlmErrorKind::InvalidRequest, message.into())
    }

    /// Create a response format error.
    #[must_use]
    pub fn response_format(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::with_kind(
            LlmErrorKind::ResponseFormat,
            format!("Expected {}, got {}", expected.into(), got.into()),
        )
    }

    /// Create a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::with_kind(LlmErrorKind::Network, message.into())
    }

    /// Create an internal server error.
    #[must_use]
    pub fn internal_server(message: impl Into<String>) -> Self {
        Self::with_kind(LlmErrorKind::InternalServer, message.into())
    }

    /// Create a provider-specific error.
    #[must_use]
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(LlmErrorKind::Provider, message.into()).with_provider(provider)
    }

    /// Create a not supported error.
    #[must_use]
    pub fn not_supported(feature: impl Into<String>) -> Self {
        Self::with_kind(
            LlmErrorKind::NotSupported,
            format!("Feature not supported: {}", feature.into()),
        )
    }

    /// Classify a non-success HTTP response.
    #[must_use]
    pub fn from_status(provider: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => LlmErrorKind::Auth,
            429 => LlmErrorKind::RateLimited,
            400 | 404 | 413 | 422 => LlmErrorKind::InvalidRequest,
            500..=599 => LlmErrorKind::InternalServer,
            _ => LlmErrorKind::HttpStatus,
        };
        Self {
            kind,
            provider: Some(provider.into()),
            message: format!("HTTP {status}: {}", body.into()),
            code: Some(status.to_string()),
        }
    }

    /// Attach the provider name.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{provider}] ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for LlmError {}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network(format!("Connection failed: {err}"))
        } else {
            Self::network(err.to_string())
        }
    }
}

/// Error type for tool execution failures.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ToolError {
    /// Error during tool execution.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Invalid arguments provided to the tool.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Tool not found.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// The call was rejected by an access policy.
    #[error("Forbidden by policy: {0}")]
    Forbidden(String),
}

impl ToolError {
    /// Create an execution error.
    #[must_use]
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create an invalid arguments error.
    #[must_use]
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a forbidden error.
    #[must_use]
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

impl From<ValidationError> for ToolError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    mod error {
        use super::*;

        #[test]
        fn engine_creates_error() {
            let err = Error::engine("sandbox crashed");
            assert!(matches!(err, Error::Engine(_)));
            assert!(err.to_string().contains("sandbox crashed"));
        }

        #[test]
        fn no_final_result_display() {
            assert_eq!(Error::NoFinalResult.to_string(), "No final result found");
        }

        #[test]
        fn validation_is_transparent() {
            let err: Error = ValidationError::new("BasicAnswer", "missing field `answer`").into();
            assert!(matches!(err, Error::Validation(_)));
            assert!(err.to_string().starts_with("Validation failed for BasicAnswer"));
        }

        #[test]
        fn llm_kind_only_for_transport_errors() {
            let err: Error = LlmError::internal_server("boom").into();
            assert_eq!(err.llm_kind(), Some(LlmErrorKind::InternalServer));
            assert_eq!(Error::NoFinalResult.llm_kind(), None);
        }

        #[test]
        fn from_json_error() {
            let json_err = serde_json::from_str::<i32>("invalid").unwrap_err();
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    mod llm_error {
        use super::*;

        #[test]
        fn auth_sets_provider() {
            let err = LlmError::auth("openai", "Invalid API key");
            assert_eq!(err.kind, LlmErrorKind::Auth);
            assert_eq!(err.provider.as_deref(), Some("openai"));
            assert!(err.code.is_none());
        }

        #[test]
        fn from_status_classifies() {
            assert_eq!(
                LlmError::from_status("anthropic", 500, "").kind,
                LlmErrorKind::InternalServer
            );
            assert_eq!(
                LlmError::from_status("anthropic", 529, "overloaded").kind,
                LlmErrorKind::InternalServer
            );
            assert_eq!(
                LlmError::from_status("openai", 429, "").kind,
                LlmErrorKind::RateLimited
            );
            assert_eq!(LlmError::from_status("openai", 401, "").kind, LlmErrorKind::Auth);
            assert_eq!(
                LlmError::from_status("openai", 418, "").kind,
                LlmErrorKind::HttpStatus
            );
        }

        #[test]
        fn display_includes_provider_and_code() {
            let err = LlmError::from_status("anthropic", 503, "unavailable");
            let text = err.to_string();
            assert!(text.starts_with("[anthropic] "));
            assert!(text.contains("HTTP 503: unavailable"));
            assert!(text.ends_with("(code: 503)"));
        }

        #[test]
        fn kind_serde_snake_case() {
            let json = serde_json::to_string(&LlmErrorKind::InternalServer).unwrap();
            assert_eq!(json, "\"internal_server\"");
        }
    }

    mod tool_error {
        use super::*;

        #[test]
        fn from_validation_error() {
            let err: ToolError = ValidationError::new("Answer", "bad").into();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }

        #[test]
        fn forbidden_display() {
            assert!(ToolError::forbidden("sql").to_string().contains("forbidden"));
        }
    }
}
