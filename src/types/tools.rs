//! Tool definitions and execution records.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UppError;

/// The executable action behind a tool.
///
/// Failures returned here are never raised as orchestrator failures; they
/// are captured as error-flagged tool results and fed back to the model.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: serde_json::Value) -> Result<serde_json::Value, UppError>;
}

type BoxToolFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, UppError>> + Send>>;

struct FnHandler<F>(F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> BoxToolFuture + Send + Sync,
{
    async fn call(&self, arguments: serde_json::Value) -> Result<serde_json::Value, UppError> {
        (self.0)(arguments).await
    }
}

/// The provider-facing part of a tool: what the model sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: serde_json::Value,
    /// Provider-specific hints, opaque to the core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A tool the orchestrator can dispatch: specification plus action.
#[derive(Clone)]
pub struct ToolDefinition {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.spec.name)
            .field("description", &self.spec.description)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    /// Create a tool from a name, description, parameter schema and handler.
    ///
    /// # Example
    ///
    /// ```rust
    /// use upp::types::tools::ToolDefinition;
    ///
    /// let tool = ToolDefinition::from_fn(
    ///     "get_weather",
    ///     "Get weather for a city",
    ///     serde_json::json!({
    ///         "type": "object",
    ///         "properties": { "city": { "type": "string" } },
    ///         "required": ["city"]
    ///     }),
    ///     |args| Box::pin(async move {
    ///         let city = args["city"].as_str().unwrap_or("unknown").to_string();
    ///         Ok(serde_json::json!({ "city": city, "temp_c": 21 }))
    ///     }),
    /// );
    /// assert_eq!(tool.name(), "get_weather");
    /// ```
    pub fn from_fn<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> BoxToolFuture + Send + Sync + 'static,
    {
        Self::new(name, description, parameters, Arc::new(FnHandler(handler)))
    }

    /// Create a tool from a trait-object handler.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            spec: ToolSpec {
                name: name.into(),
                description: description.into(),
                parameters,
                metadata: None,
            },
            handler,
        }
    }

    /// Attach provider-specific metadata, opaque to the core.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.spec.metadata = Some(metadata);
        self
    }

    /// The tool name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The argument schema.
    pub fn parameters(&self) -> &serde_json::Value {
        &self.spec.parameters
    }

    /// The provider-facing specification.
    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    /// The executable action.
    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

/// Record of one tool invocation within a turn.
///
/// Created when the call is dispatched, sealed when its result is recorded;
/// never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    #[serde(rename = "toolCallId")]
    pub tool_call_id: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    /// Arguments as actually executed (post pre-call hook).
    pub arguments: serde_json::Value,
    /// Result as recorded (post post-call hook).
    pub result: serde_json::Value,
    #[serde(rename = "isError")]
    pub is_error: bool,
}
