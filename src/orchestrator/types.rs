//! Turn results, options and tool-use strategy hooks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::tools::{ToolDefinition, ToolExecution};
use crate::types::{Message, ModelResponse, ToolCallRequest, Usage};
use crate::utils::cancel::CancelHandle;

/// The result of one caller-visible invocation, possibly spanning several
/// model-call/tool-round cycles. Constructed fresh per invocation and owned
/// by the caller once returned; holds no cross-invocation state.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Unique id for correlation in logs.
    pub id: String,
    /// Number of cycles consumed.
    pub cycles: u32,
    /// Conversation entries produced by this turn, in order, ready to be
    /// appended to the caller's history.
    pub messages: Vec<Message>,
    /// The assembled final message.
    pub response: ModelResponse,
    /// Token usage accumulated across all cycles.
    pub usage: Usage,
    /// Every tool invocation that occurred, in dispatch order.
    pub tool_executions: Vec<ToolExecution>,
    /// Parsed structured output, present only when a schema was supplied.
    pub data: Option<Value>,
}

/// Input to one turn: conversation, capabilities and constraints.
#[derive(Default)]
pub struct TurnRequest {
    /// Conversation history, oldest first.
    pub messages: Vec<Message>,
    /// Optional system instructions.
    pub system: Option<String>,
    /// Tools the model may call, with their executable actions.
    pub tools: Vec<ToolDefinition>,
    /// Optional JSON schema the final answer must conform to.
    pub output_schema: Option<Value>,
}

impl TurnRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// Pre-call decision from a [`ToolUseStrategy`].
#[derive(Debug, Clone)]
pub enum ToolDecision {
    /// Execute with the model's arguments.
    Proceed,
    /// Execute with substituted arguments.
    ProceedWith(Value),
    /// Veto execution; the conversation entry carries a fixed skip marker
    /// and no `ToolExecution` is recorded.
    Skip { reason: String },
}

/// Caller-supplied hooks that can intercept, modify, or veto tool execution.
#[async_trait]
pub trait ToolUseStrategy: Send + Sync {
    /// Consulted before each tool call is dispatched.
    async fn before_call(&self, _tool_name: &str, _arguments: &Value) -> ToolDecision {
        ToolDecision::Proceed
    }

    /// May rewrite the captured result before it is appended to the
    /// conversation and recorded in the execution log.
    async fn after_call(
        &self,
        _tool_name: &str,
        result: Value,
        is_error: bool,
    ) -> (Value, bool) {
        (result, is_error)
    }
}

/// Default strategy: every call executes unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl ToolUseStrategy for AllowAll {}

/// Summary of one finished cycle, passed to `on_cycle_finish`.
#[derive(Debug, Clone)]
pub struct CycleResult {
    /// Messages contributed in this cycle (assistant + tool results).
    pub messages: Vec<Message>,
    /// Usage reported by the provider for this cycle.
    pub usage: Option<Usage>,
    /// Tool calls requested by the model in this cycle.
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Orchestrator options.
pub struct TurnOptions {
    /// Hard ceiling on cycles; exceeding it fails the turn. This is the
    /// orchestrator's primary safety property: a model can in principle
    /// request tools indefinitely.
    pub max_cycles: usize,
    /// Tool-use strategy hooks.
    pub strategy: Arc<dyn ToolUseStrategy>,
    /// Cycle-finish callback.
    pub on_cycle_finish: Option<Arc<dyn Fn(&CycleResult) + Send + Sync>>,
    /// Cancellation signal bound to every in-flight suspension.
    pub cancel: CancelHandle,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            max_cycles: 8,
            strategy: Arc::new(AllowAll),
            on_cycle_finish: None,
            cancel: CancelHandle::new(),
        }
    }
}

impl TurnOptions {
    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ToolUseStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_cycle_finish<F>(mut self, cb: F) -> Self
    where
        F: Fn(&CycleResult) + Send + Sync + 'static,
    {
        self.on_cycle_finish = Some(Arc::new(cb));
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}
