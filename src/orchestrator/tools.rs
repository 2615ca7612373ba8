//! Concurrent tool dispatch within one cycle.
//!
//! All calls requested by the model in a cycle run concurrently as spawned
//! tasks, but their conversation entries are appended strictly in dispatch
//! order so replayed conversations are deterministic regardless of per-call
//! completion timing.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::error::{ErrorKind, UppError};
use crate::orchestrator::types::{ToolDecision, ToolUseStrategy};
use crate::orchestrator::validation::validate_schema;
use crate::streaming::StreamEvent;
use crate::types::tools::{ToolDefinition, ToolExecution};
use crate::types::{Message, ToolCallRequest};
use crate::utils::cancel::CancelHandle;

pub(crate) type EventSender = UnboundedSender<Result<StreamEvent, UppError>>;

/// What one tool round contributed to the turn.
pub(crate) struct ToolRoundOutcome {
    /// Tool-result conversation entries, in dispatch order.
    pub messages: Vec<Message>,
    /// Executions that actually ran (vetoed and rejected calls excluded).
    pub executions: Vec<ToolExecution>,
}

enum Pending {
    /// Resolved without running a handler (unknown tool, invalid arguments,
    /// strategy veto).
    Ready(Message),
    Running {
        call: ToolCallRequest,
        arguments: serde_json::Value,
        handle: JoinHandle<Result<serde_json::Value, UppError>>,
    },
}

/// Run every tool call of one cycle and capture the outcomes.
///
/// Handler failures and panics become error-flagged tool results and are fed
/// back to the model; the only failure this function raises is cancellation.
pub(crate) async fn run_tool_round(
    calls: &[ToolCallRequest],
    tools: &[ToolDefinition],
    strategy: &Arc<dyn ToolUseStrategy>,
    events: Option<&EventSender>,
    cancel: &CancelHandle,
) -> Result<ToolRoundOutcome, UppError> {
    let mut pending = Vec::with_capacity(calls.len());

    // Dispatch phase, in model order.
    for (ordinal, call) in calls.iter().enumerate() {
        let Some(tool) = tools.iter().find(|t| t.name() == call.tool_name) else {
            tracing::warn!(tool = %call.tool_name, "model requested unknown tool");
            pending.push(Pending::Ready(Message::tool_result(
                &call.tool_call_id,
                &call.tool_name,
                serde_json::json!({ "error": format!("unknown tool: {}", call.tool_name) }),
                true,
            )));
            continue;
        };

        if let Err(msg) = validate_schema(tool.parameters(), &call.arguments) {
            tracing::warn!(tool = %call.tool_name, error = %msg, "tool arguments rejected");
            pending.push(Pending::Ready(Message::tool_result(
                &call.tool_call_id,
                &call.tool_name,
                serde_json::json!({ "error": format!("invalid arguments: {msg}") }),
                true,
            )));
            continue;
        }

        let arguments = match strategy.before_call(&call.tool_name, &call.arguments).await {
            ToolDecision::Proceed => call.arguments.clone(),
            ToolDecision::ProceedWith(substituted) => substituted,
            ToolDecision::Skip { reason } => {
                tracing::debug!(tool = %call.tool_name, reason = %reason, "tool call vetoed");
                pending.push(Pending::Ready(Message::tool_result(
                    &call.tool_call_id,
                    &call.tool_name,
                    serde_json::json!({ "skipped": true, "reason": reason }),
                    false,
                )));
                continue;
            }
        };

        // Execution events carry the call's round ordinal as `index`, a
        // numbering separate from the cycle's content-block indices.
        if let Some(events) = events {
            let _ = events.send(Ok(StreamEvent::tool_execution_start(
                ordinal,
                &call.tool_call_id,
                &call.tool_name,
            )));
        }

        let handler = tool.handler();
        let task_args = arguments.clone();
        let task_cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { task_cancel.guard(handler.call(task_args)).await });
        pending.push(Pending::Running {
            call: call.clone(),
            arguments,
            handle,
        });
    }

    // Join phase, same order. Entries land in the conversation by dispatch
    // order even when a later call finishes first. `pending` holds one entry
    // per call, so these ordinals line up with the start events above.
    let mut messages = Vec::with_capacity(pending.len());
    let mut executions = Vec::new();

    for (ordinal, entry) in pending.into_iter().enumerate() {
        match entry {
            Pending::Ready(message) => messages.push(message),
            Pending::Running {
                call,
                arguments,
                handle,
            } => {
                let (result, is_error) = match handle.await {
                    Ok(Ok(value)) => (value, false),
                    Ok(Err(error)) => {
                        if error.kind() == ErrorKind::Cancelled && cancel.is_cancelled() {
                            return Err(error);
                        }
                        (serde_json::json!({ "error": error.to_string() }), true)
                    }
                    Err(join_error) => {
                        tracing::error!(
                            tool = %call.tool_name,
                            error = %join_error,
                            "tool task panicked"
                        );
                        (
                            serde_json::json!({ "error": "tool execution panicked" }),
                            true,
                        )
                    }
                };
                let (result, is_error) =
                    strategy.after_call(&call.tool_name, result, is_error).await;

                if let Some(events) = events {
                    let _ = events.send(Ok(StreamEvent::tool_execution_end(
                        ordinal,
                        &call.tool_call_id,
                        &call.tool_name,
                        result.clone(),
                        is_error,
                    )));
                }
                executions.push(ToolExecution {
                    tool_call_id: call.tool_call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    arguments,
                    result: result.clone(),
                    is_error,
                });
                messages.push(Message::tool_result(
                    &call.tool_call_id,
                    &call.tool_name,
                    result,
                    is_error,
                ));
            }
        }
    }

    Ok(ToolRoundOutcome {
        messages,
        executions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::types::AllowAll;
    use crate::types::ContentBlock;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn call(id: &str, name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest {
            tool_call_id: id.into(),
            tool_name: name.into(),
            arguments: args,
        }
    }

    fn open_schema() -> Value {
        json!({"type": "object"})
    }

    fn result_of(message: &Message) -> (&Value, bool) {
        match &message.content[0] {
            ContentBlock::ToolResult {
                result, is_error, ..
            } => (result, *is_error),
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn results_join_in_dispatch_order() {
        let tools = vec![
            ToolDefinition::from_fn("slow", "", open_schema(), |_| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(json!("slow done"))
                })
            }),
            ToolDefinition::from_fn("fast", "", open_schema(), |_| {
                Box::pin(async { Ok(json!("fast done")) })
            }),
        ];
        let strategy: Arc<dyn ToolUseStrategy> = Arc::new(AllowAll);
        let calls = [
            call("call_1", "slow", json!({})),
            call("call_2", "fast", json!({})),
        ];

        let outcome = run_tool_round(&calls, &tools, &strategy, None, &CancelHandle::new())
            .await
            .unwrap();

        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(result_of(&outcome.messages[0]).0, &json!("slow done"));
        assert_eq!(result_of(&outcome.messages[1]).0, &json!("fast done"));
        assert_eq!(outcome.executions[0].tool_call_id, "call_1");
        assert_eq!(outcome.executions[1].tool_call_id, "call_2");
    }

    #[tokio::test]
    async fn veto_leaves_skip_marker_and_no_execution() {
        struct DenyAll;
        #[async_trait]
        impl ToolUseStrategy for DenyAll {
            async fn before_call(&self, _tool_name: &str, _arguments: &Value) -> ToolDecision {
                ToolDecision::Skip {
                    reason: "not allowed".into(),
                }
            }
        }

        let tools = vec![ToolDefinition::from_fn("echo", "", open_schema(), |args| {
            Box::pin(async move { Ok(args) })
        })];
        let strategy: Arc<dyn ToolUseStrategy> = Arc::new(DenyAll);
        let calls = [call("call_1", "echo", json!({"x": 1}))];

        let outcome = run_tool_round(&calls, &tools, &strategy, None, &CancelHandle::new())
            .await
            .unwrap();

        assert!(outcome.executions.is_empty());
        let (result, is_error) = result_of(&outcome.messages[0]);
        assert!(!is_error);
        assert_eq!(result["skipped"], json!(true));
        assert_eq!(result["reason"], json!("not allowed"));
    }

    #[tokio::test]
    async fn invalid_arguments_become_error_result_without_running() {
        let tools = vec![ToolDefinition::from_fn(
            "lookup",
            "",
            json!({
                "type": "object",
                "properties": { "key": { "type": "string" } },
                "required": ["key"]
            }),
            |_| Box::pin(async { panic!("must not run") }),
        )];
        let strategy: Arc<dyn ToolUseStrategy> = Arc::new(AllowAll);
        let calls = [call("call_1", "lookup", json!({"key": 7}))];

        let outcome = run_tool_round(&calls, &tools, &strategy, None, &CancelHandle::new())
            .await
            .unwrap();

        assert!(outcome.executions.is_empty());
        let (result, is_error) = result_of(&outcome.messages[0]);
        assert!(is_error);
        assert!(result["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid arguments"));
    }

    #[tokio::test]
    async fn handler_panic_is_captured_as_error_result() {
        let tools = vec![ToolDefinition::from_fn("boom", "", open_schema(), |_| {
            Box::pin(async { panic!("kaboom") })
        })];
        let strategy: Arc<dyn ToolUseStrategy> = Arc::new(AllowAll);
        let calls = [call("call_1", "boom", json!({}))];

        let outcome = run_tool_round(&calls, &tools, &strategy, None, &CancelHandle::new())
            .await
            .unwrap();

        let (result, is_error) = result_of(&outcome.messages[0]);
        assert!(is_error);
        assert_eq!(result["error"], json!("tool execution panicked"));
        assert!(outcome.executions[0].is_error);
    }

    #[tokio::test]
    async fn after_call_hook_rewrites_result() {
        struct Redact;
        #[async_trait]
        impl ToolUseStrategy for Redact {
            async fn after_call(
                &self,
                _tool_name: &str,
                _result: Value,
                is_error: bool,
            ) -> (Value, bool) {
                (json!({"redacted": true}), is_error)
            }
        }

        let tools = vec![ToolDefinition::from_fn("secret", "", open_schema(), |_| {
            Box::pin(async { Ok(json!({"password": "hunter2"})) })
        })];
        let strategy: Arc<dyn ToolUseStrategy> = Arc::new(Redact);
        let calls = [call("call_1", "secret", json!({}))];

        let outcome = run_tool_round(&calls, &tools, &strategy, None, &CancelHandle::new())
            .await
            .unwrap();

        assert_eq!(result_of(&outcome.messages[0]).0, &json!({"redacted": true}));
        assert_eq!(outcome.executions[0].result, json!({"redacted": true}));
    }

    #[tokio::test]
    async fn execution_events_carry_round_ordinals() {
        use crate::streaming::EventKind;

        struct DenyNamed(&'static str);
        #[async_trait]
        impl ToolUseStrategy for DenyNamed {
            async fn before_call(&self, tool_name: &str, _arguments: &Value) -> ToolDecision {
                if tool_name == self.0 {
                    ToolDecision::Skip {
                        reason: "blocked".into(),
                    }
                } else {
                    ToolDecision::Proceed
                }
            }
        }

        let tools = vec![
            ToolDefinition::from_fn("blocked", "", open_schema(), |_| {
                Box::pin(async { panic!("must not run") })
            }),
            ToolDefinition::from_fn("slow", "", open_schema(), |_| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(json!(1))
                })
            }),
            ToolDefinition::from_fn("fast", "", open_schema(), |_| {
                Box::pin(async { Ok(json!(2)) })
            }),
        ];
        let strategy: Arc<dyn ToolUseStrategy> = Arc::new(DenyNamed("blocked"));
        let calls = [
            call("call_1", "blocked", json!({})),
            call("call_2", "slow", json!({})),
            call("call_3", "fast", json!({})),
        ];
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        run_tool_round(&calls, &tools, &strategy, Some(&tx), &CancelHandle::new())
            .await
            .unwrap();
        drop(tx);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            let event = event.unwrap();
            seen.push((event.kind, event.index));
        }
        // Vetoed calls emit nothing; running calls keep their dispatch
        // ordinal on both the start and end event, so an end can always be
        // matched to its start even when a later call finishes first.
        assert_eq!(
            seen,
            vec![
                (EventKind::ToolExecutionStart, 1),
                (EventKind::ToolExecutionStart, 2),
                (EventKind::ToolExecutionEnd, 1),
                (EventKind::ToolExecutionEnd, 2),
            ]
        );
    }

    #[tokio::test]
    async fn substituted_arguments_are_recorded() {
        struct Rewrite;
        #[async_trait]
        impl ToolUseStrategy for Rewrite {
            async fn before_call(&self, _tool_name: &str, _arguments: &Value) -> ToolDecision {
                ToolDecision::ProceedWith(json!({"limit": 10}))
            }
        }

        let tools = vec![ToolDefinition::from_fn("search", "", open_schema(), |args| {
            Box::pin(async move { Ok(args) })
        })];
        let strategy: Arc<dyn ToolUseStrategy> = Arc::new(Rewrite);
        let calls = [call("call_1", "search", json!({"limit": 10_000}))];

        let outcome = run_tool_round(&calls, &tools, &strategy, None, &CancelHandle::new())
            .await
            .unwrap();

        assert_eq!(outcome.executions[0].arguments, json!({"limit": 10}));
        assert_eq!(result_of(&outcome.messages[0]).0, &json!({"limit": 10}));
    }
}
