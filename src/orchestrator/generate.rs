//! Non-streaming turn loop.

use crate::error::UppError;
use crate::orchestrator::tools::run_tool_round;
use crate::orchestrator::types::{CycleResult, Turn, TurnOptions, TurnRequest};
use crate::orchestrator::validation::finalize_structured_output;
use crate::types::tools::{ToolExecution, ToolSpec};
use crate::types::{LanguageModel, Message, ModelRequest, ModelResponse, Usage};

/// Run one complete turn against `model`, cycling through tool rounds until
/// the model answers without tool calls or the cycle ceiling is hit.
pub async fn run_turn(
    model: &dyn LanguageModel,
    request: TurnRequest,
    options: TurnOptions,
) -> Result<Turn, UppError> {
    let turn_id = uuid::Uuid::new_v4().to_string();
    let max_cycles = options.max_cycles.max(1);
    let tool_specs: Vec<ToolSpec> = request.tools.iter().map(|t| t.spec().clone()).collect();

    let mut conversation = request.messages.clone();
    let mut turn_messages: Vec<Message> = Vec::new();
    let mut usage = Usage::default();
    let mut executions: Vec<ToolExecution> = Vec::new();

    for cycle in 1..=max_cycles {
        tracing::debug!(turn_id = %turn_id, cycle, provider = model.provider_id(), "model call");
        let model_request = ModelRequest {
            messages: conversation.clone(),
            system: request.system.clone(),
            tools: tool_specs.clone(),
            output_schema: request.output_schema.clone(),
        };
        let response = options.cancel.guard(model.generate(model_request)).await?;

        if let Some(cycle_usage) = &response.usage {
            usage.merge(cycle_usage);
        }
        let assistant = response.to_message();
        conversation.push(assistant.clone());
        let mut cycle_messages = vec![assistant];

        let calls = response.tool_calls();
        if calls.is_empty() {
            turn_messages.extend(cycle_messages.clone());
            notify_cycle(&options, &cycle_messages, &response, &[]);
            let data = final_data(&request, &response)?;
            return Ok(Turn {
                id: turn_id,
                cycles: cycle as u32,
                messages: turn_messages,
                response,
                usage,
                tool_executions: executions,
                data,
            });
        }

        let round = run_tool_round(
            &calls,
            &request.tools,
            &options.strategy,
            None,
            &options.cancel,
        )
        .await?;
        conversation.extend(round.messages.iter().cloned());
        cycle_messages.extend(round.messages);
        executions.extend(round.executions);

        turn_messages.extend(cycle_messages.clone());
        notify_cycle(&options, &cycle_messages, &response, &calls);
    }

    Err(UppError::invalid_request(format!(
        "cycle limit exceeded: model still requesting tools after {max_cycles} cycles"
    )))
}

pub(crate) fn notify_cycle(
    options: &TurnOptions,
    messages: &[Message],
    response: &ModelResponse,
    calls: &[crate::types::ToolCallRequest],
) {
    if let Some(callback) = &options.on_cycle_finish {
        callback(&CycleResult {
            messages: messages.to_vec(),
            usage: response.usage.clone(),
            tool_calls: calls.to_vec(),
        });
    }
}

/// Parse and validate structured output from the final message.
pub(crate) fn final_data(
    request: &TurnRequest,
    response: &ModelResponse,
) -> Result<Option<serde_json::Value>, UppError> {
    let Some(schema) = &request.output_schema else {
        return Ok(None);
    };
    let text = response.text().unwrap_or_default();
    finalize_structured_output(Some(schema), &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::orchestrator::types::{ToolDecision, ToolUseStrategy};
    use crate::streaming::EventStream;
    use crate::types::tools::ToolDefinition;
    use crate::types::ContentBlock;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted model: returns canned responses in sequence.
    struct ScriptedModel {
        responses: Vec<ModelResponse>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(responses: Vec<ModelResponse>) -> Self {
            Self {
                responses,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn provider_id(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, UppError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(i)
                .cloned()
                .ok_or_else(|| UppError::provider_error("script exhausted"))
        }

        async fn stream(&self, _request: ModelRequest) -> Result<EventStream, UppError> {
            Err(UppError::provider_error("streaming not scripted"))
        }
    }

    fn tool_call_response(id: &str, name: &str, args: Value) -> ModelResponse {
        ModelResponse {
            content: vec![ContentBlock::ToolCall {
                tool_call_id: id.into(),
                tool_name: name.into(),
                arguments: args,
            }],
            usage: Some(Usage::new(10, 5)),
        }
    }

    fn final_response(text: &str) -> ModelResponse {
        ModelResponse {
            content: vec![ContentBlock::Text { text: text.into() }],
            usage: Some(Usage::new(20, 8)),
        }
    }

    fn echo_tool() -> ToolDefinition {
        ToolDefinition::from_fn("echo", "Echo arguments", json!({"type": "object"}), |args| {
            Box::pin(async move { Ok(args) })
        })
    }

    #[tokio::test]
    async fn single_cycle_turn_returns_final_text() {
        let model = ScriptedModel::new(vec![final_response("The answer is 4.")]);
        let turn = run_turn(
            &model,
            TurnRequest::new(vec![Message::user("2+2?")]),
            TurnOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(turn.cycles, 1);
        assert_eq!(turn.response.text().as_deref(), Some("The answer is 4."));
        assert!(turn.tool_executions.is_empty());
        assert_eq!(turn.messages.len(), 1);
        assert_eq!(turn.usage, Usage::new(20, 8));
    }

    #[tokio::test]
    async fn tool_cycle_feeds_result_back_and_accumulates_usage() {
        let model = ScriptedModel::new(vec![
            tool_call_response("call_1", "echo", json!({"x": 1})),
            final_response("done"),
        ]);
        let turn = run_turn(
            &model,
            TurnRequest::new(vec![Message::user("use the tool")])
                .with_tools(vec![echo_tool()]),
            TurnOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(turn.cycles, 2);
        assert_eq!(turn.tool_executions.len(), 1);
        assert_eq!(turn.tool_executions[0].result, json!({"x": 1}));
        // assistant + tool result + final assistant
        assert_eq!(turn.messages.len(), 3);
        assert_eq!(turn.usage, Usage::new(30, 13));
    }

    #[tokio::test]
    async fn cycle_limit_is_a_terminal_error() {
        let model = ScriptedModel::new(vec![
            tool_call_response("call_1", "echo", json!({})),
            tool_call_response("call_2", "echo", json!({})),
            tool_call_response("call_3", "echo", json!({})),
        ]);
        let err = run_turn(
            &model,
            TurnRequest::new(vec![Message::user("loop forever")])
                .with_tools(vec![echo_tool()]),
            TurnOptions::default().with_max_cycles(2),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.message().contains("cycle limit"));
    }

    #[tokio::test]
    async fn vetoed_turn_records_no_executions() {
        struct DenyAll;
        #[async_trait]
        impl ToolUseStrategy for DenyAll {
            async fn before_call(&self, _tool_name: &str, _arguments: &Value) -> ToolDecision {
                ToolDecision::Skip {
                    reason: "policy".into(),
                }
            }
        }

        let model = ScriptedModel::new(vec![
            tool_call_response("call_1", "echo", json!({})),
            final_response("done without tools"),
        ]);
        let turn = run_turn(
            &model,
            TurnRequest::new(vec![Message::user("try")]).with_tools(vec![echo_tool()]),
            TurnOptions::default().with_strategy(Arc::new(DenyAll)),
        )
        .await
        .unwrap();

        assert!(turn.tool_executions.is_empty());
        let skip_entry = turn
            .messages
            .iter()
            .find_map(|m| match &m.content[0] {
                ContentBlock::ToolResult { result, .. } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(skip_entry["skipped"], json!(true));
    }

    #[tokio::test]
    async fn structured_output_is_parsed_and_validated() {
        let schema = json!({
            "type": "object",
            "properties": { "answer": { "type": "number" } },
            "required": ["answer"]
        });
        let model = ScriptedModel::new(vec![final_response(r#"{"answer": 4}"#)]);
        let turn = run_turn(
            &model,
            TurnRequest::new(vec![Message::user("2+2?")]).with_output_schema(schema),
            TurnOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(turn.data, Some(json!({"answer": 4})));
    }

    #[tokio::test]
    async fn nonconforming_structured_output_fails_the_turn() {
        let schema = json!({
            "type": "object",
            "properties": { "answer": { "type": "number" } },
            "required": ["answer"]
        });
        let model = ScriptedModel::new(vec![final_response(r#"{"answer": "four"}"#)]);
        let err = run_turn(
            &model,
            TurnRequest::new(vec![Message::user("2+2?")]).with_output_schema(schema),
            TurnOptions::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn cycle_callback_sees_every_cycle() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in = Arc::clone(&seen);
        let model = ScriptedModel::new(vec![
            tool_call_response("call_1", "echo", json!({})),
            final_response("done"),
        ]);
        run_turn(
            &model,
            TurnRequest::new(vec![Message::user("go")]).with_tools(vec![echo_tool()]),
            TurnOptions::default()
                .on_cycle_finish(move |_cycle| {
                    seen_in.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
