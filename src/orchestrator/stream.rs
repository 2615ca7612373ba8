//! Streaming turn loop.
//!
//! The turn is driven by a spawned task; the caller holds a [`TurnHandle`]
//! with a live canonical event stream on one side and the finished [`Turn`]
//! on the other. Provider events pass through the assembler and are
//! re-emitted to the caller as they arrive, enriched with best-effort parses;
//! tool-execution lifecycle events are interleaved between cycles.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::UppError;
use crate::orchestrator::assemble::ResponseAssembler;
use crate::orchestrator::generate::{final_data, notify_cycle};
use crate::orchestrator::tools::{run_tool_round, EventSender};
use crate::orchestrator::types::{Turn, TurnOptions, TurnRequest};
use crate::streaming::EventStream;
use crate::types::tools::{ToolExecution, ToolSpec};
use crate::types::{LanguageModel, Message, ModelRequest, Usage};
use crate::utils::cancel::{cancellable_events, CancelHandle};

/// Handle to an in-flight streaming turn.
pub struct TurnHandle {
    events: Option<EventStream>,
    cancel: CancelHandle,
    turn: oneshot::Receiver<Result<Turn, UppError>>,
}

impl TurnHandle {
    /// Take the live event stream.
    ///
    /// # Panics
    ///
    /// Panics if called twice; there is exactly one consumer.
    pub fn events(&mut self) -> EventStream {
        self.events
            .take()
            .unwrap_or_else(|| panic!("turn event stream already taken"))
    }

    /// The cancel handle bound to this turn.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancel the turn. The event stream yields a `CANCELLED` error and
    /// ends; [`finish`](Self::finish) resolves to the same error.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the turn to complete and return the assembled result.
    pub async fn finish(self) -> Result<Turn, UppError> {
        match self.turn.await {
            Ok(outcome) => outcome,
            Err(_) => Err(UppError::provider_error(
                "turn task terminated unexpectedly",
            )),
        }
    }
}

/// Start a streaming turn against `model`.
///
/// Events flow to the handle as they arrive; the final [`Turn`] carries the
/// same assembled response a non-streaming call would have produced.
pub fn stream_turn(
    model: Arc<dyn LanguageModel>,
    request: TurnRequest,
    options: TurnOptions,
) -> TurnHandle {
    let cancel = options.cancel.clone();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (turn_tx, turn_rx) = oneshot::channel();

    tokio::spawn(async move {
        let outcome = drive_turn(model, request, options, &event_tx).await;
        if let Err(error) = &outcome {
            let _ = event_tx.send(Err(error.clone()));
        }
        let _ = turn_tx.send(outcome);
    });

    let mut rx = event_rx;
    let raw: EventStream = Box::pin(async_stream::stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
    });
    TurnHandle {
        events: Some(cancellable_events(raw, cancel.clone())),
        cancel,
        turn: turn_rx,
    }
}

async fn drive_turn(
    model: Arc<dyn LanguageModel>,
    request: TurnRequest,
    options: TurnOptions,
    events: &EventSender,
) -> Result<Turn, UppError> {
    let turn_id = uuid::Uuid::new_v4().to_string();
    let max_cycles = options.max_cycles.max(1);
    let tool_specs: Vec<ToolSpec> = request.tools.iter().map(|t| t.spec().clone()).collect();

    let mut conversation = request.messages.clone();
    let mut turn_messages: Vec<Message> = Vec::new();
    let mut usage = Usage::default();
    let mut executions: Vec<ToolExecution> = Vec::new();

    for cycle in 1..=max_cycles {
        tracing::debug!(turn_id = %turn_id, cycle, provider = model.provider_id(), "model stream");
        let model_request = ModelRequest {
            messages: conversation.clone(),
            system: request.system.clone(),
            tools: tool_specs.clone(),
            output_schema: request.output_schema.clone(),
        };
        let mut stream = options.cancel.guard(model.stream(model_request)).await?;
        let mut assembler = ResponseAssembler::new();

        loop {
            let item = tokio::select! {
                _ = options.cancel.cancelled() => return Err(UppError::cancelled()),
                item = stream.next() => item,
            };
            let Some(item) = item else { break };
            let event = assembler.observe(item?);
            let _ = events.send(Ok(event));
        }

        let response = assembler.finish();
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
            Some(events),
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
