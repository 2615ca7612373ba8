//! Assembles a canonical event stream back into a [`ModelResponse`].
//!
//! The assembler is also where best-effort parses get attached: tool-call and
//! object deltas passing through it are re-emitted with `parsed` filled in
//! from the accumulated argument text whenever the adapter left it absent.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::streaming::partial_json::PartialJson;
use crate::streaming::{EventDelta, EventKind, StreamEvent};
use crate::types::{ContentBlock, ModelResponse, Usage};

enum BlockAcc {
    Text(String),
    Reasoning(String),
    ToolCall {
        tool_call_id: String,
        tool_name: Option<String>,
        arguments: PartialJson,
    },
    Object(PartialJson),
    Binary(Vec<u8>),
}

/// Accumulates one cycle's events into content blocks, keyed by block index.
#[derive(Default)]
pub(crate) struct ResponseAssembler {
    blocks: BTreeMap<usize, BlockAcc>,
    usage: Option<Usage>,
}

impl ResponseAssembler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the accumulator and return it for re-emission,
    /// enriched with a `parsed` value where the adapter supplied none.
    pub(crate) fn observe(&mut self, event: StreamEvent) -> StreamEvent {
        let (kind, index) = (event.kind, event.index);
        match event.delta {
            EventDelta::Text { text } => {
                match self
                    .blocks
                    .entry(index)
                    .or_insert_with(|| BlockAcc::Text(String::new()))
                {
                    BlockAcc::Text(buf) => buf.push_str(&text),
                    _ => tracing::warn!(index, "text delta for a non-text block"),
                }
                StreamEvent {
                    kind,
                    index,
                    delta: EventDelta::Text { text },
                }
            }
            EventDelta::Reasoning { text } => {
                match self
                    .blocks
                    .entry(index)
                    .or_insert_with(|| BlockAcc::Reasoning(String::new()))
                {
                    BlockAcc::Reasoning(buf) => buf.push_str(&text),
                    _ => tracing::warn!(index, "reasoning delta for a non-reasoning block"),
                }
                StreamEvent {
                    kind,
                    index,
                    delta: EventDelta::Reasoning { text },
                }
            }
            EventDelta::ToolCall {
                tool_call_id,
                tool_name,
                arguments_delta,
                parsed,
            } => {
                let acc = self.blocks.entry(index).or_insert_with(|| {
                    BlockAcc::ToolCall {
                        tool_call_id: tool_call_id.clone(),
                        tool_name: None,
                        arguments: PartialJson::new(),
                    }
                });
                let parsed = match acc {
                    BlockAcc::ToolCall {
                        tool_name: name,
                        arguments,
                        ..
                    } => {
                        if name.is_none() {
                            name.clone_from(&tool_name);
                        }
                        let incremental = arguments.push(&arguments_delta);
                        parsed.or(incremental)
                    }
                    _ => {
                        tracing::warn!(index, "tool call delta for a non-tool block");
                        parsed
                    }
                };
                StreamEvent {
                    kind,
                    index,
                    delta: EventDelta::ToolCall {
                        tool_call_id,
                        tool_name,
                        arguments_delta,
                        parsed,
                    },
                }
            }
            EventDelta::Object { text, parsed } => {
                let acc = self
                    .blocks
                    .entry(index)
                    .or_insert_with(|| BlockAcc::Object(PartialJson::new()));
                let parsed = match acc {
                    BlockAcc::Object(buf) => {
                        let incremental = buf.push(&text);
                        parsed.or(incremental)
                    }
                    _ => {
                        tracing::warn!(index, "object delta for a non-object block");
                        parsed
                    }
                };
                StreamEvent {
                    kind,
                    index,
                    delta: EventDelta::Object { text, parsed },
                }
            }
            EventDelta::Binary { data } => {
                match self
                    .blocks
                    .entry(index)
                    .or_insert_with(|| BlockAcc::Binary(Vec::new()))
                {
                    BlockAcc::Binary(buf) => buf.extend_from_slice(&data),
                    _ => tracing::warn!(index, "binary delta for a non-binary block"),
                }
                StreamEvent {
                    kind,
                    index,
                    delta: EventDelta::Binary { data },
                }
            }
            EventDelta::Finish { usage } => {
                if kind == EventKind::MessageStop {
                    self.usage.clone_from(&usage);
                }
                StreamEvent {
                    kind,
                    index,
                    delta: EventDelta::Finish { usage },
                }
            }
            delta @ (EventDelta::None | EventDelta::ToolExecution { .. }) => {
                StreamEvent { kind, index, delta }
            }
        }
    }

    /// Seal the accumulator into the cycle's response, blocks in index order.
    pub(crate) fn finish(self) -> ModelResponse {
        let mut content = Vec::with_capacity(self.blocks.len());
        for (_, acc) in self.blocks {
            match acc {
                BlockAcc::Text(text) => content.push(ContentBlock::Text { text }),
                BlockAcc::Reasoning(text) => content.push(ContentBlock::Reasoning { text }),
                BlockAcc::ToolCall {
                    tool_call_id,
                    tool_name,
                    arguments,
                } => {
                    let raw = arguments.raw().trim();
                    let arguments = if raw.is_empty() {
                        serde_json::json!({})
                    } else {
                        arguments
                            .finish()
                            .unwrap_or_else(|| Value::String(raw.to_string()))
                    };
                    content.push(ContentBlock::ToolCall {
                        tool_call_id,
                        tool_name: tool_name.unwrap_or_default(),
                        arguments,
                    });
                }
                // Structured output arrives as object deltas but is recorded
                // as the message's text payload.
                BlockAcc::Object(buf) => content.push(ContentBlock::Text {
                    text: buf.raw().to_string(),
                }),
                BlockAcc::Binary(data) => content.push(ContentBlock::Image {
                    data,
                    media_type: "application/octet-stream".into(),
                }),
            }
        }
        ModelResponse {
            content,
            usage: self.usage,
        }
    }
}
