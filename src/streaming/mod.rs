//! Canonical streaming event vocabulary.
//!
//! Every provider adapter's sole streaming obligation is to translate its
//! native stream into a well-formed sequence of [`StreamEvent`]s; every
//! consumer (orchestrator, assembler, codec, broadcaster) reads only these.
//!
//! Ordering invariant: `MessageStart` precedes everything and `MessageStop`
//! follows everything; for a given `index`, `ContentBlockStart` precedes all
//! delta events, which precede exactly one `ContentBlockStop`. A violation is
//! a programming error in an adapter, not a runtime-recoverable condition.

pub mod broadcast;
pub mod codec;
pub mod partial_json;

use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::UppError;
use crate::types::Usage;

/// Closed set of canonical event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageStart,
    ContentBlockStart,
    TextDelta,
    ReasoningDelta,
    ToolCallDelta,
    ObjectDelta,
    ToolExecutionStart,
    ToolExecutionEnd,
    ContentBlockStop,
    MessageStop,
}

/// Payload of a [`StreamEvent`], keyed by the owning event's kind.
///
/// Deltas only append or refine, never retract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDelta {
    /// No payload (block/message lifecycle markers).
    None,
    /// A text fragment.
    Text { text: String },
    /// A reasoning fragment.
    Reasoning { text: String },
    /// A tool-call fragment: raw incremental argument text plus the
    /// best-effort parse of everything accumulated so far. `parsed` is
    /// omitted (never stale) when the accumulated text is not yet parseable.
    ToolCall {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName", skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        #[serde(rename = "argumentsDelta")]
        arguments_delta: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parsed: Option<serde_json::Value>,
    },
    /// A structured-output fragment, with the same best-effort `parsed`
    /// semantics as tool-call deltas.
    Object {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parsed: Option<serde_json::Value>,
    },
    /// Tool-execution lifecycle fragment. `result`/`is_error` are present
    /// only on `ToolExecutionEnd`.
    ToolExecution {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// A binary fragment (image/audio deltas).
    Binary { data: Vec<u8> },
    /// Terminal fragment on `MessageStop`: the cycle's token usage, when the
    /// adapter can report it.
    Finish {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

/// One canonical streaming event.
///
/// `index` identifies which logical content block (text run, tool call,
/// reasoning block, image) the event belongs to; multiple events share an
/// index while a block is being built. Execution events
/// ([`EventKind::ToolExecutionStart`]/[`EventKind::ToolExecutionEnd`]) are
/// the exception: their `index` is the call's ordinal within the cycle's
/// tool round, a separate numbering from content-block indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub index: usize,
    pub delta: EventDelta,
}

impl StreamEvent {
    /// `message_start`
    pub fn message_start() -> Self {
        Self {
            kind: EventKind::MessageStart,
            index: 0,
            delta: EventDelta::None,
        }
    }

    /// `message_stop` carrying the cycle's usage, if known.
    pub fn message_stop(usage: Option<Usage>) -> Self {
        Self {
            kind: EventKind::MessageStop,
            index: 0,
            delta: EventDelta::Finish { usage },
        }
    }

    /// `content_block_start` for block `index`.
    pub fn content_block_start(index: usize) -> Self {
        Self {
            kind: EventKind::ContentBlockStart,
            index,
            delta: EventDelta::None,
        }
    }

    /// `content_block_stop` for block `index`.
    pub fn content_block_stop(index: usize) -> Self {
        Self {
            kind: EventKind::ContentBlockStop,
            index,
            delta: EventDelta::None,
        }
    }

    /// `text_delta` for block `index`.
    pub fn text_delta(index: usize, text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::TextDelta,
            index,
            delta: EventDelta::Text { text: text.into() },
        }
    }

    /// `reasoning_delta` for block `index`.
    pub fn reasoning_delta(index: usize, text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::ReasoningDelta,
            index,
            delta: EventDelta::Reasoning { text: text.into() },
        }
    }

    /// `tool_call_delta` for block `index`. `tool_name` is set on the first
    /// fragment of a call.
    pub fn tool_call_delta(
        index: usize,
        tool_call_id: impl Into<String>,
        tool_name: Option<String>,
        arguments_delta: impl Into<String>,
        parsed: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind: EventKind::ToolCallDelta,
            index,
            delta: EventDelta::ToolCall {
                tool_call_id: tool_call_id.into(),
                tool_name,
                arguments_delta: arguments_delta.into(),
                parsed,
            },
        }
    }

    /// `object_delta` for block `index`.
    pub fn object_delta(
        index: usize,
        text: impl Into<String>,
        parsed: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind: EventKind::ObjectDelta,
            index,
            delta: EventDelta::Object {
                text: text.into(),
                parsed,
            },
        }
    }

    /// `tool_execution_start`. `index` is the call's ordinal within the
    /// cycle's tool round (0 for the first dispatched call), not a
    /// content-block index.
    pub fn tool_execution_start(
        index: usize,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::ToolExecutionStart,
            index,
            delta: EventDelta::ToolExecution {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                timestamp: Utc::now(),
                result: None,
                is_error: None,
            },
        }
    }

    /// `tool_execution_end` with the captured result. `index` matches the
    /// round ordinal of the corresponding `tool_execution_start`.
    pub fn tool_execution_end(
        index: usize,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: serde_json::Value,
        is_error: bool,
    ) -> Self {
        Self {
            kind: EventKind::ToolExecutionEnd,
            index,
            delta: EventDelta::ToolExecution {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                timestamp: Utc::now(),
                result: Some(result),
                is_error: Some(is_error),
            },
        }
    }
}

/// A live canonical event stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, UppError>> + Send>>;
