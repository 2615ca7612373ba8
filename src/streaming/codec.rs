//! JSON-transport codec for canonical stream events.
//!
//! The only wire-level artifact this core defines: a [`StreamEvent`] shape
//! safe for JSON transport. Binary delta payloads (and only those) are
//! base64-encoded; everything else is structurally identical, so
//! serialize→deserialize of a non-binary event is the identity.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UppError;
use crate::streaming::{EventDelta, EventKind, StreamEvent};
use crate::types::Usage;

/// JSON-transportable mirror of [`StreamEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub index: usize,
    pub delta: WireDelta,
}

/// JSON-transportable mirror of [`EventDelta`]: binary payloads become
/// standard base64 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireDelta {
    None,
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
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
    Object {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parsed: Option<serde_json::Value>,
    },
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
    Binary {
        /// Base64 (standard alphabet, padded) of the payload bytes.
        data: String,
    },
    Finish {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

/// Convert an event into its JSON-transportable form.
pub fn encode(event: &StreamEvent) -> WireEvent {
    let delta = match &event.delta {
        EventDelta::None => WireDelta::None,
        EventDelta::Text { text } => WireDelta::Text { text: text.clone() },
        EventDelta::Reasoning { text } => WireDelta::Reasoning { text: text.clone() },
        EventDelta::ToolCall {
            tool_call_id,
            tool_name,
            arguments_delta,
            parsed,
        } => WireDelta::ToolCall {
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.clone(),
            arguments_delta: arguments_delta.clone(),
            parsed: parsed.clone(),
        },
        EventDelta::Object { text, parsed } => WireDelta::Object {
            text: text.clone(),
            parsed: parsed.clone(),
        },
        EventDelta::ToolExecution {
            tool_call_id,
            tool_name,
            timestamp,
            result,
            is_error,
        } => WireDelta::ToolExecution {
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.clone(),
            timestamp: *timestamp,
            result: result.clone(),
            is_error: *is_error,
        },
        EventDelta::Binary { data } => WireDelta::Binary {
            data: BASE64.encode(data),
        },
        EventDelta::Finish { usage } => WireDelta::Finish {
            usage: usage.clone(),
        },
    };
    WireEvent {
        kind: event.kind,
        index: event.index,
        delta,
    }
}

/// Reverse of [`encode`]. Fails with `INVALID_REQUEST` when a binary payload
/// is not valid base64.
pub fn decode(event: WireEvent) -> Result<StreamEvent, UppError> {
    let delta = match event.delta {
        WireDelta::None => EventDelta::None,
        WireDelta::Text { text } => EventDelta::Text { text },
        WireDelta::Reasoning { text } => EventDelta::Reasoning { text },
        WireDelta::ToolCall {
            tool_call_id,
            tool_name,
            arguments_delta,
            parsed,
        } => EventDelta::ToolCall {
            tool_call_id,
            tool_name,
            arguments_delta,
            parsed,
        },
        WireDelta::Object { text, parsed } => EventDelta::Object { text, parsed },
        WireDelta::ToolExecution {
            tool_call_id,
            tool_name,
            timestamp,
            result,
            is_error,
        } => EventDelta::ToolExecution {
            tool_call_id,
            tool_name,
            timestamp,
            result,
            is_error,
        },
        WireDelta::Binary { data } => EventDelta::Binary {
            data: BASE64.decode(data.as_bytes()).map_err(|e| {
                UppError::invalid_request(format!("invalid base64 binary payload: {e}"))
            })?,
        },
        WireDelta::Finish { usage } => EventDelta::Finish { usage },
    };
    Ok(StreamEvent {
        kind: event.kind,
        index: event.index,
        delta,
    })
}

/// Serialize an event straight to a JSON string.
pub fn to_json(event: &StreamEvent) -> Result<String, UppError> {
    serde_json::to_string(&encode(event))
        .map_err(|e| UppError::invalid_request(format!("failed to serialize stream event: {e}")))
}

/// Deserialize an event from a JSON string.
pub fn from_json(json: &str) -> Result<StreamEvent, UppError> {
    let wire: WireEvent = serde_json::from_str(json)
        .map_err(|e| UppError::invalid_request(format!("failed to parse stream event: {e}")))?;
    decode(wire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_payload_roundtrips_exactly() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let event = StreamEvent {
            kind: EventKind::ContentBlockStart,
            index: 3,
            delta: EventDelta::Binary {
                data: payload.clone(),
            },
        };
        let wire = encode(&event);
        match &wire.delta {
            WireDelta::Binary { data } => assert!(!data.is_empty()),
            other => panic!("unexpected wire delta: {other:?}"),
        }
        let back = decode(wire).unwrap();
        match back.delta {
            EventDelta::Binary { data } => assert_eq!(data, payload),
            other => panic!("unexpected delta: {other:?}"),
        }
    }

    #[test]
    fn text_event_roundtrip_is_identity() {
        let event = StreamEvent::text_delta(0, "hello");
        let back = decode(encode(&event)).unwrap();
        assert_eq!(back, event);

        let json = to_json(&event).unwrap();
        assert_eq!(from_json(&json).unwrap(), event);
    }

    #[test]
    fn corrupt_base64_is_invalid_request() {
        let wire = WireEvent {
            kind: EventKind::TextDelta,
            index: 0,
            delta: WireDelta::Binary {
                data: "!!not-base64!!".into(),
            },
        };
        let err = decode(wire).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidRequest);
    }

    #[test]
    fn finish_usage_survives_transport() {
        let event = StreamEvent::message_stop(Some(Usage::new(11, 22)));
        let json = to_json(&event).unwrap();
        let back = from_json(&json).unwrap();
        assert_eq!(back, event);
    }
}
