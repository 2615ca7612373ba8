//! Canonical request/response types shared by every provider adapter.
//!
//! Provider adapters translate their native wire formats into these shapes;
//! nothing downstream (orchestrator, accumulator, codec) is aware of any
//! vendor format.

pub mod tools;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UppError;
use crate::streaming::EventStream;
use crate::types::tools::ToolSpec;

/// Token usage statistics, accumulated across cycles of a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input (prompt) tokens consumed.
    #[serde(rename = "inputTokens")]
    pub input_tokens: u64,
    /// Output (completion) tokens generated.
    #[serde(rename = "outputTokens")]
    pub output_tokens: u64,
    /// Input tokens served from the provider's prompt cache.
    #[serde(rename = "cacheReadTokens")]
    pub cache_read_tokens: u64,
    /// Input tokens written to the provider's prompt cache.
    #[serde(rename = "cacheWriteTokens")]
    pub cache_write_tokens: u64,
}

impl Usage {
    /// Create usage statistics with input/output counts only.
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
        }
    }

    /// Add another cycle's usage into this accumulator. Strictly additive.
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_write_tokens = self
            .cache_write_tokens
            .saturating_add(other.cache_write_tokens);
    }
}

/// Role of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A logical unit of model input or output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// A text run.
    Text { text: String },
    /// A reasoning/thinking segment.
    Reasoning { text: String },
    /// A binary image payload.
    Image {
        data: Vec<u8>,
        #[serde(rename = "mediaType")]
        media_type: String,
    },
    /// A tool invocation requested by the model.
    ToolCall {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// The outcome of a tool invocation, fed back to the model.
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        result: serde_json::Value,
        #[serde(rename = "isError")]
        is_error: bool,
    },
}

/// One conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Create an assistant message from plain text.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Create an assistant message from assembled content blocks.
    pub fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
        }
    }

    /// Create a tool-result message carrying one tool outcome.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: serde_json::Value,
        is_error: bool,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: vec![ContentBlock::ToolResult {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                result,
                is_error,
            }],
        }
    }

    /// Concatenated text of all text blocks, if any.
    pub fn text(&self) -> Option<String> {
        collect_text(&self.content)
    }
}

fn collect_text(blocks: &[ContentBlock]) -> Option<String> {
    let mut out = String::new();
    let mut found = false;
    for block in blocks {
        if let ContentBlock::Text { text } = block {
            out.push_str(text);
            found = true;
        }
    }
    found.then_some(out)
}

/// A tool invocation extracted from a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    #[serde(rename = "toolCallId")]
    pub tool_call_id: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// The assembled final message of one model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Ordered content blocks (text runs, reasoning, tool calls, images).
    pub content: Vec<ContentBlock>,
    /// Usage reported by the provider for this call, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ModelResponse {
    /// Create a text-only response.
    pub fn text_response(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            usage: None,
        }
    }

    /// Concatenated text of all text blocks, if any.
    pub fn text(&self) -> Option<String> {
        collect_text(&self.content)
    }

    /// Concatenated reasoning content, if any.
    pub fn reasoning(&self) -> Option<String> {
        let mut out = String::new();
        let mut found = false;
        for block in &self.content {
            if let ContentBlock::Reasoning { text } = block {
                out.push_str(text);
                found = true;
            }
        }
        found.then_some(out)
    }

    /// All tool calls present in the response, in content order.
    pub fn tool_calls(&self) -> Vec<ToolCallRequest> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolCall {
                    tool_call_id,
                    tool_name,
                    arguments,
                } => Some(ToolCallRequest {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Convert into the assistant conversation entry to append to history.
    pub fn to_message(&self) -> Message {
        Message::assistant_blocks(self.content.clone())
    }
}

/// One model call's input: conversation plus capabilities.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// Conversation history, oldest first.
    pub messages: Vec<Message>,
    /// Optional system instructions, prepended by the adapter.
    pub system: Option<String>,
    /// Tools the model may call (specification only, no handlers).
    pub tools: Vec<ToolSpec>,
    /// Optional JSON schema constraining the final answer.
    pub output_schema: Option<serde_json::Value>,
}

impl ModelRequest {
    /// Create a request from a conversation.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Attach system instructions.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Attach tool specifications.
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Attach an output schema for structured output.
    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// The provider boundary: "send conversation, get canonical events or a
/// single response", already translated from the vendor wire format.
///
/// One conforming implementation exists per vendor; the orchestrator depends
/// on this trait abstractly and never branches on vendor identity.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Stable provider id used for error attribution ("openai", ...).
    fn provider_id(&self) -> &str;

    /// Perform one model call and return the complete response.
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, UppError>;

    /// Perform one model call and return a live canonical event stream.
    ///
    /// The returned stream must satisfy the event ordering invariant:
    /// `message_start` first, block events bracketed by
    /// `content_block_start`/`content_block_stop` per index, `message_stop`
    /// last.
    async fn stream(&self, request: ModelRequest) -> Result<EventStream, UppError>;
}
