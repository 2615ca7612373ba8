//! upp
//!
//! Provider-agnostic core for LLM APIs: one canonical streaming-event
//! vocabulary, a closed error taxonomy, pluggable retry/rate-limit
//! strategies, and a multi-cycle turn orchestrator that drives tool use
//! against any [`LanguageModel`](types::LanguageModel) implementation.
//!
//! Provider adapters translate vendor wire formats into the canonical types
//! at the edge; everything in this crate is vendor-blind.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use upp::orchestrator::{run_turn, TurnOptions, TurnRequest};
//! use upp::types::Message;
//!
//! let turn = run_turn(
//!     model.as_ref(),
//!     TurnRequest::new(vec![Message::user("What's the weather in Paris?")])
//!         .with_tools(vec![weather_tool]),
//!     TurnOptions::default(),
//! )
//! .await?;
//! println!("{}", turn.response.text().unwrap_or_default());
//! ```
#![deny(unsafe_code)]

pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod streaming;
pub mod types;
pub mod utils;

pub use error::{ErrorKind, UppError};

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::error::{ErrorKind, UppError};
    pub use crate::orchestrator::{
        run_turn, stream_turn, ToolDecision, ToolUseStrategy, Turn, TurnHandle, TurnOptions,
        TurnRequest,
    };
    pub use crate::retry::{ExponentialBackoff, RetryExecutor, RetryStrategy};
    pub use crate::streaming::{EventDelta, EventKind, EventStream, StreamEvent};
    pub use crate::types::tools::{ToolDefinition, ToolExecution, ToolSpec};
    pub use crate::types::{
        ContentBlock, LanguageModel, Message, MessageRole, ModelRequest, ModelResponse,
        ToolCallRequest, Usage,
    };
    pub use crate::utils::cancel::CancelHandle;
}
