//! Multi-cycle turn orchestration.
//!
//! A turn is one caller-visible exchange: the orchestrator calls the model,
//! executes any tools it requests, feeds the results back, and repeats until
//! the model answers without tool calls or the cycle ceiling is hit. The
//! loop exists in two shapes with identical semantics: [`run_turn`] returns
//! the finished [`Turn`]; [`stream_turn`] additionally re-emits every
//! canonical event live through a [`TurnHandle`].
//!
//! The orchestrator depends on the [`LanguageModel`](crate::types::LanguageModel)
//! trait abstractly and never branches on vendor identity.

mod assemble;
mod generate;
mod stream;
mod tools;
mod types;
mod validation;

pub use generate::run_turn;
pub use stream::{stream_turn, TurnHandle};
pub use types::{
    AllowAll, CycleResult, ToolDecision, ToolUseStrategy, Turn, TurnOptions, TurnRequest,
};
