//! Session flows
//!
//! The highest-level composition: a [`BidiAction`](crate::BidiAction) whose
//! worker is a turn loop with session lifecycle and snapshot policy wired in.
//!
//! - [`SessionFlowBuilder`] / [`SessionFlow`]: define and start flows
//! - [`TurnContext`]: per-turn handle for the user's turn function
//! - [`StreamChunk`]: items streamed to the caller
//! - [`ModelGenerator`]: pluggable streaming generator

mod chunk;
mod coordinator;
mod generate;
mod session_flow;
mod turn;

pub use chunk::{GenerationChunk, StreamChunk};
pub use generate::{assemble_message, GenerationStream, ModelGenerator};
pub use session_flow::{FlowInit, FlowOptions, FlowOutput, SessionFlow, SessionFlowBuilder, TurnFn};
pub use turn::TurnContext;
