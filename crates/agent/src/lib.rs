//! The MeshPilot agent: reason-act-observe orchestration.
//!
//! This crate owns the loop that turns a user prompt into Blender actions:
//! prompt assembly, the iteration-bounded ReAct loop, Python code
//! sanitization, and the cache for deterministic sub-LLM turns.

pub mod cache;
pub mod orchestrator;
pub mod prompt;
pub mod sanitize;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use cache::{CodeCache, cache_key};
pub use orchestrator::{
    AgentRequest, AgentResponse, CANCELLED_MESSAGE, ConversationStore, LOOP_EXHAUSTED_MESSAGE,
    Orchestrator,
};
pub use sanitize::{sanitize, validate};
