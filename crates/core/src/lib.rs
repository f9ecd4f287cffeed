//! MeshPilot core — domain types and trait seams.
//!
//! This crate defines the vocabulary the rest of the workspace speaks:
//! conversations and messages, the tool-action set, the decision-provider
//! and host ports, the circuit breaker, and the progress log.

pub mod action;
pub mod breaker;
pub mod error;
pub mod host;
pub mod message;
pub mod progress;
pub mod provider;
pub mod retrieval;

pub use action::ToolAction;
pub use breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, GuardError};
pub use error::{
    AgentError, AssetError, BreakerError, Error, HostError, ProviderError, Result, RetrievalError,
};
pub use host::HostPort;
pub use message::{Conversation, ConversationId, Message, Role, SceneContext};
pub use progress::{ProgressLog, ProgressPatch, ProgressStep};
pub use provider::{AgentHistory, Decision, DecisionProvider, Turn, TurnRole};
pub use retrieval::KnowledgeSearch;
