//! Error types for the MeshPilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all MeshPilot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Host transport errors ---
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    // --- LLM provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Asset integration errors ---
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Circuit breaker rejections ---
    #[error("Breaker error: {0}")]
    Breaker(#[from] BreakerError),

    // --- Agent loop errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("Host is not connected")]
    NotConnected,

    #[error("Reconnect budget exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("Host is busy with another request")]
    Busy,

    #[error("Command '{command}' timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Host reported an error: {message}")]
    ExecFailed { message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("No JSON decision could be extracted from model output: {0}")]
    InvalidOutput(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum AssetError {
    #[error("Integration '{0}' is not available on the host")]
    NotAvailable(String),

    #[error("Generation trial limit reached for '{provider}'")]
    TrialLimit { provider: String },

    #[error("Upstream provider '{provider}' failed: {message}")]
    Upstream { provider: String, message: String },

    #[error("Provider '{provider}' deadline exceeded after {elapsed_secs}s")]
    Timeout { provider: String, elapsed_secs: u64 },

    #[error("No matching asset found for '{query}'")]
    NoMatch { query: String },
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Store error: {0}")]
    Storage(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: encoder produces {actual}, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Error)]
pub enum BreakerError {
    #[error("Circuit breaker '{name}' is open, retry in {retry_in_secs}s")]
    Open { name: String, retry_in_secs: u64 },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("Agent reasoning failed: {0}")]
    ReasonFailed(#[source] ProviderError),

    #[error("Reasoning loop exhausted after {iterations} iterations")]
    LoopExhausted { iterations: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_error_displays_correctly() {
        let err = Error::Host(HostError::Timeout {
            command: "execute_code".into(),
            timeout_secs: 30,
        });
        assert!(err.to_string().contains("execute_code"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn breaker_error_carries_wait() {
        let err = BreakerError::Open {
            name: "sketchfab".into(),
            retry_in_secs: 42,
        };
        assert!(err.to_string().contains("sketchfab"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn reason_failed_wraps_provider_error() {
        let err = AgentError::ReasonFailed(ProviderError::InvalidOutput("no braces".into()));
        let msg = err.to_string();
        assert!(msg.contains("reasoning failed"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
