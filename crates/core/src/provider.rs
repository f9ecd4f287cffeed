//! DecisionProvider trait — the abstraction over LLM backends.
//!
//! A provider turns (system prompt, agent history) into a strict decision
//! document `{thought, action}`. Role conventions and response-format quirks
//! are normalized inside each implementation; the loop never sees them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{ActionParseError, ToolAction};
use crate::error::ProviderError;

/// Role of one turn in the request-scoped agent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// One turn of the agent history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

/// The request-scoped reasoning transcript.
///
/// Alternates user ↔ model after the initial user turn. Pushing two turns
/// with the same role merges them, so the alternation invariant holds by
/// construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentHistory {
    turns: Vec<Turn>,
}

impl AgentHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a history from the user's prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        let mut h = Self::new();
        h.push(TurnRole::User, prompt);
        h
    }

    pub fn push(&mut self, role: TurnRole, text: impl Into<String>) {
        let text = text.into();
        if let Some(last) = self.turns.last_mut()
            && last.role == role
        {
            last.text.push_str("\n\n");
            last.text.push_str(&text);
            return;
        }
        self.turns.push(Turn { role, text });
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(TurnRole::User, text);
    }

    pub fn push_model(&mut self, text: impl Into<String>) {
        self.push(TurnRole::Model, text);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// A parsed decision document: one thought, one action.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub thought: String,
    pub action: ToolAction,
}

impl Decision {
    /// Decode a decision from an extracted JSON object.
    ///
    /// A missing `thought` or a structurally broken `action` is a provider
    /// output error; an unrecognized tool name is not (it decodes to
    /// [`ToolAction::Unknown`] and the loop handles it).
    pub fn from_json(value: &Value) -> Result<Self, ProviderError> {
        let thought = value
            .get("thought")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ProviderError::InvalidOutput("decision has no 'thought'".into()))?
            .to_string();

        let action_value = value
            .get("action")
            .ok_or_else(|| ProviderError::InvalidOutput("decision has no 'action'".into()))?;

        let action = ToolAction::from_value(action_value).map_err(|e: ActionParseError| {
            ProviderError::InvalidOutput(format!("malformed action: {e}"))
        })?;

        Ok(Self { thought, action })
    }
}

/// The core decision-provider trait.
///
/// Implementations: Gemini, Claude. The orchestrator calls `decide` without
/// knowing which vendor is behind it.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini", "claude").
    fn name(&self) -> &str;

    /// Run one reasoning step and return the decoded decision.
    async fn decide(
        &self,
        system_prompt: &str,
        history: &AgentHistory,
        model: &str,
    ) -> std::result::Result<Decision, ProviderError>;

    /// Run a free-form generation turn (used for asset-fallback code
    /// synthesis). Returns the raw text.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
    ) -> std::result::Result<String, ProviderError>;
}

impl std::fmt::Debug for dyn DecisionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionProvider")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_merges_consecutive_same_role() {
        let mut h = AgentHistory::from_prompt("make a cube");
        h.push_user("Observation: scene is empty");
        assert_eq!(h.len(), 1);
        assert!(h.turns()[0].text.contains("make a cube"));
        assert!(h.turns()[0].text.contains("Observation"));

        h.push_model("{\"thought\":\"...\"}");
        h.push_user("Observation: done");
        assert_eq!(h.len(), 3);
        assert_eq!(h.turns()[1].role, TurnRole::Model);
    }

    #[test]
    fn decision_decodes() {
        let d = Decision::from_json(&json!({
            "thought": "The scene is empty, I should add a cube.",
            "action": {"tool": "execute_blender_code", "code": "import bpy"}
        }))
        .unwrap();
        assert!(d.thought.contains("cube"));
        assert!(matches!(d.action, ToolAction::ExecuteBlenderCode { .. }));
    }

    #[test]
    fn decision_without_thought_is_invalid() {
        let err = Decision::from_json(&json!({
            "action": {"tool": "finish_task"}
        }))
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidOutput(_)));
    }

    #[test]
    fn decision_with_unknown_tool_still_decodes() {
        let d = Decision::from_json(&json!({
            "thought": "hm",
            "action": {"tool": "fly_to_moon"}
        }))
        .unwrap();
        assert!(matches!(d.action, ToolAction::Unknown { .. }));
    }
}
