//! Message, Conversation and SceneContext domain types.
//!
//! These are the value objects that flow through a request:
//! user prompt → agent loop → persisted assistant reply, with the latest
//! Blender scene snapshot carried alongside.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
}

/// A snapshot of the Blender scene as reported by the host.
///
/// Opaque to the core: we store it, serialize it into prompts, and pull
/// object names out for observations. Its internal schema belongs to the
/// host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneContext(pub serde_json::Value);

impl SceneContext {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Serialize for inclusion in a system prompt.
    pub fn to_prompt_block(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Names of scene objects, if the host reported an `objects` array.
    pub fn object_names(&self) -> Vec<String> {
        self.0
            .get("objects")
            .and_then(|v| v.as_array())
            .map(|objs| {
                objs.iter()
                    .filter_map(|o| o.get("name").and_then(|n| n.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null() || self.0 == serde_json::json!({})
    }
}

/// A single message in a conversation. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Which LLM provider produced this (assistant messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// The last host execution payload tied to this message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_result: Option<serde_json::Value>,

    /// Scene snapshot current when this message was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_context: Option<SceneContext>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Free-form metadata (agent history, loop count, progress, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            provider: None,
            host_result: None,
            scene_context: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// A conversation is an append-only, time-ordered sequence of messages
/// plus the most recent scene snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages (append-only)
    pub messages: Vec<Message>,

    /// Latest scene context reported by the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_context: Option<SceneContext>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,

    /// Conversation-level metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            scene_context: None,
            created_at: now,
            updated_at: now,
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a conversation with a known id (resumed session).
    pub fn with_id(id: ConversationId) -> Self {
        let mut conv = Self::new();
        conv.id = id;
        conv
    }

    /// Append a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Store or replace the latest scene snapshot.
    pub fn set_scene_context(&mut self, scene: SceneContext) {
        self.scene_context = Some(scene);
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_user_message() {
        let msg = Message::user("add a cube");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "add a cube");
        assert!(msg.provider.is_none());
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Message::user("First message"));
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn scene_context_object_names() {
        let scene = SceneContext::new(json!({
            "objects": [
                {"name": "Cube", "type": "MESH"},
                {"name": "Light", "type": "LIGHT"},
                {"type": "CAMERA"}
            ],
            "object_count": 3
        }));
        assert_eq!(scene.object_names(), vec!["Cube", "Light"]);
    }

    #[test]
    fn scene_context_replace() {
        let mut conv = Conversation::new();
        conv.set_scene_context(SceneContext::new(json!({"objects": []})));
        conv.set_scene_context(SceneContext::new(json!({"objects": [{"name": "Suzanne"}]})));
        let names = conv.scene_context.as_ref().unwrap().object_names();
        assert_eq!(names, vec!["Suzanne"]);
    }

    #[test]
    fn message_serialization_roundtrip() {
        let mut msg = Message::assistant("done");
        msg.provider = Some("gemini".into());
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "done");
        assert_eq!(back.provider.as_deref(), Some("gemini"));
    }
}
