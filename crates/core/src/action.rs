//! ToolAction — the fixed set of tools the reasoning loop may emit.
//!
//! The decision document produced by the LLM names one tool per iteration.
//! Unknown tool names decode to [`ToolAction::Unknown`] so the loop can
//! record an error observation and keep going instead of aborting.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// One tool invocation decoded from a decision document.
///
/// Each case has a fixed shape; extra fields in the incoming JSON are
/// ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    SearchKnowledgeBase { query: String },
    GetSceneInfo,
    AssetSearchAndImport { prompt: String },
    ExecuteBlenderCode { code: String },
    FinishTask,
    /// A tool name the loop does not recognize.
    Unknown { tool: String },
}

/// Serialized back to the wire shape `from_value` reads: the tool name
/// under `"tool"` plus the variant's payload field, if any.
impl Serialize for ToolAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("tool", self.tool_name())?;
        match self {
            Self::SearchKnowledgeBase { query } => map.serialize_entry("query", query)?,
            Self::AssetSearchAndImport { prompt } => map.serialize_entry("prompt", prompt)?,
            Self::ExecuteBlenderCode { code } => map.serialize_entry("code", code)?,
            Self::GetSceneInfo | Self::FinishTask | Self::Unknown { .. } => {}
        }
        map.end()
    }
}

/// Why an action document could not be decoded at all.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionParseError {
    /// The `action` value is not a JSON object.
    NotAnObject,
    /// The object has no string `tool` field.
    MissingTool,
    /// A known tool is missing a required field.
    MissingField { tool: String, field: String },
}

impl std::fmt::Display for ActionParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "action is not a JSON object"),
            Self::MissingTool => write!(f, "action has no 'tool' field"),
            Self::MissingField { tool, field } => {
                write!(f, "tool '{tool}' is missing required field '{field}'")
            }
        }
    }
}

impl ToolAction {
    /// Decode an action from the raw decision JSON.
    pub fn from_value(value: &Value) -> Result<Self, ActionParseError> {
        let obj = value.as_object().ok_or(ActionParseError::NotAnObject)?;
        let tool = obj
            .get("tool")
            .and_then(|t| t.as_str())
            .ok_or(ActionParseError::MissingTool)?;

        let required = |field: &str| -> Result<String, ActionParseError> {
            obj.get(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| ActionParseError::MissingField {
                    tool: tool.to_string(),
                    field: field.to_string(),
                })
        };

        match tool {
            "search_knowledge_base" => Ok(Self::SearchKnowledgeBase {
                query: required("query")?,
            }),
            "get_scene_info" => Ok(Self::GetSceneInfo),
            "asset_search_and_import" => Ok(Self::AssetSearchAndImport {
                prompt: required("prompt")?,
            }),
            "execute_blender_code" => Ok(Self::ExecuteBlenderCode {
                code: required("code")?,
            }),
            "finish_task" => Ok(Self::FinishTask),
            other => Ok(Self::Unknown {
                tool: other.to_string(),
            }),
        }
    }

    /// The tool name as it appears on the wire.
    pub fn tool_name(&self) -> &str {
        match self {
            Self::SearchKnowledgeBase { .. } => "search_knowledge_base",
            Self::GetSceneInfo => "get_scene_info",
            Self::AssetSearchAndImport { .. } => "asset_search_and_import",
            Self::ExecuteBlenderCode { .. } => "execute_blender_code",
            Self::FinishTask => "finish_task",
            Self::Unknown { tool } => tool,
        }
    }
}
