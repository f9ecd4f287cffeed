//! System prompt assembly for the reasoning loop.
//!
//! The prompt is rebuilt every iteration from the latest scene snapshot
//! and retrieval context; nothing here is stateful.

use meshpilot_core::message::SceneContext;

const PREAMBLE: &str = "\
You are MeshPilot, an agent that controls Blender on behalf of the user. \
You work in a strict reason-act-observe loop. Each turn you emit exactly one \
JSON object of the form {\"thought\": \"...\", \"action\": {\"tool\": \"...\", ...}} \
and nothing else.";

const TOOL_CATALOG: &str = "\
Available tools:
- search_knowledge_base {query}: look up Blender documentation for an API or technique.
- get_scene_info {}: inspect the current scene (objects, counts, materials).
- asset_search_and_import {prompt}: import or generate a 3D asset matching the prompt.
- execute_blender_code {code}: run Python code in Blender. The code must use bpy.
- finish_task {}: end the task. Your thought is the final answer shown to the user.";

const HARD_RULES: &str = "\
Rules:
- Search the knowledge base before writing non-trivial Blender code.
- Inspect the scene with get_scene_info when you are unsure what exists.
- Take exactly one action per turn.
- Your final turn must be finish_task; its thought is the only text the user sees.";

/// Build the per-iteration system prompt.
pub fn build_system_prompt(scene: Option<&SceneContext>, retrieval: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\n");
    prompt.push_str(TOOL_CATALOG);
    prompt.push_str("\n\n");
    prompt.push_str(HARD_RULES);

    match scene {
        Some(scene) if !scene.is_empty() => {
            prompt.push_str("\n\nCurrent scene:\n");
            prompt.push_str(&scene.to_prompt_block());
        }
        _ => {
            prompt.push_str("\n\nCurrent scene: unknown (the host has not reported it yet).");
        }
    }

    if !retrieval.is_empty() {
        prompt.push_str("\n\nRelevant documentation:\n");
        for doc in retrieval {
            prompt.push_str("- ");
            prompt.push_str(doc);
            prompt.push('\n');
        }
    }

    prompt
}

/// System prompt for the auxiliary code-synthesis turn used when an asset
/// integration is unavailable.
pub fn asset_fallback_system_prompt() -> String {
    "You write Blender Python. Reply with only a Python program (no prose, no \
     fences) that approximates the requested asset using bpy primitives and \
     modifiers. The program must start with 'import bpy'."
        .to_string()
}

/// User prompt for the auxiliary code-synthesis turn.
pub fn asset_fallback_user_prompt(asset_prompt: &str) -> String {
    format!("Create this asset from scratch with bpy: {asset_prompt}")
}
