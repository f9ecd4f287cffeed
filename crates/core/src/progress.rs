//! ProgressLog — append-only record of named steps within one request.
//!
//! This is the primary observability surface for a run. Steps are never
//! removed; `merge` patches the most recent step with a given name or
//! appends a fresh one.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One entry in the progress log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStep {
    /// Stable id for this entry.
    pub id: String,

    /// Step name (e.g. "agent_loop_3", "execute_code").
    pub step: String,

    /// Human-readable message.
    pub message: String,

    /// Millisecond timestamp.
    pub timestamp_ms: i64,

    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Optional error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only, mergeable log of progress steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressLog {
    steps: Vec<ProgressStep>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn add(&mut self, step: impl Into<String>, message: impl Into<String>, data: Option<Value>) {
        self.steps.push(ProgressStep {
            id: Uuid::new_v4().to_string(),
            step: step.into(),
            message: message.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
            data,
            error: None,
        });
    }

    /// Append a step carrying an error.
    pub fn add_error(
        &mut self,
        step: impl Into<String>,
        message: impl Into<String>,
        error: impl Into<String>,
        data: Option<Value>,
    ) {
        self.steps.push(ProgressStep {
            id: Uuid::new_v4().to_string(),
            step: step.into(),
            message: message.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
            data,
            error: Some(error.into()),
        });
    }

    /// Patch the most recent step with this name (last-write-wins per
    /// field), or append a new one if none exists.
    pub fn merge(&mut self, step: &str, patch: ProgressPatch) {
        if let Some(existing) = self.steps.iter_mut().rev().find(|s| s.step == step) {
            if let Some(message) = patch.message {
                existing.message = message;
            }
            if let Some(data) = patch.data {
                existing.data = Some(data);
            }
            if let Some(error) = patch.error {
                existing.error = Some(error);
            }
            return;
        }
        self.add(
            step,
            patch.message.unwrap_or_default(),
            patch.data,
        );
        if let (Some(last), Some(error)) = (self.steps.last_mut(), patch.error) {
            last.error = Some(error);
        }
    }

    pub fn steps(&self) -> &[ProgressStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Count steps whose name starts with the given prefix.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.steps.iter().filter(|s| s.step.starts_with(prefix)).count()
    }
}

/// A partial update for [`ProgressLog::merge`].
#[derive(Debug, Clone, Default)]
pub struct ProgressPatch {
    pub message: Option<String>,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl ProgressPatch {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_appends_in_order() {
        let mut log = ProgressLog::new();
        log.add("start", "Starting", None);
        log.add("agent_loop_1", "Iteration 1", Some(json!({"tool": "get_scene_info"})));
        assert_eq!(log.len(), 2);
        assert_eq!(log.steps()[1].step, "agent_loop_1");
        assert!(log.steps()[0].timestamp_ms <= log.steps()[1].timestamp_ms);
    }

    #[test]
    fn merge_patches_latest_with_name() {
        let mut log = ProgressLog::new();
        log.add("asset_import", "Searching", None);
        log.add("other", "x", None);
        log.merge(
            "asset_import",
            ProgressPatch::message("Imported").with_data(json!({"name": "chair"})),
        );

        assert_eq!(log.len(), 2); // no append
        let step = &log.steps()[0];
        assert_eq!(step.message, "Imported");
        assert_eq!(step.data, Some(json!({"name": "chair"})));
    }

    #[test]
    fn merge_appends_when_absent() {
        let mut log = ProgressLog::new();
        log.merge("fresh", ProgressPatch::message("created").with_error("boom"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.steps()[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn no_operation_shrinks_the_log() {
        let mut log = ProgressLog::new();
        log.add("a", "1", None);
        log.add_error("b", "2", "err", None);
        let before = log.len();
        log.merge("a", ProgressPatch::message("patched"));
        log.merge("c", ProgressPatch::default());
        assert!(log.len() >= before);
    }

    #[test]
    fn count_prefix_counts_loop_steps() {
        let mut log = ProgressLog::new();
        for i in 1..=10 {
            log.add(format!("agent_loop_{i}"), "iter", None);
        }
        log.add("finish", "done", None);
        assert_eq!(log.count_prefix("agent_loop_"), 10);
    }
}
