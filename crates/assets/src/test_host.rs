//! Scripted [`HostPort`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use meshpilot_core::error::HostError;
use meshpilot_core::host::HostPort;

/// A host fake with per-command scripted replies.
///
/// `respond` installs a sticky reply; `respond_seq` installs replies that
/// are consumed in order and take precedence over the sticky one. A command
/// with no reply fails like a host-side error.
#[derive(Default)]
pub struct ScriptedHost {
    sticky: Mutex<HashMap<String, Value>>,
    queued: Mutex<HashMap<String, VecDeque<Result<Value, HostError>>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, command: &str, value: Value) {
        self.sticky
            .lock()
            .unwrap()
            .insert(command.to_string(), value);
    }

    pub fn respond_seq(&self, command: &str, replies: Vec<Result<Value, HostError>>) {
        self.queued
            .lock()
            .unwrap()
            .insert(command.to_string(), replies.into());
    }

    pub fn calls_for(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == command)
            .count()
    }

    pub fn last_params(&self, command: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(c, _)| c == command)
            .map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl HostPort for ScriptedHost {
    async fn send(&self, command: &str, params: Value) -> Result<Value, HostError> {
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), params));

        if let Some(queue) = self.queued.lock().unwrap().get_mut(command)
            && let Some(reply) = queue.pop_front()
        {
            return reply;
        }
        if let Some(value) = self.sticky.lock().unwrap().get(command) {
            return Ok(value.clone());
        }
        Err(HostError::ExecFailed {
            message: format!("no scripted reply for '{command}'"),
        })
    }

    fn is_connected(&self) -> bool {
        true
    }
}
