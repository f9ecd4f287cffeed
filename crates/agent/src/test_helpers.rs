//! Scripted fakes shared by the orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use meshpilot_core::action::ToolAction;
use meshpilot_core::error::{HostError, ProviderError};
use meshpilot_core::host::HostPort;
use meshpilot_core::provider::{AgentHistory, Decision, DecisionProvider};
use meshpilot_core::retrieval::KnowledgeSearch;

pub fn decision(thought: &str, action: ToolAction) -> Decision {
    Decision {
        thought: thought.to_string(),
        action,
    }
}

pub fn exec_decision(thought: &str, code: &str) -> Decision {
    decision(
        thought,
        ToolAction::ExecuteBlenderCode {
            code: code.to_string(),
        },
    )
}

/// Host fake: sticky replies per command plus one-shot queued replies.
/// Queued replies win and are consumed in order; an unscripted command
/// fails like a host-side error so flows exercise their error paths.
#[derive(Default)]
pub struct ScriptedHost {
    sticky: Mutex<HashMap<String, Value>>,
    queued: Mutex<HashMap<String, VecDeque<Result<Value, HostError>>>>,
    calls: Mutex<Vec<(String, Value)>>,
    disconnected: std::sync::atomic::AtomicBool,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, command: &str, reply: Value) {
        self.sticky
            .lock()
            .unwrap()
            .insert(command.to_string(), reply);
    }

    pub fn respond_seq(&self, command: &str, replies: Vec<Result<Value, HostError>>) {
        self.queued
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn set_disconnected(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
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
        if let Some(reply) = self.sticky.lock().unwrap().get(command) {
            return Ok(reply.clone());
        }
        Err(HostError::ExecFailed {
            message: format!("unscripted command '{command}'"),
        })
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }
}

/// Provider fake: a queue of scripted decisions plus a fixed generate reply.
#[derive(Default)]
pub struct ScriptedProvider {
    decisions: Mutex<VecDeque<Result<Decision, ProviderError>>>,
    generated: Mutex<Option<String>>,
    decide_calls: AtomicUsize,
    generate_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_decision(&self, decision: Decision) {
        self.decisions.lock().unwrap().push_back(Ok(decision));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.decisions.lock().unwrap().push_back(Err(error));
    }

    pub fn set_generated(&self, code: &str) {
        *self.generated.lock().unwrap() = Some(code.to_string());
    }

    pub fn decide_calls(&self) -> usize {
        self.decide_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(
        &self,
        _system_prompt: &str,
        _history: &AgentHistory,
        _model: &str,
    ) -> Result<Decision, ProviderError> {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidOutput("script exhausted".into())))
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _model: &str,
    ) -> Result<String, ProviderError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.generated
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::InvalidOutput("no generate reply scripted".into()))
    }
}

/// Retrieval fake returning a fixed document list.
#[derive(Default)]
pub struct StaticSearch {
    pub docs: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn with_docs(docs: Vec<String>) -> Self {
        Self {
            docs,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl KnowledgeSearch for StaticSearch {
    async fn search(&self, query: &str, limit: usize) -> Vec<String> {
        self.queries.lock().unwrap().push(query.to_string());
        self.docs.iter().take(limit).cloned().collect()
    }
}
