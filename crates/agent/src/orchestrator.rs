//! The reason-act-observe loop.
//!
//! One orchestrator instance serves many requests; each request owns its
//! own `AgentHistory` and progress log. Host access is already globally
//! serialized by the transport's single-flight rule, so the loop only has
//! to keep its own actions strictly sequential.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meshpilot_assets::{AssetRouter, RouteOutcome};
use meshpilot_config::AppConfig;
use meshpilot_core::action::ToolAction;
use meshpilot_core::error::{AgentError, Error, HostError, ProviderError, Result};
use meshpilot_core::host::{HostPort, commands};
use meshpilot_core::message::{Conversation, ConversationId, Message, SceneContext};
use meshpilot_core::progress::{ProgressLog, ProgressPatch};
use meshpilot_core::provider::{AgentHistory, DecisionProvider};
use meshpilot_core::retrieval::KnowledgeSearch;
use serde_json::{Value, json};

use crate::cache::{CodeCache, cache_key};
use crate::prompt;
use crate::sanitize::{sanitize, validate};

/// Persisted assistant reply when the loop hits its iteration cap.
pub const LOOP_EXHAUSTED_MESSAGE: &str = "I couldn't complete this task within my \
reasoning step budget. The scene may have been partially modified; please check \
the result and rephrase or split the request.";

/// Persisted assistant reply when the caller cancels between iterations.
pub const CANCELLED_MESSAGE: &str =
    "The request was cancelled before the task finished.";

/// Consecutive execution failures before the observation tells the model
/// to change course instead of patching the same code again.
const EXEC_FAILURE_STREAK_LIMIT: u32 = 3;

/// One orchestrator invocation.
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    pub prompt: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub model: Option<String>,
    /// Reference images forwarded to generation jobs (data URLs).
    pub attachments: Vec<String>,
    pub capture_screenshot: bool,
    pub debug: bool,
}

/// What a run returns to the REST layer.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub response: String,
    pub provider: String,
    pub conversation_id: ConversationId,
    pub scene_context: Option<SceneContext>,
    pub progress: ProgressLog,
    pub debug_artifacts: Option<Value>,
}

/// In-memory conversation storage, serialized per process.
#[derive(Default)]
pub struct ConversationStore {
    inner: Mutex<HashMap<String, Conversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a conversation that must already exist.
    pub fn get(&self, id: &str) -> std::result::Result<Conversation, AgentError> {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::UnknownConversation(id.to_string()))
    }

    /// Fetch or create; a supplied id that is unknown starts a resumed
    /// session under that id.
    pub fn get_or_create(&self, id: Option<&str>) -> Conversation {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        match id {
            Some(id) => inner
                .get(id)
                .cloned()
                .unwrap_or_else(|| Conversation::with_id(ConversationId::from(id))),
            None => Conversation::new(),
        }
    }

    pub fn save(&self, conversation: Conversation) {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .insert(conversation.id.0.clone(), conversation);
    }

    pub fn delete(&self, id: &str) -> bool {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .remove(id)
            .is_some()
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

/// The ReAct orchestrator.
pub struct Orchestrator {
    host: Arc<dyn HostPort>,
    provider: Arc<dyn DecisionProvider>,
    retrieval: Arc<dyn KnowledgeSearch>,
    router: Arc<AssetRouter>,
    store: Arc<ConversationStore>,
    max_iterations: u32,
    strict_sanitize: bool,
    retrieval_limit: usize,
    default_model: String,
    cache: CodeCache,
}

/// Per-request mutable loop state.
struct RunState {
    conversation_id: String,
    history: AgentHistory,
    progress: ProgressLog,
    scene: Option<SceneContext>,
    retrieval_context: Vec<String>,
    last_host_result: Option<Value>,
    consecutive_exec_errors: u32,
}

impl Orchestrator {
    pub fn new(
        host: Arc<dyn HostPort>,
        provider: Arc<dyn DecisionProvider>,
        retrieval: Arc<dyn KnowledgeSearch>,
        router: Arc<AssetRouter>,
        store: Arc<ConversationStore>,
        config: &AppConfig,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            host,
            provider,
            retrieval,
            router,
            store,
            max_iterations: config.agent.max_iterations,
            strict_sanitize: config.agent.strict_sanitize,
            retrieval_limit: config.retrieval.limit,
            default_model: default_model.into(),
            cache: CodeCache::new(&config.cache),
        }
    }

    /// Run one request to completion.
    pub async fn run(
        &self,
        request: AgentRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse> {
        if request.prompt.trim().is_empty() {
            return Err(AgentError::InvalidInput("prompt is empty".into()).into());
        }
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut conversation = self.store.get_or_create(request.conversation_id.as_deref());
        conversation.push(Message::user(request.prompt.clone()));

        let mut state = RunState {
            conversation_id: conversation.id.0.clone(),
            history: AgentHistory::from_prompt(&request.prompt),
            progress: ProgressLog::new(),
            scene: conversation.scene_context.clone(),
            retrieval_context: Vec::new(),
            last_host_result: None,
            consecutive_exec_errors: 0,
        };
        state
            .progress
            .add("start", "Request accepted", Some(json!({"model": model})));

        if self.host.is_connected() {
            if let Some(scene) = self.fetch_scene().await {
                state.scene = Some(scene);
            }
            self.router.refresh_availability();
        }

        state.retrieval_context = self
            .retrieval
            .search(&request.prompt, self.retrieval_limit)
            .await;
        state.progress.add(
            "retrieval",
            "Documentation prefetched",
            Some(json!({"count": state.retrieval_context.len()})),
        );

        let mut final_answer: Option<String> = None;
        let mut loop_count: u32 = 0;

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                info!(iteration, "Run cancelled between iterations");
                state.progress.add("cancelled", "Cancelled by caller", None);
                final_answer = Some(CANCELLED_MESSAGE.to_string());
                break;
            }
            loop_count = iteration;
            let step = format!("agent_loop_{iteration}");
            state.progress.add(&step, "Reasoning", None);

            let system_prompt =
                prompt::build_system_prompt(state.scene.as_ref(), &state.retrieval_context);
            let decision = match self
                .provider
                .decide(&system_prompt, &state.history, &model)
                .await
            {
                Ok(d) => d,
                Err(e) => {
                    state.progress.merge(
                        &step,
                        ProgressPatch::message("Reasoning failed").with_error(e.to_string()),
                    );
                    self.persist_failure(&mut conversation, &state);
                    return Err(AgentError::ReasonFailed(e).into());
                }
            };
            debug!(iteration, tool = decision.action.tool_name(), "Decision");
            state.progress.merge(
                &step,
                ProgressPatch::message(format!("Chose {}", decision.action.tool_name()))
                    .with_data(json!({"thought": decision.thought})),
            );

            let decision_json = serde_json::to_string(&decision)?;
            state.history.push_model(decision_json);

            if matches!(decision.action, ToolAction::FinishTask) {
                final_answer = Some(decision.thought);
                break;
            }

            let observation = self
                .dispatch(&decision.action, &request, &model, &mut state)
                .await?;
            state.history.push_user(&observation);
        }

        let (answer, provider_tag) = match final_answer {
            Some(answer) => (answer, self.provider.name().to_string()),
            None => {
                warn!(loop_count, "Loop exhausted without finish_task");
                state.progress.add_error(
                    "exhausted",
                    "Iteration budget reached",
                    AgentError::LoopExhausted {
                        iterations: loop_count,
                    }
                    .to_string(),
                    Some(json!({"iterations": loop_count})),
                );
                (
                    LOOP_EXHAUSTED_MESSAGE.to_string(),
                    self.provider.name().to_string(),
                )
            }
        };

        let mut message = Message::assistant(answer.clone());
        message.provider = Some(provider_tag.clone());
        message.host_result = state.last_host_result.clone();
        message.scene_context = state.scene.clone();
        message
            .metadata
            .insert("agent_history".into(), serde_json::to_value(&state.history)?);
        message.metadata.insert("loop_count".into(), json!(loop_count));
        message
            .metadata
            .insert("progress".into(), serde_json::to_value(&state.progress)?);
        conversation.push(message);
        if let Some(scene) = state.scene.clone() {
            conversation.set_scene_context(scene);
        }
        let conversation_id = conversation.id.clone();
        self.store.save(conversation);

        let debug_artifacts = self.collect_debug_artifacts(&request, &state).await;

        Ok(AgentResponse {
            response: answer,
            provider: provider_tag,
            conversation_id,
            scene_context: state.scene,
            progress: state.progress,
            debug_artifacts,
        })
    }

    /// Execute one decoded action and produce its observation text.
    async fn dispatch(
        &self,
        action: &ToolAction,
        request: &AgentRequest,
        model: &str,
        state: &mut RunState,
    ) -> Result<String> {
        match action {
            ToolAction::GetSceneInfo => match self.host.send(commands::GET_SCENE_INFO, json!({})).await {
                Ok(value) => {
                    let scene = SceneContext::new(value);
                    let names = scene.object_names();
                    state.scene = Some(scene);
                    Ok(if names.is_empty() {
                        "Observation: the scene contains no objects.".to_string()
                    } else {
                        format!("Observation: the scene contains: {}.", names.join(", "))
                    })
                }
                Err(e) => self.host_error_to_observation(e, state),
            },

            ToolAction::SearchKnowledgeBase { query } => {
                let docs = self.retrieval.search(query, self.retrieval_limit).await;
                let count = docs.len();
                state.retrieval_context = docs;
                Ok(format!(
                    "Observation: found {count} documentation entries for '{query}'."
                ))
            }

            ToolAction::AssetSearchAndImport { prompt: asset_prompt } => {
                self.router.refresh_availability();
                let outcome = self.router.route(asset_prompt, &request.attachments).await;
                match outcome {
                    RouteOutcome::Imported(asset) => {
                        state.progress.add(
                            "asset_import",
                            format!("Imported '{}'", asset.name),
                            Some(json!({
                                "provider": asset.provider.name(),
                                "kind": asset.kind.name(),
                            })),
                        );
                        if let Some(scene) = self.fetch_scene().await {
                            state.scene = Some(scene);
                        }
                        Ok(format!(
                            "Observation: imported '{}' from {} ({}).",
                            asset.name,
                            asset.provider.name(),
                            asset.kind.name()
                        ))
                    }
                    RouteOutcome::NoIntent | RouteOutcome::NotAvailable { .. } => {
                        debug!("Asset route unavailable, synthesizing code");
                        let exec = self
                            .synthesize_and_execute(asset_prompt, request, model, state)
                            .await?;
                        Ok(format!(
                            "Observation: no asset integration could serve this request; \
                             generated Blender code instead. {exec}"
                        ))
                    }
                    RouteOutcome::Failed { provider, error } => {
                        state.progress.add_error(
                            "asset_import",
                            "Asset import failed",
                            error.to_string(),
                            Some(json!({"provider": provider.name()})),
                        );
                        let exec = self
                            .synthesize_and_execute(asset_prompt, request, model, state)
                            .await?;
                        Ok(format!(
                            "Observation: asset import via {} failed ({}); generated \
                             Blender code instead. {exec}",
                            provider.name(),
                            error
                        ))
                    }
                }
            }

            ToolAction::ExecuteBlenderCode { code } => {
                self.execute_code(code, state).await
            }

            ToolAction::FinishTask => {
                // Terminal actions are handled in the loop before dispatch.
                Ok("Observation: task finished.".to_string())
            }

            ToolAction::Unknown { tool } => Ok(format!(
                "Observation: '{tool}' is not a valid tool. Valid tools are \
                 search_knowledge_base, get_scene_info, asset_search_and_import, \
                 execute_blender_code, finish_task."
            )),
        }
    }

    /// Sanitize, validate, dispatch. Execution errors become observations;
    /// transport failures end the request.
    async fn execute_code(&self, code: &str, state: &mut RunState) -> Result<String> {
        let sanitized = sanitize(code);
        let issues = validate(&sanitized);
        if !issues.is_empty() {
            warn!(?issues, "Sanitized code still has issues");
            if self.strict_sanitize {
                state.progress.add_error(
                    "execute_code",
                    "Code rejected before dispatch",
                    issues.join("; "),
                    None,
                );
                return Ok(format!(
                    "Observation: the code was rejected before execution: {}.",
                    issues.join("; ")
                ));
            }
        }

        match self
            .host
            .send(commands::EXECUTE_CODE, json!({"code": sanitized}))
            .await
        {
            Ok(result) => {
                state.last_host_result = Some(result);
                state.consecutive_exec_errors = 0;
                state.progress.add("execute_code", "Code executed", None);
                if let Some(scene) = self.fetch_scene().await {
                    state.scene = Some(scene);
                }
                Ok("Observation: the code executed successfully.".to_string())
            }
            Err(HostError::ExecFailed { message }) => {
                state.consecutive_exec_errors += 1;
                state.progress.add_error(
                    "execute_code",
                    "Host rejected the code",
                    message.clone(),
                    Some(json!({"streak": state.consecutive_exec_errors})),
                );
                let mut observation = format!(
                    "Observation: execution failed: {}. Fix the code and try again.",
                    humanize_host_message(&message)
                );
                if state.consecutive_exec_errors >= EXEC_FAILURE_STREAK_LIMIT {
                    observation.push_str(
                        " Code execution has failed several times in a row; \
                         try a different, simpler approach, or finish the task \
                         and explain what went wrong.",
                    );
                }
                Ok(observation)
            }
            Err(e) => {
                state.progress.add_error(
                    "execute_code",
                    "Transport failure",
                    e.to_string(),
                    None,
                );
                Err(Error::Host(e))
            }
        }
    }

    /// The auxiliary LLM turn used when no asset integration can serve the
    /// request. Results are cached per (prompt, user, conversation).
    async fn synthesize_and_execute(
        &self,
        asset_prompt: &str,
        request: &AgentRequest,
        model: &str,
        state: &mut RunState,
    ) -> Result<String> {
        let key = cache_key(asset_prompt, &request.user_id, &state.conversation_id);
        let code = match self.cache.get(&key) {
            Some(code) => {
                debug!("Asset-fallback code served from cache");
                code
            }
            None => {
                let raw = self
                    .provider
                    .generate(
                        &prompt::asset_fallback_system_prompt(),
                        &prompt::asset_fallback_user_prompt(asset_prompt),
                        model,
                    )
                    .await
                    .map_err(|e: ProviderError| Error::Agent(AgentError::ReasonFailed(e)))?;
                let code = sanitize(&raw);
                self.cache.set(&key, code.clone());
                code
            }
        };
        self.execute_code(&code, state).await
    }

    /// Best-effort scene fetch; never fatal.
    async fn fetch_scene(&self) -> Option<SceneContext> {
        match self.host.send(commands::GET_SCENE_INFO, json!({})).await {
            Ok(value) => Some(SceneContext::new(value)),
            Err(e) => {
                debug!(error = %e, "Scene fetch skipped");
                None
            }
        }
    }

    /// Non-exec host errors during a scene-info action: connectivity
    /// problems end the request, everything else self-corrects.
    fn host_error_to_observation(
        &self,
        error: HostError,
        state: &mut RunState,
    ) -> Result<String> {
        match error {
            HostError::ExecFailed { message } => Ok(format!(
                "Observation: the host reported an error: {}.",
                humanize_host_message(&message)
            )),
            e @ (HostError::NotConnected
            | HostError::Exhausted { .. }
            | HostError::Busy
            | HostError::Timeout { .. }
            | HostError::Protocol(_)
            | HostError::Io(_)) => {
                state
                    .progress
                    .add_error("host", "Transport failure", e.to_string(), None);
                Err(Error::Host(e))
            }
        }
    }

    /// Persist what we have when a run aborts with a surfaced error.
    fn persist_failure(&self, conversation: &mut Conversation, state: &RunState) {
        if let Some(scene) = state.scene.clone() {
            conversation.set_scene_context(scene);
        }
        self.store.save(conversation.clone());
    }

    async fn collect_debug_artifacts(
        &self,
        request: &AgentRequest,
        state: &RunState,
    ) -> Option<Value> {
        if !request.capture_screenshot && !request.debug {
            return None;
        }
        let mut artifacts = serde_json::Map::new();
        if request.capture_screenshot && self.host.is_connected() {
            match self.host.send(commands::CAPTURE_VIEWPORT, json!({})).await {
                Ok(shot) => {
                    artifacts.insert("viewport".into(), shot);
                }
                Err(e) => {
                    debug!(error = %e, "Viewport capture skipped");
                }
            }
        }
        if request.debug {
            if let Ok(history) = serde_json::to_value(&state.history) {
                artifacts.insert("agent_history".into(), history);
            }
            if let Some(result) = state.last_host_result.clone() {
                artifacts.insert("last_host_result".into(), result);
            }
        }
        (!artifacts.is_empty()).then(|| Value::Object(artifacts))
    }
}

/// Translate known host-internal phrases into neutral wording. Anything
/// unrecognized passes through so the loop can self-correct on it.
fn humanize_host_message(message: &str) -> String {
    if message.contains("Branch condition returned") {
        "Blender could not evaluate part of the generated code".to_string()
    } else if message.contains("null destination") {
        "Blender reported a missing target object".to_string()
    } else if message.contains("FATAL ERROR") {
        "Blender reported an internal failure while running the code".to_string()
    } else {
        message.to_string()
    }
}
