//! Anthropic Claude decision driver.
//!
//! Messages API conventions:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - role names `user` / `assistant`
//!
//! Claude has no JSON response mode, so the system prompt carries the
//! format contract and extraction does the rest.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use meshpilot_core::error::ProviderError;
use meshpilot_core::provider::{AgentHistory, Decision, DecisionProvider, TurnRole};

use crate::json::extract_json_object;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Anthropic Messages API driver.
pub struct ClaudeProvider {
    name: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
}

impl ClaudeProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "claude".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            temperature: 0.3,
            client,
        }
    }

    /// Custom base URL (testing, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Convert the agent history to Anthropic messages.
    fn to_api_messages(history: &AgentHistory) -> Vec<ApiMessage> {
        history
            .turns()
            .iter()
            .map(|turn| ApiMessage {
                role: match turn.role {
                    TurnRole::User => "user".into(),
                    TurnRole::Model => "assistant".into(),
                },
                content: turn.text.clone(),
            })
            .collect()
    }

    async fn request(
        &self,
        system_prompt: &str,
        messages: Vec<ApiMessage>,
        model: &str,
    ) -> std::result::Result<String, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = ClaudeRequest {
            model: model.to_string(),
            system: system_prompt.to_string(),
            messages,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: self.temperature,
        };

        debug!(provider = "claude", model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout("Claude request timed out".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ProviderError::ApiError {
                status_code: status,
                message: "Invalid Anthropic API key".into(),
            });
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Claude API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: ClaudeResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse Claude response: {e}"),
        })?;

        extract_text(&api_resp)
    }
}

/// Join the text blocks of the response.
fn extract_text(resp: &ClaudeResponse) -> std::result::Result<String, ProviderError> {
    let text: String = resp
        .content
        .iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text.as_str()),
            ResponseBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        return Err(ProviderError::InvalidOutput(
            "response contains no text blocks".into(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl DecisionProvider for ClaudeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(
        &self,
        system_prompt: &str,
        history: &AgentHistory,
        model: &str,
    ) -> std::result::Result<Decision, ProviderError> {
        let messages = Self::to_api_messages(history);
        let raw = self.request(system_prompt, messages, model).await?;

        let object = extract_json_object(&raw)
            .ok_or_else(|| ProviderError::InvalidOutput("no JSON object in output".into()))?;
        let value: serde_json::Value = serde_json::from_str(object)
            .map_err(|e| ProviderError::InvalidOutput(format!("unparseable decision: {e}")))?;
        Decision::from_json(&value)
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
    ) -> std::result::Result<String, ProviderError> {
        let messages = vec![ApiMessage {
            role: "user".into(),
            content: user_prompt.to_string(),
        }];
        self.request(system_prompt, messages, model).await
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    system: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}
