//! Google Gemini decision driver.
//!
//! Uses the `generateContent` REST endpoint with:
//! - API key passed as a query parameter (not a header)
//! - `systemInstruction` as a top-level field
//! - role names `user` / `model`
//! - JSON response mode requested for decision turns via
//!   `generationConfig.responseMimeType`
//!
//! Response mode is a hint only; extraction still scans for the first
//! balanced object before parsing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use meshpilot_core::error::ProviderError;
use meshpilot_core::provider::{AgentHistory, Decision, DecisionProvider, TurnRole};

use crate::json::extract_json_object;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Gemini `generateContent` driver.
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "gemini".into(),
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

    /// Convert the agent history to Gemini `contents`.
    fn to_contents(history: &AgentHistory) -> Vec<Content> {
        history
            .turns()
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    TurnRole::User => "user".into(),
                    TurnRole::Model => "model".into(),
                },
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect()
    }

    async fn request(
        &self,
        system_prompt: &str,
        contents: Vec<Content>,
        model: &str,
        json_mode: bool,
    ) -> std::result::Result<String, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let body = GeminiRequest {
            system_instruction: Instruction {
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: json_mode.then(|| "application/json".into()),
            },
        };

        debug!(provider = "gemini", model, json_mode, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout("Gemini request timed out".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ProviderError::ApiError {
                status_code: status,
                message: "Invalid Gemini API key".into(),
            });
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: GeminiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse Gemini response: {e}"),
        })?;

        extract_text(&api_resp)
    }
}

/// Join all text parts of the first candidate.
fn extract_text(resp: &GeminiResponse) -> std::result::Result<String, ProviderError> {
    let candidate = resp
        .candidates
        .first()
        .ok_or_else(|| ProviderError::InvalidOutput("response has no candidates".into()))?;

    let text: String = candidate
        .content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(ProviderError::InvalidOutput(
            "candidate contains no text".into(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl DecisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(
        &self,
        system_prompt: &str,
        history: &AgentHistory,
        model: &str,
    ) -> std::result::Result<Decision, ProviderError> {
        let contents = Self::to_contents(history);
        let raw = self.request(system_prompt, contents, model, true).await?;

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
        let contents = vec![Content {
            role: "user".into(),
            parts: vec![Part {
                text: user_prompt.to_string(),
            }],
        }];
        self.request(system_prompt, contents, model, false).await
    }
}

// --- Gemini API types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: Instruction,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Instruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}
