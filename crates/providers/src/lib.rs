//! MeshPilot decision providers — vendor drivers behind [`DecisionProvider`].
//!
//! The factory picks a driver from the requested model name (prefix match),
//! falling back to the configured default provider. A driver whose
//! credential is absent is reported as not configured, never constructed
//! with an empty key.

pub mod claude;
pub mod gemini;
pub mod json;

pub use claude::ClaudeProvider;
pub use gemini::GeminiProvider;
pub use json::extract_json_object;

use std::sync::Arc;

use meshpilot_config::AppConfig;
use meshpilot_core::error::ProviderError;
use meshpilot_core::provider::DecisionProvider;

/// A resolved (provider, model) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub provider: String,
    pub model: String,
}

/// Map a requested model name to a provider, defaulting when the prefix
/// matches nothing.
pub fn select(config: &AppConfig, requested_model: Option<&str>) -> Selection {
    if let Some(model) = requested_model {
        let provider = if model.starts_with("gemini") {
            "gemini"
        } else if model.starts_with("claude") {
            "claude"
        } else {
            &config.default_provider
        };
        return Selection {
            provider: provider.to_string(),
            model: model.to_string(),
        };
    }

    let provider = config.default_provider.clone();
    let model = config
        .provider(&provider)
        .and_then(|p| p.default_model.clone())
        .unwrap_or_else(|| default_model_for(&provider).to_string());
    Selection { provider, model }
}

fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "claude" => "claude-sonnet-4-20250514",
        _ => "gemini-2.0-flash",
    }
}

/// Construct the driver for a selection.
pub fn provider_for(
    config: &AppConfig,
    selection: &Selection,
) -> std::result::Result<Arc<dyn DecisionProvider>, ProviderError> {
    let entry = config.provider(&selection.provider);
    let api_key = entry
        .and_then(|p| p.api_key.clone())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ProviderError::NotConfigured(selection.provider.clone()))?;

    let temperature = config.agent.temperature;
    let base_url = entry.and_then(|p| p.base_url.clone());

    let driver: Arc<dyn DecisionProvider> = match selection.provider.as_str() {
        "gemini" => {
            let mut p = GeminiProvider::new(api_key).with_temperature(temperature);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        "claude" => {
            let mut p = ClaudeProvider::new(api_key).with_temperature(temperature);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        other => return Err(ProviderError::NotConfigured(other.to_string())),
    };
    Ok(driver)
}
