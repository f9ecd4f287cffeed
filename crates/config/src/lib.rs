//! Configuration loading and validation for MeshPilot.
//!
//! Loads `meshpilot.toml` with environment variable overrides. Secrets are
//! redacted from `Debug` output. Validation happens once at startup;
//! anything structural (like an embedding-dimension mismatch) is fatal.

use meshpilot_core::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// The root configuration structure. Maps directly to `meshpilot.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Blender host transport settings
    #[serde(default)]
    pub host: HostConfig,

    /// LLM provider configurations, keyed by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Default provider when the model id doesn't select one
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Vector retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Circuit breaker defaults (one breaker per integration)
    #[serde(default)]
    pub breaker: BreakerSettings,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Response-code cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_provider() -> String {
    "gemini".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            providers: HashMap::new(),
            default_provider: default_provider(),
            retrieval: RetrievalConfig::default(),
            breaker: BreakerSettings::default(),
            agent: AgentConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// `HOST:PORT` of the Blender addon socket
    #[serde(default = "default_host_addr")]
    pub addr: String,

    /// Default per-command deadline
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Deadline for the known-slow `execute_code` command
    #[serde(default = "default_execute_timeout")]
    pub execute_timeout_secs: u64,

    /// First reconnect delay; doubles up to the cap
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_secs: u64,

    #[serde(default = "default_reconnect_cap")]
    pub reconnect_cap_secs: u64,

    /// Reconnect attempts before giving up for operator attention
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

fn default_host_addr() -> String {
    "127.0.0.1:9876".into()
}
fn default_command_timeout() -> u64 {
    5
}
fn default_execute_timeout() -> u64 {
    30
}
fn default_reconnect_initial() -> u64 {
    5
}
fn default_reconnect_cap() -> u64 {
    60
}
fn default_reconnect_attempts() -> u32 {
    10
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            addr: default_host_addr(),
            command_timeout_secs: default_command_timeout(),
            execute_timeout_secs: default_execute_timeout(),
            reconnect_initial_secs: default_reconnect_initial(),
            reconnect_cap_secs: default_reconnect_cap(),
            reconnect_attempts: default_reconnect_attempts(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    /// API key; usually supplied via env, not the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model for this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Override the API base URL (testing, proxies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Postgres connection string (pgvector extension required)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Base documentation table; the `{table}_new` variant is tried first
    #[serde(default = "default_docs_table")]
    pub table: String,

    /// Vector column dimension in the store schema
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Default number of chunks to retrieve
    #[serde(default = "default_retrieval_limit")]
    pub limit: usize,

    /// Chunks at or below this cosine similarity are discarded
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
}

fn default_docs_table() -> String {
    "blender_docs".into()
}
fn default_embedding_dim() -> usize {
    384
}
fn default_retrieval_limit() -> usize {
    5
}
fn default_min_similarity() -> f32 {
    0.2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            table: default_docs_table(),
            embedding_dim: default_embedding_dim(),
            limit: default_retrieval_limit(),
            min_similarity: default_min_similarity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: u64,

    #[serde(default = "default_half_open_successes")]
    pub half_open_successes: u32,
}

fn default_failure_threshold() -> u32 {
    4
}
fn default_open_timeout() -> u64 {
    45
}
fn default_half_open_successes() -> u32 {
    2
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_timeout_secs: default_open_timeout(),
            half_open_successes: default_half_open_successes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Absolute cap on reasoning iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// LLM temperature for decision turns
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Treat non-empty sanitizer validation issues as a hard stop
    #[serde(default)]
    pub strict_sanitize: bool,

    /// TTL of the cached integration availability map
    #[serde(default = "default_availability_ttl")]
    pub availability_ttl_secs: u64,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_temperature() -> f32 {
    0.3
}
fn default_availability_ttl() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            temperature: default_temperature(),
            strict_sanitize: false,
            availability_ttl_secs: default_availability_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_entries() -> usize {
    100
}
fn default_cache_ttl() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_entries(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("providers", &self.providers)
            .field("default_provider", &self.default_provider)
            .field("retrieval", &self.retrieval)
            .field("breaker", &self.breaker)
            .field("agent", &self.agent)
            .field("cache", &self.cache)
            .finish()
    }
}

impl AppConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("Cannot read {}: {e}", path.display()),
        })?;
        let mut config: AppConfig = toml::from_str(&text).map_err(|e| Error::Config {
            message: format!("Cannot parse {}: {e}", path.display()),
        })?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides (no file).
    pub fn from_env() -> Result<Self, Error> {
        let mut config = AppConfig::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("MESHPILOT_HOST_ADDR") {
            self.host.addr = addr;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.retrieval.database_url = Some(url);
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.providers.entry("gemini".into()).or_default().api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.providers.entry("claude".into()).or_default().api_key = Some(key);
        }
    }

    /// Validate numeric bounds. Called by `load`/`from_env`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.agent.max_iterations == 0 {
            return Err(Error::Config {
                message: "agent.max_iterations must be at least 1".into(),
            });
        }
        if self.cache.max_entries == 0 {
            return Err(Error::Config {
                message: "cache.max_entries must be at least 1".into(),
            });
        }
        if self.host.reconnect_initial_secs > self.host.reconnect_cap_secs {
            return Err(Error::Config {
                message: "host.reconnect_initial_secs exceeds reconnect_cap_secs".into(),
            });
        }
        if self.retrieval.embedding_dim == 0 {
            return Err(Error::Config {
                message: "retrieval.embedding_dim must be positive".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(Error::Config {
                message: "retrieval.min_similarity must be within [0, 1]".into(),
            });
        }
        Ok(())
    }

    /// Provider config by name, if present.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.host.addr, "127.0.0.1:9876");
        assert_eq!(config.host.command_timeout_secs, 5);
        assert_eq!(config.host.execute_timeout_secs, 30);
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.cache.max_entries, 100);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.retrieval.embedding_dim, 384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[host]
addr = "blender.local:9876"

[agent]
max_iterations = 6
strict_sanitize = true

[providers.gemini]
default_model = "gemini-2.0-flash"
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.host.addr, "blender.local:9876");
        assert_eq!(config.agent.max_iterations, 6);
        assert!(config.agent.strict_sanitize);
        // Untouched sections keep defaults.
        assert_eq!(config.breaker.failure_threshold, 4);
        assert_eq!(
            config.provider("gemini").unwrap().default_model.as_deref(),
            Some("gemini-2.0-flash")
        );
    }

    #[test]
    fn rejects_zero_iterations() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_api_keys() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "gemini".into(),
            ProviderConfig {
                api_key: Some("super-secret".into()),
                ..Default::default()
            },
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
