//! Configuration loading.
//!
//! Layering, low to high precedence: built-in defaults, the TOML file at
//! `~/.ops-agent/config.toml` (or `--config`), then `OPS_`-prefixed
//! environment variables. CLI binaries may apply one more layer of
//! flag overrides on top of the loaded `Config`.

mod defaults;
mod env_overrides;
mod validation;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub kv: KvConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        defaults::default_config()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "defaults::llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "defaults::model_fast")]
    pub model_fast: String,
    #[serde(default = "defaults::model_moderate")]
    pub model_moderate: String,
    #[serde(default = "defaults::model_pro")]
    pub model_pro: String,
    #[serde(default = "defaults::model_flash")]
    pub model_flash: String,
    #[serde(default = "defaults::max_turns")]
    pub max_turns: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "defaults::llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "defaults::embedding_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KvConfig {
    #[serde(default = "defaults::kv_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
    #[serde(default = "defaults::lease_ttl_seconds")]
    pub lease_ttl_seconds: u64,
    #[serde(default = "defaults::dedup_ttl_seconds")]
    pub dedup_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "defaults::heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,
    #[serde(default = "defaults::pattern_detection_every_n_ticks")]
    pub pattern_detection_every_n_ticks: u32,
    #[serde(default = "defaults::feedback_analysis_every_n_ticks")]
    pub feedback_analysis_every_n_ticks: u32,
    /// Minute-of-hour to emit the scheduled brief event, e.g. 0 = top of hour.
    #[serde(default = "defaults::brief_minute")]
    pub brief_minute: u32,
    #[serde(default)]
    pub mail_poll_lookback_seconds: Option<u64>,
    #[serde(default)]
    pub ticketing_poll_lookback_seconds: Option<u64>,
    #[serde(default)]
    pub chat_poll_lookback_seconds: Option<u64>,
    #[serde(default)]
    pub survey_poll_lookback_seconds: Option<u64>,
    #[serde(default)]
    pub project_management_poll_lookback_seconds: Option<u64>,
    #[serde(default)]
    pub drive_poll_lookback_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardrailsConfig {
    #[serde(default)]
    pub restricted_contacts: Vec<String>,
    #[serde(default = "defaults::default_tool_rate_limit_per_minute")]
    pub default_tool_rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionsConfig {
    #[serde(default = "defaults::chat_idle_minutes")]
    pub chat_idle_minutes: i64,
    #[serde(default = "defaults::dashboard_idle_hours")]
    pub dashboard_idle_hours: i64,
    #[serde(default = "defaults::session_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "defaults::compaction_threshold")]
    pub compaction_threshold: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxConfig {
    #[serde(default = "defaults::sandbox_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    /// Maps an event source to the tool names it may use. A source with
    /// no entry here may use every registered tool; `"*"` in a source's
    /// list also means "every tool".
    #[serde(default)]
    pub source_scopes: std::collections::HashMap<String, Vec<String>>,
}

/// A child-process MCP server to spawn and discover tools from, adapted
/// into the registry under `{name}__{tool}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub chat_signing_secret: String,
    #[serde(default)]
    pub ticketing_shared_secret: String,
    #[serde(default)]
    pub mail_shared_secret: String,
    /// Incoming-webhook URL the worker posts to when an event is
    /// dead-lettered. Empty means alerts are dropped.
    #[serde(default)]
    pub alert_webhook_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::server_host")]
    pub host: String,
    #[serde(default = "defaults::server_port")]
    pub port: u16,
    #[serde(default)]
    pub admin_api_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default = "defaults::environment")]
    pub environment: String,
}

impl Config {
    /// Load config applying the defaults -> file -> env layering, then
    /// validate cross-field invariants.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = path {
            let expanded = crate::storage::expand_tilde(path);
            let file_path = std::path::Path::new(&expanded);
            if file_path.exists() {
                let contents = std::fs::read_to_string(file_path).map_err(|_| {
                    ConfigError::FileNotFound {
                        path: expanded.clone(),
                    }
                })?;
                let file_config: Config =
                    toml::from_str(&contents).map_err(|source| ConfigError::ParseError { source })?;
                config = file_config;
            }
        }

        env_overrides::apply(&mut config);
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        let config = Config::default();
        assert_eq!(config.llm.max_turns, 10);
        assert!(config.queue.dedup_ttl_seconds >= config.queue.lease_ttl_seconds);
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let config = Config::load(None).expect("defaults alone must validate");
        assert_eq!(config.server.port, defaults::server_port());
    }
}
