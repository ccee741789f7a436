//! Default values for all configuration sections.

use super::*;

pub fn default_config() -> Config {
    Config {
        llm: LlmConfig {
            provider: llm_provider(),
            api_key: String::new(),
            model_fast: model_fast(),
            model_moderate: model_moderate(),
            model_pro: model_pro(),
            model_flash: model_flash(),
            max_turns: max_turns(),
        },
        embedding: EmbeddingConfig {
            provider: llm_provider(),
            api_key: String::new(),
            model: embedding_model(),
        },
        storage: StorageConfig { db_path: db_path() },
        kv: KvConfig { url: kv_url() },
        queue: QueueConfig {
            max_retries: max_retries(),
            lease_ttl_seconds: lease_ttl_seconds(),
            dedup_ttl_seconds: dedup_ttl_seconds(),
        },
        scheduler: SchedulerConfig {
            heartbeat_interval_seconds: heartbeat_interval_seconds(),
            pattern_detection_every_n_ticks: pattern_detection_every_n_ticks(),
            feedback_analysis_every_n_ticks: feedback_analysis_every_n_ticks(),
            brief_minute: brief_minute(),
            mail_poll_lookback_seconds: None,
            ticketing_poll_lookback_seconds: None,
            chat_poll_lookback_seconds: None,
            survey_poll_lookback_seconds: None,
            project_management_poll_lookback_seconds: None,
            drive_poll_lookback_seconds: None,
        },
        guardrails: GuardrailsConfig {
            restricted_contacts: Vec::new(),
            default_tool_rate_limit_per_minute: default_tool_rate_limit_per_minute(),
        },
        sessions: SessionsConfig {
            chat_idle_minutes: chat_idle_minutes(),
            dashboard_idle_hours: dashboard_idle_hours(),
            max_tokens: session_max_tokens(),
            compaction_threshold: compaction_threshold(),
        },
        sandbox: SandboxConfig {
            timeout_seconds: sandbox_timeout_seconds(),
        },
        tools: ToolsConfig::default(),
        webhook: WebhookConfig {
            chat_signing_secret: String::new(),
            ticketing_shared_secret: String::new(),
            mail_shared_secret: String::new(),
            alert_webhook_url: String::new(),
        },
        server: ServerConfig {
            host: server_host(),
            port: server_port(),
            admin_api_token: String::new(),
        },
        observability: ObservabilityConfig {
            log_level: log_level(),
            environment: environment(),
        },
    }
}

pub fn llm_provider() -> String {
    "gemini".to_string()
}
pub fn model_fast() -> String {
    "gemini-2.0-flash".to_string()
}
pub fn model_moderate() -> String {
    "gemini-2.0-flash".to_string()
}
pub fn model_pro() -> String {
    "gemini-2.5-pro".to_string()
}
pub fn model_flash() -> String {
    "gemini-2.0-flash-lite".to_string()
}
pub fn max_turns() -> u32 {
    10
}
pub fn embedding_model() -> String {
    "text-embedding-004".to_string()
}
pub fn db_path() -> String {
    "~/.ops-agent/ops_agent.db".to_string()
}
pub fn kv_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
pub fn max_retries() -> u32 {
    5
}
pub fn lease_ttl_seconds() -> u64 {
    300
}
pub fn dedup_ttl_seconds() -> u64 {
    86_400
}
pub fn heartbeat_interval_seconds() -> u64 {
    30
}
pub fn pattern_detection_every_n_ticks() -> u32 {
    10
}
pub fn feedback_analysis_every_n_ticks() -> u32 {
    120
}
pub fn brief_minute() -> u32 {
    0
}
pub fn default_tool_rate_limit_per_minute() -> u32 {
    30
}
pub fn chat_idle_minutes() -> i64 {
    30
}
pub fn dashboard_idle_hours() -> i64 {
    12
}
pub fn session_max_tokens() -> usize {
    8_000
}
pub fn compaction_threshold() -> i64 {
    40
}
pub fn sandbox_timeout_seconds() -> u64 {
    30
}
pub fn server_host() -> String {
    "127.0.0.1".to_string()
}
pub fn server_port() -> u16 {
    8088
}
pub fn log_level() -> String {
    "info".to_string()
}
pub fn environment() -> String {
    "development".to_string()
}
