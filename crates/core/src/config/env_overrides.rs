//! Environment variable overrides for configuration.
//!
//! Environment variables use the `OPS_` prefix with double underscores
//! separating nested keys (e.g. `OPS_LLM__API_KEY`).

use std::env;

use super::Config;

pub fn apply(config: &mut Config) {
    if let Ok(val) = env::var("OPS_LLM__PROVIDER") {
        config.llm.provider = val;
    }
    if let Ok(val) = env::var("OPS_LLM__API_KEY") {
        config.llm.api_key = val;
    }
    if let Ok(val) = env::var("OPS_LLM__MAX_TURNS") {
        if let Ok(n) = val.parse() {
            config.llm.max_turns = n;
        }
    }
    if let Ok(val) = env::var("OPS_EMBEDDING__API_KEY") {
        config.embedding.api_key = val;
    }
    if let Ok(val) = env::var("OPS_STORAGE__DB_PATH") {
        config.storage.db_path = val;
    }
    if let Ok(val) = env::var("OPS_KV__URL") {
        config.kv.url = val;
    }
    if let Ok(val) = env::var("OPS_QUEUE__MAX_RETRIES") {
        if let Ok(n) = val.parse() {
            config.queue.max_retries = n;
        }
    }
    if let Ok(val) = env::var("OPS_QUEUE__LEASE_TTL_SECONDS") {
        if let Ok(n) = val.parse() {
            config.queue.lease_ttl_seconds = n;
        }
    }
    if let Ok(val) = env::var("OPS_QUEUE__DEDUP_TTL_SECONDS") {
        if let Ok(n) = val.parse() {
            config.queue.dedup_ttl_seconds = n;
        }
    }
    if let Ok(val) = env::var("OPS_SCHEDULER__HEARTBEAT_INTERVAL_SECONDS") {
        if let Ok(n) = val.parse() {
            config.scheduler.heartbeat_interval_seconds = n;
        }
    }
    if let Ok(val) = env::var("OPS_GUARDRAILS__RESTRICTED_CONTACTS") {
        config.guardrails.restricted_contacts =
            val.split(',').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect();
    }
    if let Ok(val) = env::var("OPS_WEBHOOK__CHAT_SIGNING_SECRET") {
        config.webhook.chat_signing_secret = val;
    }
    if let Ok(val) = env::var("OPS_WEBHOOK__TICKETING_SHARED_SECRET") {
        config.webhook.ticketing_shared_secret = val;
    }
    if let Ok(val) = env::var("OPS_WEBHOOK__MAIL_SHARED_SECRET") {
        config.webhook.mail_shared_secret = val;
    }
    if let Ok(val) = env::var("OPS_WEBHOOK__ALERT_WEBHOOK_URL") {
        config.webhook.alert_webhook_url = val;
    }
    if let Ok(val) = env::var("OPS_SERVER__HOST") {
        config.server.host = val;
    }
    if let Ok(val) = env::var("OPS_SERVER__PORT") {
        if let Ok(n) = val.parse() {
            config.server.port = n;
        }
    }
    if let Ok(val) = env::var("OPS_SERVER__ADMIN_API_TOKEN") {
        config.server.admin_api_token = val;
    }
    if let Ok(val) = env::var("OPS_OBSERVABILITY__LOG_LEVEL") {
        config.observability.log_level = val;
    }
    if let Ok(val) = env::var("OPS_OBSERVABILITY__ENVIRONMENT") {
        config.observability.environment = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_applies_on_top_of_defaults() {
        std::env::set_var("OPS_SERVER__PORT", "9999");
        let mut config = Config::default();
        apply(&mut config);
        assert_eq!(config.server.port, 9999);
        std::env::remove_var("OPS_SERVER__PORT");
    }
}
