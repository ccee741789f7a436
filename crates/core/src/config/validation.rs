//! Configuration validation logic.

use super::Config;
use crate::error::ConfigError;

/// Validate cross-field invariants. Returns the first violation found.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.queue.dedup_ttl_seconds < config.queue.lease_ttl_seconds {
        return Err(ConfigError::InvalidValue {
            field: "queue.dedup_ttl_seconds".to_string(),
            message: "must be >= queue.lease_ttl_seconds".to_string(),
        });
    }

    let lookbacks = [
        config.scheduler.mail_poll_lookback_seconds,
        config.scheduler.ticketing_poll_lookback_seconds,
        config.scheduler.chat_poll_lookback_seconds,
        config.scheduler.survey_poll_lookback_seconds,
        config.scheduler.project_management_poll_lookback_seconds,
        config.scheduler.drive_poll_lookback_seconds,
    ];
    if let Some(max_lookback) = lookbacks.iter().flatten().max() {
        if config.queue.dedup_ttl_seconds < *max_lookback {
            return Err(ConfigError::InvalidValue {
                field: "queue.dedup_ttl_seconds".to_string(),
                message: "must be >= the largest configured poller lookback window, or a \
                    re-polled item could be re-published after its dedup entry expires"
                    .to_string(),
            });
        }
    }

    if config.llm.max_turns == 0 {
        return Err(ConfigError::InvalidValue {
            field: "llm.max_turns".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    if config.sessions.compaction_threshold < 10 {
        return Err(ConfigError::InvalidValue {
            field: "sessions.compaction_threshold".to_string(),
            message: "must be at least 10 (compaction keeps the last 10 messages)".to_string(),
        });
    }

    if config.sandbox.timeout_seconds == 0 || config.sandbox.timeout_seconds > 300 {
        return Err(ConfigError::InvalidValue {
            field: "sandbox.timeout_seconds".to_string(),
            message: "must be between 1 and 300 seconds".to_string(),
        });
    }

    for server in &config.tools.mcp_servers {
        if server.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "tools.mcp_servers".to_string(),
                message: format!("server '{}' has an empty command", server.name),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn dedup_ttl_below_lease_ttl_is_rejected() {
        let mut config = Config::default();
        config.queue.lease_ttl_seconds = 1000;
        config.queue.dedup_ttl_seconds = 10;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn dedup_ttl_below_poller_lookback_is_rejected() {
        let mut config = Config::default();
        config.queue.dedup_ttl_seconds = 60;
        config.scheduler.mail_poll_lookback_seconds = Some(3600);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_max_turns_is_rejected() {
        let mut config = Config::default();
        config.llm.max_turns = 0;
        assert!(validate(&config).is_err());
    }
}
