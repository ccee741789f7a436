//! Guardrail engine: business rules followed by a per-tool sliding-window
//! rate limit, generalized from the teacher's `mcp_policy` evaluator
//! (ordered evaluation chain, first hard stop wins) and `mutation_gateway`
//! (policy check ahead of execution).

use std::sync::Arc;

use crate::config::GuardrailsConfig;
use crate::error::GuardrailError;
use crate::kv::{keys, KvStore};

/// Outcome of evaluating guardrails for one proposed tool call or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Block { reason: String },
}

pub struct GuardrailEngine {
    kv: Arc<dyn KvStore>,
    config: GuardrailsConfig,
}

impl GuardrailEngine {
    pub fn new(kv: Arc<dyn KvStore>, config: GuardrailsConfig) -> Self {
        Self { kv, config }
    }

    /// Business-rule check: is the recipient on the restricted-contacts
    /// list? Comparison is case-insensitive exact match, matching how the
    /// teacher's blocklist rules compare tool/category names.
    pub fn check_restricted_contact(&self, recipient: &str) -> GuardrailDecision {
        let recipient_lower = recipient.to_lowercase();
        if self
            .config
            .restricted_contacts
            .iter()
            .any(|c| c.to_lowercase() == recipient_lower)
        {
            GuardrailDecision::Block {
                reason: format!("recipient '{recipient}' is on the restricted contacts list"),
            }
        } else {
            GuardrailDecision::Allow
        }
    }

    /// Per-tool sliding-window rate limit: increments a minute-bucketed
    /// counter in KV, setting TTL only on first increment.
    pub async fn check_rate_limit(
        &self,
        tool: &str,
        max_per_minute: Option<u32>,
    ) -> Result<GuardrailDecision, GuardrailError> {
        let limit = max_per_minute.unwrap_or(self.config.default_tool_rate_limit_per_minute);
        let window = current_minute_window();
        let key = keys::rate_limit(tool, &window);
        let count = self.kv.incr_with_ttl(&key, 60).await?;
        if count as u32 > limit {
            Ok(GuardrailDecision::Block {
                reason: format!("rate limit exceeded for tool '{tool}' ({count}/{limit} per minute)"),
            })
        } else {
            Ok(GuardrailDecision::Allow)
        }
    }

    /// Runs both stages in order, short-circuiting on the first block —
    /// mirrors the teacher's ordered policy chain.
    pub async fn evaluate(
        &self,
        tool: &str,
        recipient: Option<&str>,
        max_per_minute: Option<u32>,
    ) -> Result<GuardrailDecision, GuardrailError> {
        if let Some(recipient) = recipient {
            let decision = self.check_restricted_contact(recipient);
            if decision != GuardrailDecision::Allow {
                return Ok(decision);
            }
        }
        self.check_rate_limit(tool, max_per_minute).await
    }
}

fn current_minute_window() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use crate::error::KvError;
    use crate::kv::ScoredMember;

    #[derive(Default)]
    struct FakeKv {
        counters: Mutex<HashMap<String, i64>>,
    }

    #[async_trait]
    impl KvStore for FakeKv {
        async fn zadd(&self, _key: &str, _member: &str, _score: i64) -> Result<(), KvError> {
            Ok(())
        }
        async fn zpopmin(&self, _key: &str) -> Result<Option<ScoredMember>, KvError> {
            Ok(None)
        }
        async fn zrem(&self, _key: &str, _member: &str) -> Result<(), KvError> {
            Ok(())
        }
        async fn zcard(&self, _key: &str) -> Result<u64, KvError> {
            Ok(0)
        }
        async fn set_nx_ex(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> Result<bool, KvError> {
            Ok(true)
        }
        async fn compare_and_delete(&self, _key: &str, _value: &str) -> Result<bool, KvError> {
            Ok(true)
        }
        async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Ok(None)
        }
        async fn set_ex(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> Result<(), KvError> {
            Ok(())
        }
        async fn del(&self, _key: &str) -> Result<(), KvError> {
            Ok(())
        }
        async fn exists(&self, _key: &str) -> Result<bool, KvError> {
            Ok(false)
        }
        async fn incr_with_ttl(&self, key: &str, _ttl_seconds: u64) -> Result<i64, KvError> {
            let mut counters = self.counters.lock().unwrap();
            let n = counters.entry(key.to_string()).or_insert(0);
            *n += 1;
            Ok(*n)
        }
    }

    fn engine() -> GuardrailEngine {
        let config = GuardrailsConfig {
            restricted_contacts: vec!["legal@example.com".to_string()],
            default_tool_rate_limit_per_minute: 2,
        };
        GuardrailEngine::new(Arc::new(FakeKv::default()), config)
    }

    #[test]
    fn restricted_contact_is_blocked_case_insensitively() {
        let engine = engine();
        let decision = engine.check_restricted_contact("Legal@Example.com");
        assert!(matches!(decision, GuardrailDecision::Block { .. }));
    }

    #[test]
    fn non_restricted_contact_is_allowed() {
        let engine = engine();
        assert_eq!(engine.check_restricted_contact("someone@example.com"), GuardrailDecision::Allow);
    }

    #[tokio::test]
    async fn rate_limit_blocks_after_max_calls_per_minute() {
        let engine = engine();
        assert_eq!(engine.check_rate_limit("send_reply", None).await.unwrap(), GuardrailDecision::Allow);
        assert_eq!(engine.check_rate_limit("send_reply", None).await.unwrap(), GuardrailDecision::Allow);
        assert!(matches!(
            engine.check_rate_limit("send_reply", None).await.unwrap(),
            GuardrailDecision::Block { .. }
        ));
    }

    #[tokio::test]
    async fn evaluate_short_circuits_on_restricted_contact_before_rate_limit() {
        let engine = engine();
        let decision = engine.evaluate("send_reply", Some("legal@example.com"), None).await.unwrap();
        assert!(matches!(decision, GuardrailDecision::Block { .. }));
    }
}
