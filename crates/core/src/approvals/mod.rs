//! Human-in-the-loop approval workflow for outbound drafts and proposed
//! mutating actions.
//!
//! Generalizes the teacher's single-purpose approve/reject endpoints
//! (approve a reply, discard a reply) into a dispatch table keyed by
//! `ProposalType`, since this system proposes more than one kind of
//! learning artifact: a rule the agent distilled, a new tool it wants
//! registered, a recurring automation, a guardrail exception, a
//! threshold correction, or something that needs a human to wire up
//! by hand.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ApprovalError;
use crate::guardrails::{GuardrailDecision, GuardrailEngine};
use crate::llm::{GenerationParams, LlmProvider, LlmResponse};
use crate::model::{Baseline, EventSource, Priority, Proposal, ProposalType};
use crate::patterns::PatternDetector;
use crate::queue::Queue;
use crate::sandbox::ScriptRunner;
use crate::storage::drafts::Draft;
use crate::storage::{drafts, draft_feedback, dynamic_tools, knowledge, proposals, solutions, DbPool};
use crate::tools;

const EDIT_ANALYSIS_SYSTEM_PROMPT: &str = "You compare an agent-drafted reply against the operator's \
edited version and extract concrete, actionable rules the agent should follow next time. Format each \
rule on its own line starting with \"RULE: \".";

const REJECTION_ANALYSIS_SYSTEM_PROMPT: &str = "An agent-drafted reply was rejected by the operator. \
Identify what was wrong and propose rules to avoid the mistake. Format each rule on its own line \
starting with \"RULE: \".";

pub struct ApprovalService {
    db: DbPool,
    guardrails: Arc<GuardrailEngine>,
    sandbox: Arc<ScriptRunner>,
    queue: Arc<Queue>,
    patterns: Arc<PatternDetector>,
    /// Flash-tier provider used for the lightweight qualitative analysis
    /// an edit or rejection triggers — not the reasoning loop's model.
    learner: Arc<dyn LlmProvider>,
}

impl ApprovalService {
    pub fn new(
        db: DbPool,
        guardrails: Arc<GuardrailEngine>,
        sandbox: Arc<ScriptRunner>,
        queue: Arc<Queue>,
        patterns: Arc<PatternDetector>,
        learner: Arc<dyn LlmProvider>,
    ) -> Self {
        Self { db, guardrails, sandbox, queue, patterns, learner }
    }

    pub async fn pending_drafts(&self) -> Result<Vec<Draft>, ApprovalError> {
        Ok(drafts::get_pending(&self.db).await?)
    }

    pub async fn pending_proposals(&self) -> Result<Vec<Proposal>, ApprovalError> {
        let rows = proposals::get_pending(&self.db).await?;
        rows.into_iter().map(row_to_proposal).collect()
    }

    pub async fn approve_draft(&self, draft_id: &str) -> Result<(), ApprovalError> {
        let draft = self.get_draft(draft_id).await?;
        self.require_status(&draft.status, draft_id, "draft", "approve")?;

        let decision = self
            .guardrails
            .evaluate("send_reply", Some(&draft.recipient), None)
            .await?;
        if let GuardrailDecision::Block { reason } = decision {
            return Err(ApprovalError::GuardrailBlocked { reason });
        }

        drafts::update_status(&self.db, draft_id, "approved").await?;
        Ok(())
    }

    /// Records the operator's edit as a learning signal before applying
    /// it: edit distance/ratio against the original draft, persisted to
    /// `draft_feedback`, then a flash-tier call that proposes concrete
    /// rules from the diff.
    pub async fn edit_and_approve_draft(&self, draft_id: &str, body: &str) -> Result<(), ApprovalError> {
        let draft = self.get_draft(draft_id).await?;
        self.require_status(&draft.status, draft_id, "draft", "approve")?;

        let edit_distance = strsim::levenshtein(&draft.body, body);
        let max_len = draft.body.chars().count().max(body.chars().count()).max(1);
        let edit_ratio = edit_distance as f64 / max_len as f64;
        let sender_domain = sender_domain_of(&draft.recipient);

        draft_feedback::insert(
            &self.db,
            draft_id,
            &sender_domain,
            &draft.channel,
            edit_distance as i64,
            edit_ratio,
            draft.body.chars().count() as i64,
            body.chars().count() as i64,
        )
        .await?;

        self.analyze_edit(&draft, body, &sender_domain).await;

        drafts::update_body_and_approve(&self.db, draft_id, body).await?;
        Ok(())
    }

    /// Rejecting a draft triggers the same rule-proposing analysis as an
    /// edit, framed around why the whole reply was wrong rather than
    /// what changed.
    pub async fn reject_draft(&self, draft_id: &str, reason: Option<&str>) -> Result<(), ApprovalError> {
        let draft = self.get_draft(draft_id).await?;
        self.require_status(&draft.status, draft_id, "draft", "reject")?;
        self.analyze_rejection(&draft, reason).await;
        drafts::update_status(&self.db, draft_id, "rejected").await?;
        Ok(())
    }

    /// Calls the flash model with the original/edited pair and stores a
    /// `learned_rule` proposal per "RULE: " line in the response. Never
    /// fails the caller: a provider error or an empty response just means
    /// no rule gets proposed this time.
    async fn analyze_edit(&self, draft: &Draft, edited: &str, sender_domain: &str) {
        let prompt = format!(
            "ORIGINAL (agent wrote):\n{}\n\nEDITED (operator corrected to):\n{}\n\nSender domain: {}\nChannel: {}\n\n\
List each specific change as a concrete, actionable rule.",
            draft.body, edited, sender_domain, draft.channel,
        );
        let response = match self.call_learner(EDIT_ANALYSIS_SYSTEM_PROMPT, &prompt).await {
            Some(text) => text,
            None => return,
        };

        let title = if sender_domain.is_empty() {
            "draft style rule".to_string()
        } else {
            format!("draft style rule for {sender_domain}")
        };
        let reason = format!("learned from edit of draft {}", draft.id);
        for rule in parse_rules(&response) {
            let params = serde_json::json!({"title": title, "description": rule});
            if let Err(err) = proposals::enqueue(&self.db, &draft.event_id, ProposalType::LearnedRule.as_str(), &params, &reason).await {
                tracing::warn!(error = %err, draft_id = %draft.id, "failed to store proposed rule from edit");
            }
        }
    }

    async fn analyze_rejection(&self, draft: &Draft, reason: Option<&str>) {
        let reason = reason.unwrap_or("not specified");
        let prompt = format!(
            "DRAFT (rejected):\n{}\n\nOPERATOR'S REASON: {reason}\n\n\
What was wrong? Propose rules to avoid this mistake.",
            draft.body,
        );
        let response = match self.call_learner(REJECTION_ANALYSIS_SYSTEM_PROMPT, &prompt).await {
            Some(text) => text,
            None => return,
        };

        let title = format!("rejection learning (draft {})", draft.id);
        let evidence = format!("learned from rejection of draft {}. reason: {reason}", draft.id);
        for rule in parse_rules(&response) {
            let params = serde_json::json!({"title": title, "description": rule});
            if let Err(err) = proposals::enqueue(&self.db, &draft.event_id, ProposalType::LearnedRule.as_str(), &params, &evidence).await {
                tracing::warn!(error = %err, draft_id = %draft.id, "failed to store proposed rule from rejection");
            }
        }
    }

    async fn call_learner(&self, system: &str, prompt: &str) -> Option<String> {
        let params = GenerationParams {
            max_tokens: 500,
            temperature: 0.0,
            system_prompt: Some(system.to_string()),
        };
        match self.learner.complete(system, prompt, &params).await {
            Ok(LlmResponse::Text { text, .. }) => Some(text),
            Ok(LlmResponse::ToolCalls { .. }) => None,
            Err(err) => {
                tracing::warn!(error = %err, "qualitative learning analysis call failed");
                None
            }
        }
    }

    pub async fn reject_proposal(&self, proposal_id: &str) -> Result<(), ApprovalError> {
        let proposal = self.get_proposal(proposal_id).await?;
        self.require_status(&proposal.status, proposal_id, "proposal", "reject")?;
        proposals::update_status(&self.db, proposal_id, "rejected").await?;
        Ok(())
    }

    /// Approves a proposal and immediately executes it, dispatching by
    /// `ProposalType`. The operator's verdict is final here: no guardrail
    /// check gates this path, since none of the eight proposal types are
    /// themselves an outbound contact action (those go through
    /// `approve_draft`, which does guardrail-check).
    pub async fn approve_and_execute_proposal(&self, proposal_id: &str) -> Result<Value, ApprovalError> {
        let proposal = self.get_proposal(proposal_id).await?;
        self.require_status(&proposal.status, proposal_id, "proposal", "approve")?;

        let proposal_type = ProposalType::from_str(&proposal.proposal_type).ok_or_else(|| ApprovalError::NotFound {
            what: "proposal type".to_string(),
            id: proposal.proposal_type.clone(),
        })?;

        let result = self.execute_approval(proposal_type, &proposal.params).await?;
        proposals::update_status(&self.db, proposal_id, "approved").await?;
        Ok(result)
    }

    /// Type -> handler table for an approved proposal.
    async fn execute_approval(&self, proposal_type: ProposalType, params: &Value) -> Result<Value, ApprovalError> {
        match proposal_type {
            ProposalType::LearnedRule | ProposalType::StrongRule => self.execute_learned_rule(params).await,
            ProposalType::GuardrailOverride => self.execute_guardrail_override(params).await,
            ProposalType::ToolCreation => self.execute_tool_creation(params).await,
            ProposalType::Automation => self.execute_automation(params).await,
            ProposalType::ThresholdAdjustment => self.execute_threshold_adjustment(params).await,
            ProposalType::ExternalToolServer | ProposalType::PlaybookSuggestion => {
                Ok(serde_json::json!({"status": "manual_follow_up_required"}))
            }
        }
    }

    /// Persists the learned/strong rule's description as a knowledge
    /// entry the context engine can retrieve later.
    async fn execute_learned_rule(&self, params: &Value) -> Result<Value, ApprovalError> {
        let title = params.get("title").and_then(|v| v.as_str()).unwrap_or("learned rule");
        let content = params
            .get("description")
            .or_else(|| params.get("rule"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApprovalError::NotFound {
                what: "description".to_string(),
                id: "params.description".to_string(),
            })?;
        let id = knowledge::insert(&self.db, title, content, None).await?;
        Ok(serde_json::json!({"knowledge_id": id}))
    }

    /// Re-publishes the original event as an admin-sourced
    /// `guardrail_override` event carrying a `skip_guardrails` flag, so
    /// the worker reprocesses it past the rule that blocked it the
    /// first time.
    async fn execute_guardrail_override(&self, params: &Value) -> Result<Value, ApprovalError> {
        let original_event_id = params.get("event_id").and_then(|v| v.as_str()).ok_or_else(|| ApprovalError::NotFound {
            what: "event_id".to_string(),
            id: "params.event_id".to_string(),
        })?;
        let rule_name = params.get("rule_name").and_then(|v| v.as_str()).unwrap_or("");
        let payload = serde_json::json!({
            "original_event_id": original_event_id,
            "rule_name": rule_name,
            "skip_guardrails": true,
        });
        let republished_id = self
            .queue
            .publish(EventSource::Admin.as_str(), "guardrail_override", payload, Priority::High, None)
            .await?;
        Ok(serde_json::json!({"republished_event_id": republished_id}))
    }

    /// Validates the proposed script against the sandbox, persists it as
    /// an active solution, and registers it as a dynamic tool. The tool
    /// is loaded into the running registry on the next restart, matching
    /// how persisted dynamic tools are always reloaded at startup.
    async fn execute_tool_creation(&self, params: &Value) -> Result<Value, ApprovalError> {
        let name = params.get("name").and_then(|v| v.as_str()).ok_or_else(|| ApprovalError::NotFound {
            what: "name".to_string(),
            id: "params.name".to_string(),
        })?;
        let description = params.get("description").and_then(|v| v.as_str()).unwrap_or("");
        let code = params.get("code").and_then(|v| v.as_str()).ok_or_else(|| ApprovalError::NotFound {
            what: "code".to_string(),
            id: "params.code".to_string(),
        })?;
        let schema = params
            .get("parameters_schema")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}));

        tools::validate_dynamic_tool(&self.sandbox, code).await?;
        dynamic_tools::upsert(&self.db, name, description, &schema, code).await?;
        let solution_id = solutions::insert_tool(&self.db, name, description, code, "operator").await?;
        Ok(serde_json::json!({"solution_id": solution_id, "tool_name": name}))
    }

    /// Stores the automation as a solution, folding its trigger
    /// (cron or event-driven) into the solution's `config` column rather
    /// than a separate trigger table.
    async fn execute_automation(&self, params: &Value) -> Result<Value, ApprovalError> {
        let name = params.get("name").and_then(|v| v.as_str()).ok_or_else(|| ApprovalError::NotFound {
            what: "name".to_string(),
            id: "params.name".to_string(),
        })?;
        let description = params.get("description").and_then(|v| v.as_str()).unwrap_or("");
        let code = params.get("code").and_then(|v| v.as_str());
        let config = params.get("config").cloned().ok_or_else(|| ApprovalError::NotFound {
            what: "config".to_string(),
            id: "params.config".to_string(),
        })?;
        let solution_id = solutions::insert_automation(&self.db, name, description, code, &config, "operator").await?;
        Ok(serde_json::json!({"solution_id": solution_id}))
    }

    /// Upserts the operator-edited baseline bucket and refreshes the
    /// pattern detector's in-memory cache so the next detection pass
    /// sees it immediately instead of after the weekly recompute.
    async fn execute_threshold_adjustment(&self, params: &Value) -> Result<Value, ApprovalError> {
        let source = params.get("source").and_then(|v| v.as_str()).ok_or_else(|| ApprovalError::NotFound {
            what: "source".to_string(),
            id: "params.source".to_string(),
        })?;
        let event_type = params.get("event_type").and_then(|v| v.as_str()).ok_or_else(|| ApprovalError::NotFound {
            what: "event_type".to_string(),
            id: "params.event_type".to_string(),
        })?;
        let mean = params.get("mean").and_then(|v| v.as_f64()).ok_or_else(|| ApprovalError::NotFound {
            what: "mean".to_string(),
            id: "params.mean".to_string(),
        })?;
        let day_of_week = params.get("day_of_week").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
        let hour = params.get("hour").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
        let stddev = params.get("stddev").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let sample_count = params.get("sample_count").and_then(|v| v.as_i64()).unwrap_or(0);

        let baseline = Baseline {
            source: source.to_string(),
            event_type: event_type.to_string(),
            day_of_week,
            hour,
            mean,
            stddev,
            sample_count,
            updated_at: chrono::Utc::now(),
        };
        self.patterns.apply_threshold_adjustment(&self.db, baseline).await?;
        Ok(serde_json::json!({"source": source, "event_type": event_type}))
    }

    async fn get_draft(&self, draft_id: &str) -> Result<Draft, ApprovalError> {
        drafts::get_by_id(&self.db, draft_id).await?.ok_or_else(|| ApprovalError::NotFound {
            what: "draft".to_string(),
            id: draft_id.to_string(),
        })
    }

    async fn get_proposal(&self, proposal_id: &str) -> Result<Proposal, ApprovalError> {
        let row = proposals::get_by_id(&self.db, proposal_id).await?.ok_or_else(|| ApprovalError::NotFound {
            what: "proposal".to_string(),
            id: proposal_id.to_string(),
        })?;
        row_to_proposal(row)
    }

    fn require_status(&self, status: &str, id: &str, what: &str, action: &str) -> Result<(), ApprovalError> {
        if status != "pending" {
            return Err(ApprovalError::InvalidState {
                what: what.to_string(),
                id: id.to_string(),
                status: status.to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }
}

fn sender_domain_of(recipient: &str) -> String {
    recipient.split('@').nth(1).unwrap_or("").to_string()
}

/// Pulls every "RULE: ..." line out of a flash-model response, same
/// convention for both the edit and rejection analysis prompts.
fn parse_rules(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            line.strip_prefix("RULE:").or_else(|| line.strip_prefix("rule:"))
        })
        .map(|rule| rule.trim().to_string())
        .filter(|rule| !rule.is_empty())
        .collect()
}

fn row_to_proposal(row: crate::storage::proposals::ProposalRow) -> Result<Proposal, ApprovalError> {
    let params: Value = serde_json::from_str(&row.params).unwrap_or(Value::Null);
    Ok(Proposal {
        id: row.id,
        event_id: row.event_id,
        proposal_type: row.proposal_type,
        params,
        reason: row.reason,
        status: row.status,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::config::GuardrailsConfig;
    use crate::kv::{FakeKvStore, KvStore};
    use crate::llm::{Message, TokenUsage, ToolSpec};
    use crate::storage::init_test_db;

    struct FakeLearner {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FakeLearner {
        fn name(&self) -> &str {
            "fake-flash"
        }

        async fn complete(&self, _system: &str, _user_message: &str, _params: &GenerationParams) -> Result<LlmResponse, crate::error::LlmError> {
            Ok(LlmResponse::Text {
                text: self.response.clone(),
                usage: TokenUsage { input_tokens: 10, output_tokens: 10 },
            })
        }

        async fn complete_with_tools(
            &self,
            _system: &str,
            _history: &[Message],
            _tools: &[ToolSpec],
            _params: &GenerationParams,
        ) -> Result<LlmResponse, crate::error::LlmError> {
            unimplemented!("not exercised by approval-workflow tests")
        }

        async fn health_check(&self) -> Result<(), crate::error::LlmError> {
            Ok(())
        }
    }

    fn service(db: DbPool) -> ApprovalService {
        service_with_learner(db, Arc::new(FakeLearner { response: String::new() }))
    }

    fn service_with_learner(db: DbPool, learner: Arc<dyn LlmProvider>) -> ApprovalService {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKvStore::default());
        let guardrails = Arc::new(GuardrailEngine::new(
            kv.clone(),
            GuardrailsConfig {
                restricted_contacts: vec!["blocked@example.com".to_string()],
                default_tool_rate_limit_per_minute: 100,
            },
        ));
        let queue = Arc::new(Queue::new(kv.clone(), db.clone(), 3, 60));
        let patterns = Arc::new(PatternDetector::new(kv));
        ApprovalService::new(db, guardrails, Arc::new(ScriptRunner::default()), queue, patterns, learner)
    }

    #[tokio::test]
    async fn approve_draft_happy_path() {
        let pool = init_test_db().await.unwrap();
        let id = drafts::enqueue(&pool, "evt_1", "mail", "a@b.com", None, "draft body").await.unwrap();
        let service = service(pool);
        service.approve_draft(&id).await.unwrap();
        let draft = service.get_draft(&id).await.unwrap();
        assert_eq!(draft.status, "approved");
    }

    #[tokio::test]
    async fn approve_draft_blocked_by_restricted_contact() {
        let pool = init_test_db().await.unwrap();
        let id = drafts::enqueue(&pool, "evt_1", "mail", "blocked@example.com", None, "draft").await.unwrap();
        let service = service(pool);
        let result = service.approve_draft(&id).await;
        assert!(matches!(result, Err(ApprovalError::GuardrailBlocked { .. })));
    }

    #[tokio::test]
    async fn approving_twice_fails_with_invalid_state() {
        let pool = init_test_db().await.unwrap();
        let id = drafts::enqueue(&pool, "evt_1", "mail", "a@b.com", None, "draft").await.unwrap();
        let service = service(pool);
        service.approve_draft(&id).await.unwrap();
        let result = service.approve_draft(&id).await;
        assert!(matches!(result, Err(ApprovalError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn learned_rule_proposal_stores_knowledge_entry() {
        let pool = init_test_db().await.unwrap();
        let id = proposals::enqueue(
            &pool,
            "evt_1",
            "learned_rule",
            &serde_json::json!({"title": "billing escalation", "description": "always escalate billing disputes over $500"}),
            "observed 6 similar cases this week",
        )
        .await
        .unwrap();
        let service = service(pool.clone());
        let result = service.approve_and_execute_proposal(&id).await.unwrap();
        assert!(result["knowledge_id"].is_string());
        let rows = knowledge::list_active(&pool, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "billing escalation");
    }

    #[tokio::test]
    async fn guardrail_override_proposal_republishes_event_with_skip_flag() {
        let pool = init_test_db().await.unwrap();
        let id = proposals::enqueue(
            &pool,
            "evt_1",
            "guardrail_override",
            &serde_json::json!({"event_id": "evt_1", "rule_name": "restricted_contact"}),
            "operator confirmed this contact is no longer restricted",
        )
        .await
        .unwrap();
        let service = service(pool);
        let result = service.approve_and_execute_proposal(&id).await.unwrap();
        assert!(result["republished_event_id"].is_string());
    }

    #[tokio::test]
    async fn tool_creation_proposal_validates_and_registers_dynamic_tool() {
        let pool = init_test_db().await.unwrap();
        let id = proposals::enqueue(
            &pool,
            "evt_1",
            "tool_creation",
            &serde_json::json!({
                "name": "weather_lookup",
                "description": "looks up weather for a city",
                "code": "function run(params) return { ok = true } end"
            }),
            "operator asked for a weather tool three times this week",
        )
        .await
        .unwrap();
        let service = service(pool.clone());
        let result = service.approve_and_execute_proposal(&id).await.unwrap();
        assert_eq!(result["tool_name"], "weather_lookup");
        assert!(dynamic_tools::get_by_name(&pool, "weather_lookup").await.unwrap().is_some());
        assert_eq!(solutions::list_active(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tool_creation_proposal_rejects_invalid_script() {
        let pool = init_test_db().await.unwrap();
        let id = proposals::enqueue(
            &pool,
            "evt_1",
            "tool_creation",
            &serde_json::json!({"name": "broken_tool", "description": "", "code": "this is not valid lua ("}),
            "operator requested",
        )
        .await
        .unwrap();
        let service = service(pool);
        let result = service.approve_and_execute_proposal(&id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn automation_proposal_stores_solution_with_trigger_config() {
        let pool = init_test_db().await.unwrap();
        let id = proposals::enqueue(
            &pool,
            "evt_1",
            "automation",
            &serde_json::json!({
                "name": "daily_digest",
                "description": "sends a daily digest to #ops",
                "config": {"trigger_type": "cron", "trigger_config": {"schedule": "0 9 * * *"}}
            }),
            "operator asked for a recurring summary",
        )
        .await
        .unwrap();
        let service = service(pool.clone());
        service.approve_and_execute_proposal(&id).await.unwrap();
        let rows = solutions::list_active(&pool).await.unwrap();
        assert_eq!(rows[0].solution_type, "automation");
        assert!(rows[0].config.as_deref().unwrap().contains("cron"));
    }

    #[tokio::test]
    async fn threshold_adjustment_proposal_upserts_baseline() {
        let pool = init_test_db().await.unwrap();
        let id = proposals::enqueue(
            &pool,
            "evt_1",
            "threshold_adjustment",
            &serde_json::json!({
                "source": "ticketing", "event_type": "new_ticket",
                "day_of_week": 3, "hour": 10, "mean": 12.0, "stddev": 3.0
            }),
            "baseline was too tight for Wednesday mornings",
        )
        .await
        .unwrap();
        let service = service(pool.clone());
        service.approve_and_execute_proposal(&id).await.unwrap();
        let baseline = crate::storage::baselines::get(&pool, "ticketing", "new_ticket", 3, 10).await.unwrap().unwrap();
        assert_eq!(baseline.mean, 12.0);
    }

    #[tokio::test]
    async fn external_tool_server_and_playbook_suggestion_are_manual() {
        let pool = init_test_db().await.unwrap();
        let id1 = proposals::enqueue(&pool, "evt_1", "external_tool_server", &serde_json::json!({}), "needs a new MCP server").await.unwrap();
        let id2 = proposals::enqueue(&pool, "evt_1", "playbook_suggestion", &serde_json::json!({}), "multi-step remediation idea").await.unwrap();
        let service = service(pool);
        let r1 = service.approve_and_execute_proposal(&id1).await.unwrap();
        let r2 = service.approve_and_execute_proposal(&id2).await.unwrap();
        assert_eq!(r1["status"], "manual_follow_up_required");
        assert_eq!(r2["status"], "manual_follow_up_required");
    }

    #[tokio::test]
    async fn edit_and_approve_draft_persists_feedback_and_proposes_rules() {
        let pool = init_test_db().await.unwrap();
        let id = drafts::enqueue(&pool, "evt_1", "mail", "buyer@acme.de", None, "Dear Sir, your order has shipped.").await.unwrap();
        let learner = Arc::new(FakeLearner {
            response: "RULE: Use first name instead of formal greeting for .de customers\nRULE: Keep replies under 3 sentences".to_string(),
        });
        let service = service_with_learner(pool.clone(), learner);

        service.edit_and_approve_draft(&id, "Hi Anna, your order has shipped!").await.unwrap();

        let draft = service.get_draft(&id).await.unwrap();
        assert_eq!(draft.status, "approved");
        assert_eq!(draft.body, "Hi Anna, your order has shipped!");

        let feedback: Vec<(String, String)> = sqlx::query_as("SELECT sender_domain, category FROM draft_feedback WHERE draft_id = ?")
            .bind(&id)
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(feedback, vec![("acme.de".to_string(), "mail".to_string())]);

        let proposals = proposals::get_pending(&pool).await.unwrap();
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].proposal_type, "learned_rule");
    }

    #[tokio::test]
    async fn reject_draft_with_reason_proposes_rule() {
        let pool = init_test_db().await.unwrap();
        let id = drafts::enqueue(&pool, "evt_1", "mail", "a@b.com", None, "Sure, here's a full refund.").await.unwrap();
        let learner = Arc::new(FakeLearner {
            response: "RULE: Never promise a refund without escalating to billing first".to_string(),
        });
        let service = service_with_learner(pool.clone(), learner);

        service.reject_draft(&id, Some("we don't auto-approve refunds")).await.unwrap();

        let draft = service.get_draft(&id).await.unwrap();
        assert_eq!(draft.status, "rejected");

        let proposals = proposals::get_pending(&pool).await.unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].proposal_type, "learned_rule");
        assert!(proposals[0].reason.contains("we don't auto-approve refunds"));
    }

    #[tokio::test]
    async fn edit_with_no_rules_in_response_proposes_nothing() {
        let pool = init_test_db().await.unwrap();
        let id = drafts::enqueue(&pool, "evt_1", "mail", "a@b.com", None, "original").await.unwrap();
        let learner = Arc::new(FakeLearner { response: "looks fine, no changes needed".to_string() });
        let service = service_with_learner(pool.clone(), learner);

        service.edit_and_approve_draft(&id, "original text").await.unwrap();

        assert!(proposals::get_pending(&pool).await.unwrap().is_empty());
    }
}
