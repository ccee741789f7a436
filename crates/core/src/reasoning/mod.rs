//! Reasoning engine: the multi-turn tool-calling loop that turns a
//! classified, context-enriched event into action.
//!
//! Generalizes the teacher's single-shot generation call into a bounded
//! agent loop: call the provider, execute whatever tools it asks for,
//! append the results, call again, until it stops asking or `max_turns`
//! is reached.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::context::EnrichedContext;
use crate::error::{ReasoningError, ToolError};
use crate::guardrails::{GuardrailDecision, GuardrailEngine};
use crate::llm::factory::ModelTier;
use crate::llm::{GenerationParams, LlmProvider, LlmResponse, Message, ToolCall, ToolSpec, TokenUsage};
use crate::model::{ClassificationResult, Complexity, Event};
use crate::storage::{action_log, drafts, proposals, DbPool};
use crate::tools::ToolRegistry;

/// Reserved tool names the reasoning loop dispatches itself rather than
/// through the tool registry: these don't execute anything, they just
/// hand an outbound reply or mutating action to a human for approval.
const PROPOSE_DRAFT_REPLY: &str = "propose_draft_reply";
const PROPOSE_ACTION: &str = "propose_action";

fn approval_tool_specs() -> [ToolSpec; 2] {
    [
        ToolSpec {
            name: PROPOSE_DRAFT_REPLY.to_string(),
            description: "Draft an outbound reply for a human to review and send. Does not send anything itself.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "channel": {"type": "string", "description": "mail or chat"},
                    "recipient": {"type": "string"},
                    "subject": {"type": "string"},
                    "body": {"type": "string"}
                },
                "required": ["channel", "recipient", "body"]
            }),
        },
        ToolSpec {
            name: PROPOSE_ACTION.to_string(),
            description: "Propose a learned rule, tool, automation, or adjustment for a human to approve before it takes effect.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "proposal_type": {
                        "type": "string",
                        "enum": [
                            "learned_rule", "strong_rule", "tool_creation", "automation",
                            "external_tool_server", "guardrail_override", "threshold_adjustment",
                            "playbook_suggestion"
                        ]
                    },
                    "params": {"type": "object"},
                    "reason": {"type": "string"}
                },
                "required": ["proposal_type", "params", "reason"]
            }),
        },
    ]
}

/// What the loop produced: either it finalized with text, or it ran out
/// of turns while the model kept asking for more tool calls.
#[derive(Debug, Clone)]
pub enum ReasoningOutcome {
    Finalized { text: String },
    MaxTurnsReached,
}

#[derive(Debug, Clone)]
pub struct ReasoningResult {
    pub outcome: ReasoningOutcome,
    pub usage: TokenUsage,
    pub turns_used: u32,
}

const OPERATOR_SYSTEM_PROMPT: &str = "You are an operations agent acting on behalf of the team. \
You have been given an event, its classification, and retrieved context. \
Use the available tools to investigate and resolve it, or to draft a reply for human approval. \
Respond in the language the sender used. When you are done, summarize what you did.";

pub struct ReasoningEngine {
    db: DbPool,
    tools: Arc<ToolRegistry>,
    guardrails: Arc<GuardrailEngine>,
    fast: Arc<dyn LlmProvider>,
    moderate: Arc<dyn LlmProvider>,
    pro: Arc<dyn LlmProvider>,
    max_turns: u32,
}

impl ReasoningEngine {
    pub fn new(
        db: DbPool,
        tools: Arc<ToolRegistry>,
        guardrails: Arc<GuardrailEngine>,
        fast: Arc<dyn LlmProvider>,
        moderate: Arc<dyn LlmProvider>,
        pro: Arc<dyn LlmProvider>,
        max_turns: u32,
    ) -> Self {
        Self { db, tools, guardrails, fast, moderate, pro, max_turns }
    }

    /// Picks the model tier per the classification's urgency/complexity,
    /// floored at `moderate` for a chat message that needs a response.
    pub fn select_tier(&self, event: &Event, classification: &ClassificationResult) -> ModelTier {
        if classification.is_vip || classification.is_financial {
            return ModelTier::Pro;
        }
        if classification.complexity == Complexity::Complex {
            return ModelTier::Pro;
        }
        if event.source == "chat" && classification.needs_response {
            return ModelTier::Moderate;
        }
        match classification.complexity {
            Complexity::Simple => ModelTier::Fast,
            _ => ModelTier::Moderate,
        }
    }

    fn provider_for(&self, tier: ModelTier) -> Arc<dyn LlmProvider> {
        match tier {
            ModelTier::Fast => self.fast.clone(),
            ModelTier::Moderate => self.moderate.clone(),
            ModelTier::Pro | ModelTier::Flash => self.pro.clone(),
        }
    }

    pub async fn reason_and_act(
        &self,
        event: &Event,
        classification: &ClassificationResult,
        context: &EnrichedContext,
    ) -> Result<ReasoningResult, ReasoningError> {
        let tier = self.select_tier(event, classification);
        let provider = self.provider_for(tier);
        let mut tool_specs = self.tools.tools_for_source(&event.source);
        tool_specs.extend(approval_tool_specs());
        let correlation_id = Uuid::new_v4().to_string();

        let mut history = vec![Message::User(build_user_turn(event, classification, context))];
        let mut usage = TokenUsage::default();
        let params = GenerationParams {
            max_tokens: 2048,
            temperature: 0.2,
            system_prompt: Some(OPERATOR_SYSTEM_PROMPT.to_string()),
        };

        for turn in 0..self.max_turns {
            let response = provider
                .complete_with_tools(OPERATOR_SYSTEM_PROMPT, &history, &tool_specs, &params)
                .await?;
            usage.accumulate(response.usage());

            match response {
                LlmResponse::Text { text, .. } => {
                    return Ok(ReasoningResult {
                        outcome: ReasoningOutcome::Finalized { text },
                        usage,
                        turns_used: turn + 1,
                    });
                }
                LlmResponse::ToolCalls { calls, usage: turn_usage } => {
                    history.push(Message::Assistant {
                        text: None,
                        tool_calls: calls.clone(),
                    });
                    for call in &calls {
                        let result = self
                            .execute_tool_call(event, call, &correlation_id, provider.name(), &turn_usage)
                            .await;
                        history.push(Message::ToolResult {
                            tool_call_id: call.id.clone(),
                            content: result.to_string(),
                        });
                    }
                }
            }
        }

        Ok(ReasoningResult {
            outcome: ReasoningOutcome::MaxTurnsReached,
            usage,
            turns_used: self.max_turns,
        })
    }

    /// Tool-level errors are values, not exceptions: a failed call is
    /// injected back into the transcript as `{"error": ...}` so the model
    /// can recover or escalate, rather than aborting the whole turn.
    async fn execute_tool_call(
        &self,
        event: &Event,
        call: &ToolCall,
        correlation_id: &str,
        model_used: &str,
        turn_usage: &TokenUsage,
    ) -> serde_json::Value {
        let start = Instant::now();
        let outcome = match call.name.as_str() {
            PROPOSE_DRAFT_REPLY => self.propose_draft_reply(event, &call.arguments).await,
            PROPOSE_ACTION => self.propose_action(event, &call.arguments).await,
            _ => self.tools.call(&call.name, call.arguments.clone()).await,
        };
        let elapsed_ms = start.elapsed().as_millis() as i64;

        let result = match &outcome {
            Ok(value) => value.clone(),
            Err(err) => serde_json::json!({ "error": err.to_string() }),
        };
        let outcome_str = if outcome.is_ok() { "success" } else { "error" };

        if let Err(err) = action_log::record(
            &self.db,
            &event.id,
            &call.name,
            &call.arguments,
            &result,
            correlation_id,
            elapsed_ms,
            outcome_str,
            model_used,
            turn_usage.input_tokens as i64,
            turn_usage.output_tokens as i64,
        )
        .await
        {
            tracing::warn!(error = %err, event_id = %event.id, tool = %call.name, "failed to record action log entry");
        }

        result
    }

    /// Guardrail-checks the recipient, then queues a draft for human
    /// approval. Never sends anything itself.
    async fn propose_draft_reply(&self, event: &Event, args: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let channel = args.get("channel").and_then(|v| v.as_str()).unwrap_or("mail");
        let recipient = args.get("recipient").and_then(|v| v.as_str()).ok_or_else(|| ToolError::InvalidParams {
            tool: PROPOSE_DRAFT_REPLY.to_string(),
            message: "requires a recipient".to_string(),
        })?;
        let subject = args.get("subject").and_then(|v| v.as_str());
        let body = args.get("body").and_then(|v| v.as_str()).ok_or_else(|| ToolError::InvalidParams {
            tool: PROPOSE_DRAFT_REPLY.to_string(),
            message: "requires a body".to_string(),
        })?;

        let decision = self.guardrails.evaluate("send_reply", Some(recipient), None).await.map_err(ToolError::from)?;
        if let GuardrailDecision::Block { reason } = decision {
            return Ok(serde_json::json!({ "blocked": true, "reason": reason }));
        }

        let draft_id = drafts::enqueue(&self.db, &event.id, channel, recipient, subject, body)
            .await
            .map_err(ToolError::from)?;
        Ok(serde_json::json!({ "draft_id": draft_id, "status": "pending_approval" }))
    }

    /// Guardrail-checks the proposal type's rate limit, then queues a
    /// mutating action for human approval.
    async fn propose_action(&self, event: &Event, args: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let proposal_type = args.get("proposal_type").and_then(|v| v.as_str()).ok_or_else(|| ToolError::InvalidParams {
            tool: PROPOSE_ACTION.to_string(),
            message: "requires a proposal_type".to_string(),
        })?;
        let params = args.get("params").cloned().unwrap_or(serde_json::json!({}));
        let reason = args.get("reason").and_then(|v| v.as_str()).unwrap_or("");

        let decision = self.guardrails.evaluate(proposal_type, None, None).await.map_err(ToolError::from)?;
        if let GuardrailDecision::Block { reason } = decision {
            return Ok(serde_json::json!({ "blocked": true, "reason": reason }));
        }

        let proposal_id = proposals::enqueue(&self.db, &event.id, proposal_type, &params, reason)
            .await
            .map_err(ToolError::from)?;
        Ok(serde_json::json!({ "proposal_id": proposal_id, "status": "pending_approval" }))
    }
}

fn build_user_turn(event: &Event, classification: &ClassificationResult, context: &EnrichedContext) -> String {
    serde_json::json!({
        "event": {
            "source": event.source,
            "event_type": event.event_type,
            "payload": event.payload,
        },
        "classification": {
            "urgency": classification.urgency.as_str(),
            "complexity": classification.complexity.as_str(),
            "needs_response": classification.needs_response,
            "category": classification.category,
            "detected_language": classification.detected_language,
        },
        "language_directive": language_directive(&classification.detected_language),
        "context": context.format(),
    })
    .to_string()
}

/// Tells the model which language to answer in, based on the classifier's
/// `detected_language`. English is the implicit default, so no directive
/// is needed for it.
fn language_directive(detected_language: &str) -> String {
    if detected_language.eq_ignore_ascii_case("en") {
        "Respond in English.".to_string()
    } else {
        format!("Respond in the same language as the sender (detected: {detected_language}).")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GuardrailsConfig, ToolsConfig};
    use crate::error::{LlmError, ToolError};
    use crate::guardrails::GuardrailEngine;
    use crate::kv::{KvStore, ScoredMember};
    use crate::model::Priority;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoopKv;

    #[async_trait]
    impl KvStore for NoopKv {
        async fn zadd(&self, _: &str, _: &str, _: i64) -> Result<(), crate::error::KvError> {
            Ok(())
        }
        async fn zpopmin(&self, _: &str) -> Result<Option<ScoredMember>, crate::error::KvError> {
            Ok(None)
        }
        async fn zrem(&self, _: &str, _: &str) -> Result<(), crate::error::KvError> {
            Ok(())
        }
        async fn zcard(&self, _: &str) -> Result<u64, crate::error::KvError> {
            Ok(0)
        }
        async fn set_nx_ex(&self, _: &str, _: &str, _: u64) -> Result<bool, crate::error::KvError> {
            Ok(true)
        }
        async fn compare_and_delete(&self, _: &str, _: &str) -> Result<bool, crate::error::KvError> {
            Ok(true)
        }
        async fn get(&self, _: &str) -> Result<Option<String>, crate::error::KvError> {
            Ok(None)
        }
        async fn set_ex(&self, _: &str, _: &str, _: u64) -> Result<(), crate::error::KvError> {
            Ok(())
        }
        async fn del(&self, _: &str) -> Result<(), crate::error::KvError> {
            Ok(())
        }
        async fn exists(&self, _: &str) -> Result<bool, crate::error::KvError> {
            Ok(false)
        }
        async fn incr_with_ttl(&self, _: &str, _: u64) -> Result<i64, crate::error::KvError> {
            Ok(1)
        }
    }

    /// Responds with one tool call on its first invocation, then
    /// finalizes with text, so the loop exercises both branches.
    struct ScriptedProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _: &str, _: &str, _: &GenerationParams) -> Result<LlmResponse, LlmError> {
            unimplemented!()
        }

        async fn complete_with_tools(
            &self,
            _: &str,
            _: &[Message],
            _: &[ToolSpec],
            _: &GenerationParams,
        ) -> Result<LlmResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(LlmResponse::ToolCalls {
                    calls: vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "noop".to_string(),
                        arguments: serde_json::json!({}),
                    }],
                    usage: Default::default(),
                })
            } else {
                Ok(LlmResponse::Text {
                    text: "done".to_string(),
                    usage: Default::default(),
                })
            }
        }

        async fn health_check(&self) -> Result<(), LlmError> {
            Ok(())
        }
    }

    struct AlwaysToolCallsProvider;

    #[async_trait]
    impl LlmProvider for AlwaysToolCallsProvider {
        fn name(&self) -> &str {
            "loops_forever"
        }
        async fn complete(&self, _: &str, _: &str, _: &GenerationParams) -> Result<LlmResponse, LlmError> {
            unimplemented!()
        }
        async fn complete_with_tools(
            &self,
            _: &str,
            _: &[Message],
            _: &[ToolSpec],
            _: &GenerationParams,
        ) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse::ToolCalls {
                calls: vec![ToolCall {
                    id: "call_x".to_string(),
                    name: "noop".to_string(),
                    arguments: serde_json::json!({}),
                }],
                usage: Default::default(),
            })
        }
        async fn health_check(&self) -> Result<(), LlmError> {
            Ok(())
        }
    }

    struct NoopTool;

    #[async_trait]
    impl crate::tools::ToolHandler for NoopTool {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        async fn call(&self, _: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!({"ok": true}))
        }
    }

    fn test_guardrails() -> Arc<GuardrailEngine> {
        Arc::new(GuardrailEngine::new(
            Arc::new(NoopKv),
            GuardrailsConfig {
                restricted_contacts: vec![],
                default_tool_rate_limit_per_minute: 1000,
            },
        ))
    }

    async fn registry_with_noop() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new(test_guardrails(), ToolsConfig::default());
        registry.register(Arc::new(NoopTool));
        Arc::new(registry)
    }

    fn sample_event() -> Event {
        Event {
            id: "e1".to_string(),
            source: "mail".to_string(),
            event_type: "new_message".to_string(),
            payload: serde_json::json!({}),
            priority: Priority::Medium as i32,
            idempotency_key: None,
            status: "pending".to_string(),
            retry_count: 0,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn sample_classification() -> ClassificationResult {
        ClassificationResult {
            urgency: Priority::Medium,
            complexity: Complexity::Simple,
            needs_response: true,
            category: "general".to_string(),
            confidence: 0.8,
            is_vip: false,
            is_financial: false,
            detected_language: "en".to_string(),
            is_teachable_rule: false,
        }
    }

    #[tokio::test]
    async fn loop_finalizes_after_tool_call_then_text() {
        let db = crate::storage::init_test_db().await.unwrap();
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider { calls: AtomicU32::new(0) });
        let engine = ReasoningEngine::new(db, registry_with_noop().await, test_guardrails(), provider.clone(), provider.clone(), provider, 10);
        let result = engine
            .reason_and_act(&sample_event(), &sample_classification(), &EnrichedContext::default())
            .await
            .unwrap();
        assert!(matches!(result.outcome, ReasoningOutcome::Finalized { .. }));
        assert_eq!(result.turns_used, 2);
    }

    #[tokio::test]
    async fn loop_stops_at_max_turns() {
        let db = crate::storage::init_test_db().await.unwrap();
        let provider: Arc<dyn LlmProvider> = Arc::new(AlwaysToolCallsProvider);
        let engine = ReasoningEngine::new(db, registry_with_noop().await, test_guardrails(), provider.clone(), provider.clone(), provider, 10);
        let result = engine
            .reason_and_act(&sample_event(), &sample_classification(), &EnrichedContext::default())
            .await
            .unwrap();
        assert!(matches!(result.outcome, ReasoningOutcome::MaxTurnsReached));
        assert_eq!(result.turns_used, 10);
    }

    async fn test_engine() -> ReasoningEngine {
        let db = crate::storage::init_test_db().await.unwrap();
        let provider: Arc<dyn LlmProvider> = Arc::new(AlwaysToolCallsProvider);
        ReasoningEngine::new(db, registry_with_noop().await, test_guardrails(), provider.clone(), provider.clone(), provider, 10)
    }

    #[tokio::test]
    async fn vip_classification_selects_pro_tier() {
        let engine = test_engine().await;
        let mut event = sample_event();
        event.source = "ticketing".to_string();
        let classification = ClassificationResult {
            is_vip: true,
            ..sample_classification()
        };
        assert_eq!(engine.select_tier(&event, &classification), ModelTier::Pro);
    }

    #[tokio::test]
    async fn chat_needing_response_floors_at_moderate() {
        let engine = test_engine().await;
        let mut event = sample_event();
        event.source = "chat".to_string();
        let classification = ClassificationResult {
            complexity: Complexity::Simple,
            needs_response: true,
            ..sample_classification()
        };
        assert_eq!(engine.select_tier(&event, &classification), ModelTier::Moderate);
    }

    #[tokio::test]
    async fn simple_non_chat_event_selects_fast_tier() {
        let engine = test_engine().await;
        let event = sample_event();
        let classification = sample_classification();
        assert_eq!(engine.select_tier(&event, &classification), ModelTier::Fast);
    }
}
