//! Consumer loop: drains the queue, runs each leased event through
//! classify -> enrich -> reason, then acks or nacks depending on the
//! outcome.

use std::sync::Arc;
use std::time::Duration;

use ops_core::classifier::Classifier;
use ops_core::context::ContextEngine;
use ops_core::guardrails::{GuardrailDecision, GuardrailEngine};
use ops_core::queue::Queue;
use ops_core::reasoning::{ReasoningEngine, ReasoningOutcome};
use ops_core::storage::{action_log, knowledge, DbPool};
use tokio_util::sync::CancellationToken;

/// How long to sleep after finding the queue empty or paused before
/// polling again.
const IDLE_SLEEP: Duration = Duration::from_millis(500);

pub struct Consumer {
    db: DbPool,
    queue: Arc<Queue>,
    classifier: Arc<Classifier>,
    context: Arc<ContextEngine>,
    guardrails: Arc<GuardrailEngine>,
    reasoning: Arc<ReasoningEngine>,
}

impl Consumer {
    pub fn new(
        db: DbPool,
        queue: Arc<Queue>,
        classifier: Arc<Classifier>,
        context: Arc<ContextEngine>,
        guardrails: Arc<GuardrailEngine>,
        reasoning: Arc<ReasoningEngine>,
    ) -> Self {
        Self { db, queue, classifier, context, guardrails, reasoning }
    }

    /// Pulls the contact address an event concerns out of its payload,
    /// matching the context engine's retrieval lookup.
    fn recipient_of(event: &ops_core::model::Event) -> String {
        event
            .payload
            .get("from")
            .or_else(|| event.payload.get("recipient"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }

    /// Pulls the free-text body a sender taught a standing rule through,
    /// for storage as a knowledge entry.
    fn taught_text_of(event: &ops_core::model::Event) -> String {
        event
            .payload
            .get("text")
            .or_else(|| event.payload.get("body"))
            .or_else(|| event.payload.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }

    /// Runs the drain loop until `cancel` fires. A paused queue or an
    /// empty queue both just sleep and retry; neither is an error.
    pub async fn run_until_shutdown(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("consumer shutting down");
                    return;
                }
                () = self.drain_once() => {}
            }
        }
    }

    async fn drain_once(&self) {
        match self.queue.is_paused().await {
            Ok(true) => {
                tokio::time::sleep(IDLE_SLEEP).await;
                return;
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to check pause flag");
                tokio::time::sleep(IDLE_SLEEP).await;
                return;
            }
        }

        let leased = match self.queue.consume().await {
            Ok(Some(leased)) => leased,
            Ok(None) => {
                tokio::time::sleep(IDLE_SLEEP).await;
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to consume from queue");
                tokio::time::sleep(IDLE_SLEEP).await;
                return;
            }
        };

        let event = &leased.event;
        let recipient = Self::recipient_of(event);
        if !recipient.is_empty() {
            if let GuardrailDecision::Block { reason } = self.guardrails.check_restricted_contact(&recipient) {
                tracing::info!(event_id = %event.id, %recipient, %reason, "event blocked by guardrails before classification");
                if let Err(err) = action_log::record(
                    &self.db,
                    &event.id,
                    "guardrail_check",
                    &serde_json::json!({"recipient": recipient}),
                    &serde_json::json!({"reason": reason}),
                    &uuid::Uuid::new_v4().to_string(),
                    0,
                    "blocked",
                    "",
                    0,
                    0,
                )
                .await
                {
                    tracing::warn!(error = %err, event_id = %event.id, "failed to record blocked action");
                }
                if let Err(err) = self.queue.ack(&leased).await {
                    tracing::warn!(error = %err, event_id = %event.id, "failed to ack blocked event");
                }
                return;
            }
        }

        let classification = self.classifier.classify(event).await;

        if classification.is_teachable_rule {
            let taught = Self::taught_text_of(event);
            if let Err(err) = knowledge::insert(
                &self.db,
                &format!("taught_rule: {}", event.source),
                &taught,
                None,
            )
            .await
            {
                tracing::warn!(error = %err, event_id = %event.id, "failed to store taught rule");
            }
            if let Err(err) = self.queue.ack(&leased).await {
                tracing::warn!(error = %err, event_id = %event.id, "failed to ack taught-rule event");
            }
            return;
        }

        let context = match self.context.enrich(event).await {
            Ok(context) => context,
            Err(err) => {
                tracing::warn!(error = %err, event_id = %event.id, "context enrichment failed");
                ops_core::context::EnrichedContext::default()
            }
        };

        match self.reasoning.reason_and_act(event, &classification, &context).await {
            Ok(result) => {
                match &result.outcome {
                    ReasoningOutcome::Finalized { text } => {
                        tracing::info!(event_id = %event.id, turns = result.turns_used, summary = %text, "event processed");
                    }
                    ReasoningOutcome::MaxTurnsReached => {
                        tracing::warn!(event_id = %event.id, turns = result.turns_used, "reasoning loop hit max turns without finalizing");
                    }
                }
                if let Err(err) = self.queue.ack(&leased).await {
                    tracing::warn!(error = %err, event_id = %event.id, "failed to ack event");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, event_id = %event.id, "reasoning failed, nacking");
                if let Err(nack_err) = self.queue.nack(&leased, &err.to_string()).await {
                    tracing::warn!(error = %nack_err, event_id = %event.id, "failed to nack event");
                }
            }
        }
    }
}
