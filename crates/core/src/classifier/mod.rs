//! Fast LLM-backed classification of an event into structured labels.
//!
//! Runs on the fast model tier. Tolerant of fenced-code-block JSON and
//! minor malformation; on provider failure or unparseable output it falls
//! back to a safe default rather than failing the whole pipeline.

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{GenerationParams, LlmProvider};
use crate::model::{ClassificationResult, Complexity, Event, Priority};

pub struct Classifier {
    provider: Arc<dyn LlmProvider>,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    urgency: String,
    complexity: String,
    needs_response: bool,
    category: String,
    confidence: f32,
    #[serde(default)]
    is_vip: bool,
    #[serde(default)]
    is_financial: bool,
    #[serde(default = "default_language")]
    detected_language: String,
    #[serde(default)]
    is_teachable_rule: bool,
}

fn default_language() -> String {
    "en".to_string()
}

const SYSTEM_PROMPT: &str = "You are an operations triage classifier. Given an event, \
respond with a single JSON object with keys: urgency (critical|high|medium|low|background), \
complexity (simple|moderate|complex), needs_response (bool), category (short string), \
confidence (0.0-1.0), is_vip (bool), is_financial (bool), detected_language (ISO 639-1 code \
of the language the message is written in, e.g. \"en\"), is_teachable_rule (bool, true when \
the message is an operator teaching a standing rule rather than reporting an event). \
Respond with JSON only.";

impl Classifier {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Classifies an event. Never returns an error: on provider failure or
    /// an unparseable response it falls back to a safe default so the
    /// pipeline keeps moving.
    pub async fn classify(&self, event: &Event) -> ClassificationResult {
        let event_priority = priority_from_i32(event.priority);
        let user_message = serde_json::json!({
            "source": event.source,
            "event_type": event.event_type,
            "payload": event.payload,
        })
        .to_string();

        let params = GenerationParams {
            max_tokens: 256,
            temperature: 0.0,
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
        };

        let response = match self.provider.complete(SYSTEM_PROMPT, &user_message, &params).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, event_id = %event.id, "classification call failed, using safe default");
                return safe_default(event_priority);
            }
        };

        let text = match &response {
            crate::llm::LlmResponse::Text { text, usage } => {
                tracing::debug!(
                    provider = self.provider.name(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    event_id = %event.id,
                    "classification call completed"
                );
                text.clone()
            }
            crate::llm::LlmResponse::ToolCalls { .. } => {
                tracing::warn!(event_id = %event.id, "classifier received tool calls, expected text");
                return safe_default(event_priority);
            }
        };

        match parse_classification(&text) {
            Some(result) => result,
            None => {
                tracing::warn!(event_id = %event.id, raw = %text, "failed to parse classification response");
                safe_default(event_priority)
            }
        }
    }
}

fn priority_from_i32(value: i32) -> Priority {
    Priority::from_i32_lenient(value)
}

fn safe_default(event_priority: Priority) -> ClassificationResult {
    ClassificationResult {
        urgency: event_priority,
        complexity: Complexity::Moderate,
        needs_response: true,
        category: "unclassified".to_string(),
        confidence: 0.0,
        is_vip: false,
        is_financial: false,
        detected_language: default_language(),
        is_teachable_rule: false,
    }
}

/// Parses a classification response, recovering JSON embedded in a fenced
/// code block (```json ... ``` or plain ``` ... ```) and tolerating a
/// leading/trailing prose sentence around the object.
fn parse_classification(text: &str) -> Option<ClassificationResult> {
    let candidate = extract_json_object(text)?;
    let raw: RawClassification = serde_json::from_str(&candidate).ok()?;
    Some(ClassificationResult {
        urgency: Priority::from_str_lenient(&raw.urgency),
        complexity: Complexity::from_str_lenient(&raw.complexity),
        needs_response: raw.needs_response,
        category: raw.category,
        confidence: raw.confidence.clamp(0.0, 1.0),
        is_vip: raw.is_vip,
        is_financial: raw.is_financial,
        detected_language: raw.detected_language,
        is_teachable_rule: raw.is_teachable_rule,
    })
}

fn extract_json_object(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if let Some(fenced) = trimmed.strip_prefix("```json") {
        if let Some(end) = fenced.find("```") {
            return Some(fenced[..end].trim().to_string());
        }
    }
    if let Some(fenced) = trimmed.strip_prefix("```") {
        if let Some(end) = fenced.find("```") {
            return Some(fenced[..end].trim().to_string());
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(trimmed[start..=end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{LlmResponse, Message, ToolSpec};
    use async_trait::async_trait;

    struct FixedProvider {
        text: String,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _: &str, _: &str, _: &GenerationParams) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse::Text {
                text: self.text.clone(),
                usage: Default::default(),
            })
        }

        async fn complete_with_tools(
            &self,
            _: &str,
            _: &[Message],
            _: &[ToolSpec],
            _: &GenerationParams,
        ) -> Result<LlmResponse, LlmError> {
            unimplemented!()
        }

        async fn health_check(&self) -> Result<(), LlmError> {
            Ok(())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _: &str, _: &str, _: &GenerationParams) -> Result<LlmResponse, LlmError> {
            Err(LlmError::GenerationFailed("boom".to_string()))
        }

        async fn complete_with_tools(
            &self,
            _: &str,
            _: &[Message],
            _: &[ToolSpec],
            _: &GenerationParams,
        ) -> Result<LlmResponse, LlmError> {
            unimplemented!()
        }

        async fn health_check(&self) -> Result<(), LlmError> {
            Ok(())
        }
    }

    fn sample_event() -> Event {
        Event {
            id: "e1".to_string(),
            source: "mail".to_string(),
            event_type: "new_message".to_string(),
            payload: serde_json::json!({"subject": "invoice overdue"}),
            priority: 1,
            idempotency_key: None,
            status: "pending".to_string(),
            retry_count: 0,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn classifies_well_formed_json() {
        let provider = FixedProvider {
            text: r#"{"urgency":"high","complexity":"simple","needs_response":true,"category":"billing","confidence":0.9,"is_vip":false,"is_financial":true,"detected_language":"en","is_teachable_rule":false}"#.to_string(),
        };
        let classifier = Classifier::new(Arc::new(provider));
        let result = classifier.classify(&sample_event()).await;
        assert_eq!(result.urgency, Priority::High);
        assert_eq!(result.complexity, Complexity::Simple);
        assert!(result.is_financial);
        assert_eq!(result.detected_language, "en");
    }

    #[tokio::test]
    async fn recovers_json_from_fenced_code_block() {
        let provider = FixedProvider {
            text: "Here you go:\n```json\n{\"urgency\":\"critical\",\"complexity\":\"complex\",\"needs_response\":true,\"category\":\"outage\",\"confidence\":0.8,\"is_vip\":true,\"is_financial\":false,\"detected_language\":\"es\",\"is_teachable_rule\":false}\n```".to_string(),
        };
        let classifier = Classifier::new(Arc::new(provider));
        let result = classifier.classify(&sample_event()).await;
        assert_eq!(result.urgency, Priority::Critical);
        assert!(result.is_vip);
        assert_eq!(result.detected_language, "es");
    }

    #[tokio::test]
    async fn defaults_language_and_teachable_flag_when_omitted() {
        let provider = FixedProvider {
            text: r#"{"urgency":"low","complexity":"simple","needs_response":false,"category":"fyi","confidence":0.6}"#.to_string(),
        };
        let classifier = Classifier::new(Arc::new(provider));
        let result = classifier.classify(&sample_event()).await;
        assert_eq!(result.detected_language, "en");
        assert!(!result.is_teachable_rule);
    }

    #[tokio::test]
    async fn falls_back_to_safe_default_on_unparseable_response() {
        let provider = FixedProvider {
            text: "not json at all".to_string(),
        };
        let classifier = Classifier::new(Arc::new(provider));
        let result = classifier.classify(&sample_event()).await;
        assert_eq!(result.complexity, Complexity::Moderate);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn falls_back_to_safe_default_on_provider_failure() {
        let classifier = Classifier::new(Arc::new(FailingProvider));
        let result = classifier.classify(&sample_event()).await;
        assert_eq!(result.urgency, Priority::Critical);
        assert!(result.needs_response);
    }
}
