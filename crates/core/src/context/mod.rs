//! Context engine: enriches a classified event with retrieved background
//! before reasoning, running four retrievals concurrently and trimming the
//! result to a token budget.
//!
//! Generalizes the teacher's aggregation-service shape (several
//! independent lookups joined into one view for a downstream consumer)
//! from author/engagement/topic retrieval to this spec's four retrieval
//! kinds: incidents, knowledge, sender history, related events.

use std::sync::Arc;

use crate::error::ContextError;
use crate::llm::EmbeddingProvider;
use crate::model::Event;
use crate::storage::{drafts, events, incidents, knowledge, DbPool};

/// Background retrieved for one event, trimmed to fit a token budget
/// before being formatted into the reasoning prompt.
#[derive(Debug, Clone, Default)]
pub struct EnrichedContext {
    pub incidents: Vec<String>,
    pub knowledge: Vec<String>,
    pub sender_history: Vec<String>,
    pub related_events: Vec<String>,
}

impl EnrichedContext {
    /// Renders all four sections into one prompt-ready block, in the
    /// order they're dropped when trimming (so a reader sees what
    /// survived first).
    pub fn format(&self) -> String {
        let mut sections = Vec::new();
        if !self.incidents.is_empty() {
            sections.push(format!("Related incidents:\n{}", self.incidents.join("\n")));
        }
        if !self.knowledge.is_empty() {
            sections.push(format!("Relevant knowledge:\n{}", self.knowledge.join("\n")));
        }
        if !self.sender_history.is_empty() {
            sections.push(format!("Sender history:\n{}", self.sender_history.join("\n")));
        }
        if !self.related_events.is_empty() {
            sections.push(format!("Related events:\n{}", self.related_events.join("\n")));
        }
        sections.join("\n\n")
    }

    /// Drops sections in order (related -> sender -> knowledge ->
    /// incidents) until the rendered context fits `token_budget`, using a
    /// chars/4 estimate. Pure, so it's testable without any I/O.
    pub fn trim_to_budget(mut self, token_budget: usize) -> Self {
        let estimate = |s: &Self| s.format().len() / 4;

        if estimate(&self) <= token_budget {
            return self;
        }
        self.related_events.clear();
        if estimate(&self) <= token_budget {
            return self;
        }
        self.sender_history.clear();
        if estimate(&self) <= token_budget {
            return self;
        }
        self.knowledge.clear();
        if estimate(&self) <= token_budget {
            return self;
        }
        self.incidents.clear();
        self
    }
}

pub struct ContextEngine {
    db: DbPool,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    token_budget: usize,
}

impl ContextEngine {
    pub fn new(db: DbPool, embedding_provider: Arc<dyn EmbeddingProvider>, token_budget: usize) -> Self {
        Self {
            db,
            embedding_provider,
            token_budget,
        }
    }

    pub async fn enrich(&self, event: &Event) -> Result<EnrichedContext, ContextError> {
        let query_text = event_query_text(event);
        let embedding = self.embedding_provider.embed(&query_text).await.unwrap_or_default();
        let recipient = event
            .payload
            .get("from")
            .or_else(|| event.payload.get("recipient"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let (incidents_result, knowledge_result, sender_result, related_result) = tokio::join!(
            self.retrieve_incidents(&embedding),
            self.retrieve_knowledge(&embedding),
            self.retrieve_sender_history(&recipient),
            self.retrieve_related_events(event),
        );

        let context = EnrichedContext {
            incidents: incidents_result?,
            knowledge: knowledge_result?,
            sender_history: sender_result?,
            related_events: related_result?,
        };
        Ok(context.trim_to_budget(self.token_budget))
    }

    async fn retrieve_incidents(&self, embedding: &[f32]) -> Result<Vec<String>, ContextError> {
        if embedding.is_empty() {
            return Ok(Vec::new());
        }
        let rows = incidents::most_similar(&self.db, embedding, 5).await?;
        Ok(rows
            .into_iter()
            .map(|(row, score)| format!("[{:.2}] {} ({}): {}", score, row.title, row.severity, row.summary))
            .collect())
    }

    async fn retrieve_knowledge(&self, embedding: &[f32]) -> Result<Vec<String>, ContextError> {
        if embedding.is_empty() {
            return Ok(Vec::new());
        }
        let rows = knowledge::most_similar(&self.db, embedding, 5).await?;
        Ok(rows
            .into_iter()
            .map(|(row, score)| format!("[{:.2}] {}: {}", score, row.title, row.content))
            .collect())
    }

    async fn retrieve_sender_history(&self, recipient: &str) -> Result<Vec<String>, ContextError> {
        if recipient.is_empty() {
            return Ok(Vec::new());
        }
        let rows = drafts::history_for_recipient(&self.db, recipient, 5).await?;
        Ok(rows
            .into_iter()
            .map(|d| format!("{} ({}): {}", d.channel, d.status, truncate(&d.body, 200)))
            .collect())
    }

    async fn retrieve_related_events(&self, event: &Event) -> Result<Vec<String>, ContextError> {
        let rows = events::related(&self.db, &event.source, &event.event_type, &event.id, 24, 5).await?;
        Ok(rows
            .into_iter()
            .map(|e| format!("{} at {}: {}", e.event_type, e.created_at, truncate(&e.payload.to_string(), 200)))
            .collect())
    }
}

fn event_query_text(event: &Event) -> String {
    format!("{} {} {}", event.source, event.event_type, event.payload)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EnrichedContext {
        EnrichedContext {
            incidents: vec!["incident one".to_string()],
            knowledge: vec!["knowledge one".to_string()],
            sender_history: vec!["history one".to_string()],
            related_events: vec!["related one".to_string()],
        }
    }

    #[test]
    fn trim_keeps_everything_under_budget() {
        let ctx = sample().trim_to_budget(10_000);
        assert!(!ctx.incidents.is_empty());
        assert!(!ctx.related_events.is_empty());
    }

    #[test]
    fn trim_drops_related_events_first() {
        let ctx = sample().trim_to_budget(0);
        // Budget of zero still drops in documented order; incidents are
        // the last to go.
        assert!(ctx.related_events.is_empty());
    }

    #[test]
    fn format_omits_empty_sections() {
        let ctx = EnrichedContext {
            incidents: vec!["x".to_string()],
            ..Default::default()
        };
        let rendered = ctx.format();
        assert!(rendered.contains("Related incidents"));
        assert!(!rendered.contains("Relevant knowledge"));
    }
}
