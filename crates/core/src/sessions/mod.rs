//! Session memory business rules: idle expiry, compaction, and the
//! per-session lock that serializes concurrent turns against the same
//! conversation.
//!
//! `storage::sessions` is pure CRUD; this module layers the policy the
//! teacher's rate-limited request handling applies at a different
//! seam (poll-then-backoff waiting for a lock) on top of it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::config::SessionsConfig;
use crate::error::SessionError;
use crate::kv::{keys, KvStore};
use crate::llm::{GenerationParams, LlmProvider};
use crate::model::{Session, SessionMessage};
use crate::storage::{sessions as storage, DbPool};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);
const LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const LOCK_TTL_SECONDS: u64 = 60;
const COMPACTION_KEEP_LAST: i64 = 10;

const COMPACTION_SYSTEM_PROMPT: &str =
    "Summarize the conversation so far in a few sentences, preserving any \
commitments, open questions, or facts a future turn would need.";

pub struct SessionManager {
    db: DbPool,
    kv: Arc<dyn KvStore>,
    compactor: Arc<dyn LlmProvider>,
    config: SessionsConfig,
}

/// Held while a caller works with a session; releases the underlying KV
/// lock on drop is not possible for an async resource, so callers must
/// call `release` explicitly once their turn is done.
pub struct SessionLock {
    session_key: String,
    token: String,
}

impl SessionManager {
    pub fn new(db: DbPool, kv: Arc<dyn KvStore>, compactor: Arc<dyn LlmProvider>, config: SessionsConfig) -> Self {
        Self { db, kv, compactor, config }
    }

    /// Polls for the per-session lock every 500ms up to 30s, so two
    /// concurrent turns against the same conversation never interleave.
    pub async fn acquire_lock(&self, session_key: &str) -> Result<SessionLock, SessionError> {
        let key = keys::session_lock(session_key);
        let token = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + LOCK_TIMEOUT;

        loop {
            if self.kv.set_nx_ex(&key, &token, LOCK_TTL_SECONDS).await? {
                return Ok(SessionLock {
                    session_key: session_key.to_string(),
                    token,
                });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SessionError::LockTimeout {
                    session_key: session_key.to_string(),
                    waited_ms: LOCK_TIMEOUT.as_millis() as u64,
                });
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    pub async fn release_lock(&self, lock: SessionLock) -> Result<(), SessionError> {
        let key = keys::session_lock(&lock.session_key);
        self.kv.compare_and_delete(&key, &lock.token).await?;
        Ok(())
    }

    pub async fn get_or_create(&self, session_key: &str, source: &str) -> Result<Session, SessionError> {
        Ok(storage::get_or_create(&self.db, session_key, source).await?)
    }

    pub async fn append_message(&self, session_key: &str, role: &str, content: &str) -> Result<(), SessionError> {
        storage::append_message(&self.db, session_key, role, content).await?;
        let session = storage::get(&self.db, session_key)
            .await?
            .ok_or_else(|| SessionError::NotFound {
                session_key: session_key.to_string(),
            })?;
        if session.message_count >= self.config.compaction_threshold {
            self.compact(session_key).await?;
        }
        Ok(())
    }

    pub async fn history(&self, session_key: &str) -> Result<Vec<SessionMessage>, SessionError> {
        Ok(storage::get_messages(&self.db, session_key).await?)
    }

    /// Summarizes everything but the most recent messages into the
    /// session's rolling summary, via the compaction (flash-tier)
    /// provider, then drops the summarized messages.
    async fn compact(&self, session_key: &str) -> Result<(), SessionError> {
        let session = storage::get(&self.db, session_key)
            .await?
            .ok_or_else(|| SessionError::NotFound {
                session_key: session_key.to_string(),
            })?;
        let messages = storage::get_messages(&self.db, session_key).await?;
        if messages.len() <= COMPACTION_KEEP_LAST as usize {
            return Ok(());
        }

        let to_summarize = &messages[..messages.len() - COMPACTION_KEEP_LAST as usize];
        let transcript = render_transcript(&session.summary, to_summarize);

        let params = GenerationParams {
            max_tokens: 512,
            temperature: 0.0,
            system_prompt: Some(COMPACTION_SYSTEM_PROMPT.to_string()),
        };
        let new_summary = match self.compactor.complete(COMPACTION_SYSTEM_PROMPT, &transcript, &params).await {
            Ok(crate::llm::LlmResponse::Text { text, .. }) => text,
            Ok(crate::llm::LlmResponse::ToolCalls { .. }) => transcript,
            Err(err) => {
                tracing::warn!(error = %err, session_key, "compaction call failed, keeping prior summary prefix");
                transcript
            }
        };

        storage::compact(&self.db, session_key, &new_summary, COMPACTION_KEEP_LAST).await?;
        Ok(())
    }

    /// Returns session keys idle past their source's configured cutoff.
    pub async fn idle_sessions(&self) -> Result<Vec<String>, SessionError> {
        let now = Utc::now();
        let sessions = storage::all_idle_candidates(&self.db).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| self.is_idle(s, now))
            .map(|s| s.session_key)
            .collect())
    }

    fn is_idle(&self, session: &Session, now: chrono::DateTime<Utc>) -> bool {
        let idle_for = now - session.last_activity_at;
        let cutoff = if session.source == "chat" {
            chrono::Duration::minutes(self.config.chat_idle_minutes)
        } else {
            chrono::Duration::hours(self.config.dashboard_idle_hours)
        };
        idle_for >= cutoff
    }

    pub async fn expire_idle(&self) -> Result<u64, SessionError> {
        let idle = self.idle_sessions().await?;
        let count = idle.len() as u64;
        for session_key in idle {
            storage::delete(&self.db, &session_key).await?;
        }
        Ok(count)
    }
}

fn render_transcript(prior_summary: &Option<String>, messages: &[SessionMessage]) -> String {
    let mut lines = Vec::new();
    if let Some(summary) = prior_summary {
        lines.push(format!("Earlier summary: {summary}"));
    }
    for message in messages {
        lines.push(format!("{}: {}", message.role, message.content));
    }
    lines.join("\n")
}
