//! Shared domain types: events, classification results, proposals,
//! sessions, and baselines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The upstream system an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Mail,
    Chat,
    Ticketing,
    Survey,
    ProjectManagement,
    Drive,
    /// Synthetic events raised by the scheduler itself (briefs, reminders).
    Scheduler,
    /// Events injected by an operator via the admin API.
    Admin,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Mail => "mail",
            EventSource::Chat => "chat",
            EventSource::Ticketing => "ticketing",
            EventSource::Survey => "survey",
            EventSource::ProjectManagement => "project_management",
            EventSource::Drive => "drive",
            EventSource::Scheduler => "scheduler",
            EventSource::Admin => "admin",
        }
    }
}

/// Lifecycle status of a queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLettered,
}

/// Operator-assigned or classifier-assigned urgency, used both for queue
/// ordering and for reasoning-model tier selection. Numeric values match
/// the agent's wire/config convention (smaller number, more urgent) so a
/// raw integer from config or a webhook payload needs no remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical = 1,
    High = 3,
    Medium = 5,
    Low = 7,
    Background = 9,
}

impl Priority {
    /// `priority * 10^12 + created_at_ms`. Lower score pops first, and
    /// since the tier values themselves already run from most urgent
    /// (1) to least urgent (9), no inversion is needed: `Critical`
    /// naturally sorts ahead of `Background` in a min-heap / ZPOPMIN queue.
    pub fn score(&self, created_at: DateTime<Utc>) -> i64 {
        const K: i64 = 1_000_000_000_000;
        (*self as i64) * K + created_at.timestamp_millis()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Background => "background",
        }
    }

    /// Parses a priority name, defaulting to `Medium` on anything unrecognized
    /// so a malformed classifier response never fails the whole pipeline.
    pub fn from_str_lenient(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "critical" => Priority::Critical,
            "high" => Priority::High,
            "low" => Priority::Low,
            "background" => Priority::Background,
            _ => Priority::Medium,
        }
    }

    /// Maps a raw stored/wire integer back to a tier, defaulting to
    /// `Medium` for anything outside the five known values.
    pub fn from_i32_lenient(value: i32) -> Self {
        match value {
            1 => Priority::Critical,
            3 => Priority::High,
            5 => Priority::Medium,
            7 => Priority::Low,
            9 => Priority::Background,
            _ => Priority::Medium,
        }
    }
}

/// Complexity bucket assigned by the classifier. Standardized as an enum
/// everywhere (classifier output, shortcut routing, reasoning tier
/// selection) rather than compared as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        }
    }

    /// Parses a complexity name, defaulting to `Moderate` on anything
    /// unrecognized, matching the classifier's safe-default behavior.
    pub fn from_str_lenient(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "simple" => Complexity::Simple,
            "complex" => Complexity::Complex,
            _ => Complexity::Moderate,
        }
    }
}

/// A single unit of work flowing through the queue.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: String,
    pub source: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub idempotency_key: Option<String>,
    pub status: String,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of classifying an event before planning and reasoning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub urgency: Priority,
    pub complexity: Complexity,
    pub needs_response: bool,
    pub category: String,
    pub confidence: f32,
    pub is_vip: bool,
    pub is_financial: bool,
    /// BCP-47-ish language tag (e.g. `"en"`, `"es"`) the inbound text was
    /// written in, fed to the reasoning prompt as a language directive.
    pub detected_language: String,
    /// True when this event matches a pattern the agent has already
    /// learned a rule for, letting the consumer take a fast shortcut
    /// instead of running the full reasoning loop.
    pub is_teachable_rule: bool,
}

/// Kind of proposed action awaiting approval, dispatched through
/// `execute_approval`'s type -> handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    /// A new if-this-then-that rule distilled from observed behavior.
    LearnedRule,
    /// A learned rule strong/consistent enough to auto-apply without a
    /// per-occurrence approval once accepted.
    StrongRule,
    /// A new dynamic tool (sandboxed script) the agent wants registered.
    ToolCreation,
    /// A recurring action worth wiring to a cron or event trigger.
    Automation,
    /// Access to an external tool/server the agent doesn't have yet.
    ExternalToolServer,
    /// Request to bypass a guardrail for one specific, already-blocked event.
    GuardrailOverride,
    /// Adjustment to an anomaly-detection baseline or threshold.
    ThresholdAdjustment,
    /// A suggested multi-step playbook for a recurring situation.
    PlaybookSuggestion,
}

impl ProposalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalType::LearnedRule => "learned_rule",
            ProposalType::StrongRule => "strong_rule",
            ProposalType::ToolCreation => "tool_creation",
            ProposalType::Automation => "automation",
            ProposalType::ExternalToolServer => "external_tool_server",
            ProposalType::GuardrailOverride => "guardrail_override",
            ProposalType::ThresholdAdjustment => "threshold_adjustment",
            ProposalType::PlaybookSuggestion => "playbook_suggestion",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "learned_rule" => Some(ProposalType::LearnedRule),
            "strong_rule" => Some(ProposalType::StrongRule),
            "tool_creation" => Some(ProposalType::ToolCreation),
            "automation" => Some(ProposalType::Automation),
            "external_tool_server" => Some(ProposalType::ExternalToolServer),
            "guardrail_override" => Some(ProposalType::GuardrailOverride),
            "threshold_adjustment" => Some(ProposalType::ThresholdAdjustment),
            "playbook_suggestion" => Some(ProposalType::PlaybookSuggestion),
            _ => None,
        }
    }
}

/// A proposed mutating action awaiting approval.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Proposal {
    pub id: String,
    pub event_id: String,
    pub proposal_type: String,
    pub params: serde_json::Value,
    pub reason: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A conversational session tied to a `(source, external_id)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub session_key: String,
    pub source: String,
    pub summary: Option<String>,
    pub message_count: i64,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A role-tagged message persisted as part of a session's history.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionMessage {
    pub id: i64,
    pub session_key: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Adaptive anomaly baseline for a `(source, event_type, dow, hour)` bucket.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Baseline {
    pub source: String,
    pub event_type: String,
    pub day_of_week: i32,
    pub hour: i32,
    pub mean: f64,
    pub stddev: f64,
    pub sample_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn priority_score_orders_critical_before_background_at_same_instant() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let critical = Priority::Critical.score(t);
        let background = Priority::Background.score(t);
        assert!(critical < background, "critical should pop before background (smaller score)");
    }

    #[test]
    fn priority_score_orders_by_time_within_same_priority() {
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap();
        let s1 = Priority::Medium.score(t1);
        let s2 = Priority::Medium.score(t2);
        assert!(s1 < s2, "earlier timestamp should pop first");
    }

    #[test]
    fn priority_score_never_lets_low_priority_beat_higher_priority_regardless_of_age() {
        // A Critical event created "now" must still outrank a Background
        // event created a full day earlier, because the tier term dominates.
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let yesterday = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let critical_now = Priority::Critical.score(now);
        let background_yesterday = Priority::Background.score(yesterday);
        assert!(critical_now < background_yesterday);
    }

    #[test]
    fn priority_from_str_lenient_covers_all_five_tiers() {
        assert_eq!(Priority::from_str_lenient("critical"), Priority::Critical);
        assert_eq!(Priority::from_str_lenient("HIGH"), Priority::High);
        assert_eq!(Priority::from_str_lenient("medium"), Priority::Medium);
        assert_eq!(Priority::from_str_lenient("low"), Priority::Low);
        assert_eq!(Priority::from_str_lenient("background"), Priority::Background);
        assert_eq!(Priority::from_str_lenient("garbage"), Priority::Medium);
    }

    #[test]
    fn priority_from_i32_lenient_round_trips_known_values() {
        for tier in [Priority::Critical, Priority::High, Priority::Medium, Priority::Low, Priority::Background] {
            assert_eq!(Priority::from_i32_lenient(tier as i32), tier);
        }
        assert_eq!(Priority::from_i32_lenient(42), Priority::Medium);
    }
}
