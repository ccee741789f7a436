//! Shared application state for the webhook/admin server.

use std::sync::Arc;

use ops_core::approvals::ApprovalService;
use ops_core::config::Config;
use ops_core::kv::KvStore;
use ops_core::patterns::PatternDetector;
use ops_core::queue::Queue;
use ops_core::storage::DbPool;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    /// SQLite connection pool.
    pub db: DbPool,
    /// KV/queue/lease store.
    pub kv: Arc<dyn KvStore>,
    /// Priority work queue (publish side; `inject-event` and webhooks both
    /// go through this rather than writing to storage directly). Shared
    /// with the approval service, which publishes re-processing events on
    /// an approved `guardrail_override` proposal.
    pub queue: Arc<Queue>,
    /// Draft/proposal approval workflow.
    pub approvals: Arc<ApprovalService>,
    /// Anomaly pattern detector, used by `/admin/analytics/*` and shared
    /// with the approval service for `threshold_adjustment` proposals.
    pub patterns: Arc<PatternDetector>,
    /// Loaded configuration (webhook secrets, admin token, etc).
    pub config: Config,
}
