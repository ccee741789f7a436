//! Error types for the operations agent core library.
//!
//! Each module has its own error enum to provide clear error boundaries.
//! The library uses `thiserror` for structured, typed errors.

/// Errors related to configuration loading, parsing, and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("missing required config field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration field has an unacceptable value.
    #[error("invalid value for config field '{field}': {message}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// A description of why the value is invalid.
        message: String,
    },

    /// The configuration file does not exist at the specified path.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The path that was searched.
        path: String,
    },

    /// TOML deserialization failed.
    #[error("failed to parse config file: {source}")]
    ParseError {
        /// The underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// Errors from the durable relational store (SQLite).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to connect to the database.
    #[error("database connection error: {source}")]
    Connection {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// Database migration failed.
    #[error("database migration error: {source}")]
    Migration {
        /// The underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    /// A database query failed.
    #[error("database query error: {source}")]
    Query {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// A row expected to exist was not found.
    #[error("not found: {what} {id}")]
    NotFound {
        /// What kind of row was being looked up.
        what: String,
        /// The identifier that was searched for.
        id: String,
    },
}

/// Errors from the KV/queue/lock/pub-sub store.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The underlying transport (Redis) returned an error.
    #[error("kv store error: {0}")]
    Backend(#[from] redis::RedisError),

    /// A value stored in the KV store could not be deserialized.
    #[error("failed to decode kv value for key '{key}': {message}")]
    Decode {
        /// The key whose value failed to decode.
        key: String,
        /// Details about the decode failure.
        message: String,
    },

    /// A lock could not be acquired within the allotted time.
    #[error("timed out acquiring lock '{key}' after {waited_ms}ms")]
    LockTimeout {
        /// The lock key.
        key: String,
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },
}

/// Errors from LLM and embedding providers.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP request to the provider endpoint failed.
    #[error("LLM HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned an error response.
    #[error("LLM API error (status {status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// Provider rate limit hit.
    #[error("LLM rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Response could not be parsed into the expected shape.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// No provider configured for the requested tier.
    #[error("no LLM provider configured for tier '{tier}'")]
    NotConfigured {
        /// The model tier that was requested.
        tier: String,
    },

    /// Generation failed after exhausting retries.
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

/// Errors from publishing, consuming, acknowledging, or negatively
/// acknowledging queue events.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Underlying KV store failure.
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Underlying durable store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The event referenced by id does not exist or already left the queue.
    #[error("event {event_id} not found in queue")]
    EventNotFound {
        /// The event id that was not found.
        event_id: String,
    },

    /// Attempted to nack an event without holding its lease.
    #[error("lease for event {event_id} is not held (expired or never acquired)")]
    LeaseNotHeld {
        /// The event id whose lease was missing.
        event_id: String,
    },
}

/// Errors from delivering an out-of-band alert.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The HTTP request to the alert sink's webhook failed outright.
    #[error("failed to deliver alert")]
    Delivery {
        #[source]
        source: reqwest::Error,
    },

    /// The webhook responded with a non-2xx status.
    #[error("alert webhook rejected the request with status {status}")]
    Rejected { status: u16 },
}

/// Errors from guardrail evaluation (business rules and rate limits).
#[derive(Debug, thiserror::Error)]
pub enum GuardrailError {
    /// Underlying KV store failure while checking a rate limit.
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Underlying durable store failure while checking a business rule.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from the sandboxed script runner.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The script failed to compile.
    #[error("script failed to compile: {message}")]
    CompileError {
        /// The compiler/parser error message.
        message: String,
    },

    /// The script ran but raised an error or returned a non-table result.
    #[error("script execution error: {message}")]
    RuntimeError {
        /// The runtime error message.
        message: String,
    },

    /// The script exceeded its execution time budget.
    #[error("script execution timed out after {seconds}s")]
    Timeout {
        /// The configured timeout.
        seconds: u64,
    },
}

/// Errors from session memory management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Underlying durable store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Underlying KV store failure (session lock).
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Could not acquire the per-session lock before timing out.
    #[error("could not acquire lock for session {session_key} within {waited_ms}ms")]
    LockTimeout {
        /// The session key being locked.
        session_key: String,
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// No session exists under the given key.
    #[error("no session found for key {session_key}")]
    NotFound {
        /// The session key that was looked up.
        session_key: String,
    },
}

/// Errors from talking to an external MCP tool server.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Could not start or connect to the server's transport.
    #[error("failed to connect to MCP server: {message}")]
    ConnectFailed {
        /// Transport-level error detail.
        message: String,
    },

    /// The server returned an error for a protocol call.
    #[error("MCP call failed: {message}")]
    CallFailed {
        /// The server's error detail.
        message: String,
    },
}

/// Errors from tool lookup and execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// No tool registered under the requested name.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// The requested tool name.
        name: String,
    },

    /// The tool rejected its parameters.
    #[error("invalid parameters for tool '{tool}': {message}")]
    InvalidParams {
        /// The tool name.
        tool: String,
        /// Details about the invalid parameters.
        message: String,
    },

    /// The tool's rate limit has been exceeded.
    #[error("rate limit exceeded for tool '{tool}'")]
    RateLimited {
        /// The tool name.
        tool: String,
    },

    /// The tool raised an error while executing.
    #[error("tool '{tool}' failed: {message}")]
    ExecutionFailed {
        /// The tool name.
        tool: String,
        /// The error message.
        message: String,
    },

    /// Underlying KV failure (rate limit bookkeeping).
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Underlying MCP server failure (external tool call).
    #[error(transparent)]
    Mcp(#[from] McpError),

    /// Underlying guardrail evaluation failure.
    #[error(transparent)]
    Guardrail(#[from] GuardrailError),
}

/// Errors from source pollers.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The upstream source client returned an error.
    #[error("poll request to {source} failed: {message}")]
    Request {
        /// The source being polled.
        source: String,
        /// The underlying error message.
        message: String,
    },

    /// The response body could not be interpreted as polled items.
    #[error("failed to parse response from {source}: {message}")]
    Parse {
        /// The source being polled.
        source: String,
        /// Details about the parse failure.
        message: String,
    },
}

/// Errors from the context engine's retrieval stage.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Underlying durable store failure during a retrieval.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from the reasoning/tool-calling loop.
#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    /// The underlying LLM provider failed.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// A tool invocation failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// A guardrail check failed (not "was blocked" — the check itself errored).
    #[error(transparent)]
    Guardrail(#[from] GuardrailError),

    /// The loop exhausted its turn budget without reaching a final answer.
    #[error("reasoning loop exhausted {max_turns} turns without a final response")]
    TurnBudgetExceeded {
        /// The configured maximum number of turns.
        max_turns: u32,
    },
}

/// Errors from the approval workflow (drafts/proposals).
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// Underlying durable store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Executing an approved proposal failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// A guardrail blocked execution of an approved proposal.
    #[error("guardrail blocked execution: {reason}")]
    GuardrailBlocked {
        /// Why the guardrail engine blocked the action.
        reason: String,
    },

    /// Underlying guardrail evaluation failure.
    #[error(transparent)]
    Guardrail(#[from] GuardrailError),

    /// Validating a `tool_creation` proposal's script against the sandbox failed.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Upserting a baseline for an approved `threshold_adjustment` failed.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// Publishing the re-processing event for an approved
    /// `guardrail_override` failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The referenced draft or proposal does not exist.
    #[error("{what} {id} not found")]
    NotFound {
        /// "draft" or "proposal".
        what: String,
        /// The identifier that was searched for.
        id: String,
    },

    /// The item is not in a state that allows the requested transition.
    #[error("{what} {id} is {status}, cannot {action}")]
    InvalidState {
        /// "draft" or "proposal".
        what: String,
        /// The identifier.
        id: String,
        /// Its current status.
        status: String,
        /// The action that was rejected.
        action: String,
    },
}

/// Errors from the pattern detector.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// Underlying durable store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Underlying KV store failure (cooldown key).
    #[error(transparent)]
    Kv(#[from] KvError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_missing_field_message() {
        let err = ConfigError::MissingField {
            field: "llm.provider".to_string(),
        };
        assert_eq!(err.to_string(), "missing required config field: llm.provider");
    }

    #[test]
    fn config_error_invalid_value_message() {
        let err = ConfigError::InvalidValue {
            field: "queue.dedup_ttl_seconds".to_string(),
            message: "must be >= max poller lookback".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for config field 'queue.dedup_ttl_seconds': must be >= max poller lookback"
        );
    }

    #[test]
    fn config_error_file_not_found_message() {
        let err = ConfigError::FileNotFound {
            path: "/home/user/.ops-agent/config.toml".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "config file not found: /home/user/.ops-agent/config.toml"
        );
    }

    #[test]
    fn llm_error_not_configured_message() {
        let err = LlmError::NotConfigured {
            tier: "pro".to_string(),
        };
        assert_eq!(err.to_string(), "no LLM provider configured for tier 'pro'");
    }

    #[test]
    fn llm_error_rate_limited_message() {
        let err = LlmError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(err.to_string(), "LLM rate limited, retry after 30 seconds");
    }

    #[test]
    fn queue_error_lease_not_held_message() {
        let err = QueueError::LeaseNotHeld {
            event_id: "evt_123".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "lease for event evt_123 is not held (expired or never acquired)"
        );
    }

    #[test]
    fn sandbox_error_timeout_message() {
        let err = SandboxError::Timeout { seconds: 30 };
        assert_eq!(err.to_string(), "script execution timed out after 30s");
    }

    #[test]
    fn tool_error_rate_limited_message() {
        let err = ToolError::RateLimited {
            tool: "send_email".to_string(),
        };
        assert_eq!(err.to_string(), "rate limit exceeded for tool 'send_email'");
    }

    #[test]
    fn approval_error_invalid_state_message() {
        let err = ApprovalError::InvalidState {
            what: "draft".to_string(),
            id: "draft_1".to_string(),
            status: "approved".to_string(),
            action: "reject".to_string(),
        };
        assert_eq!(err.to_string(), "draft draft_1 is approved, cannot reject");
    }

    #[test]
    fn session_error_lock_timeout_message() {
        let err = SessionError::LockTimeout {
            session_key: "chat:abc".to_string(),
            waited_ms: 30_000,
        };
        assert_eq!(
            err.to_string(),
            "could not acquire lock for session chat:abc within 30000ms"
        );
    }
}
