//! Tool registry: unifies built-in, dynamic (sandboxed-script), and
//! external MCP-server tools behind one capability record, generalizing
//! the teacher's trait-object provider abstraction from "LLM backend" to
//! "callable action".
//!
//! Source-scoped selection and per-tool rate limiting happen here, ahead
//! of dispatch, so the reasoning loop never sees a tool an event's
//! source isn't allowed to use.

pub mod mcp;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ToolsConfig;
use crate::error::ToolError;
use crate::guardrails::{GuardrailDecision, GuardrailEngine};
use crate::llm::ToolSpec;
use crate::sandbox::ScriptRunner;
use crate::storage::{dynamic_tools, DbPool};

/// A callable action: a name, a description and JSON-schema for the
/// model, and an async handler. Built-in, dynamic, and external-server
/// tools all implement this the same way.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn call(&self, params: Value) -> Result<Value, ToolError>;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    guardrails: Arc<GuardrailEngine>,
    config: ToolsConfig,
}

impl ToolRegistry {
    /// Builds an empty registry; callers add built-ins directly, then
    /// call `load_dynamic_tools` and `connect_mcp_servers`.
    pub fn new(guardrails: Arc<GuardrailEngine>, config: ToolsConfig) -> Self {
        Self {
            tools: HashMap::new(),
            guardrails,
            config,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Loads every enabled dynamic tool from storage, wrapping each in a
    /// sandbox-backed handler.
    pub async fn load_dynamic_tools(&mut self, db: &DbPool, sandbox: Arc<ScriptRunner>) -> Result<(), ToolError> {
        let rows = dynamic_tools::get_enabled(db).await?;
        for row in rows {
            let schema: Value = serde_json::from_str(&row.parameters_schema).unwrap_or(Value::Null);
            let handler = DynamicToolHandler {
                name: row.name,
                description: row.description,
                parameters_schema: schema,
                script_body: row.script_body,
                sandbox: sandbox.clone(),
            };
            self.register(Arc::new(handler));
        }
        Ok(())
    }

    /// Connects to every configured MCP server and adapts its tools into
    /// the registry under `{server}__{tool}`. A server that fails to
    /// connect is logged and skipped; it never prevents the others from
    /// loading.
    pub async fn connect_mcp_servers(&mut self) {
        for server in &self.config.mcp_servers {
            match mcp::McpConnection::connect(&server.command, &server.args).await {
                Ok(connection) => {
                    let connection = Arc::new(connection);
                    match connection.list_tools().await {
                        Ok(tools) => {
                            for tool in tools {
                                let name = format!("{}__{}", server.name, tool.name);
                                self.register(Arc::new(mcp::McpToolHandler {
                                    qualified_name: name,
                                    remote_name: tool.name,
                                    description: tool.description,
                                    parameters_schema: tool.parameters_schema,
                                    connection: connection.clone(),
                                }));
                            }
                        }
                        Err(err) => {
                            tracing::warn!(server = %server.name, error = %err, "failed to list tools from MCP server");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(server = %server.name, error = %err, "failed to connect to MCP server, skipping");
                }
            }
        }
    }

    /// Tool specs visible to a given event source, for the reasoning
    /// loop's provider call.
    pub fn tools_for_source(&self, source: &str) -> Vec<ToolSpec> {
        self.tools
            .values()
            .filter(|tool| self.is_allowed_for_source(source, tool.name()))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters_schema: tool.parameters_schema(),
            })
            .collect()
    }

    fn is_allowed_for_source(&self, source: &str, tool_name: &str) -> bool {
        match self.config.source_scopes.get(source) {
            None => true,
            Some(allowed) => allowed.iter().any(|a| a == "*" || a == tool_name),
        }
    }

    /// Runs a tool's rate limit check, then dispatches to its handler.
    pub async fn call(&self, tool_name: &str, params: Value) -> Result<Value, ToolError> {
        let tool = self.tools.get(tool_name).ok_or_else(|| ToolError::UnknownTool {
            name: tool_name.to_string(),
        })?;

        let decision = self.guardrails.check_rate_limit(tool_name, None).await?;
        if let GuardrailDecision::Block { .. } = decision {
            return Err(ToolError::RateLimited {
                tool: tool_name.to_string(),
            });
        }

        tool.call(params).await
    }
}

/// A dynamic tool: its implementation is a sandboxed Lua script, loaded
/// from `dynamic_tools` at startup or registered at runtime by the
/// meta-tool the reasoning loop calls to create new tools.
struct DynamicToolHandler {
    name: String,
    description: String,
    parameters_schema: Value,
    script_body: String,
    sandbox: Arc<ScriptRunner>,
}

#[async_trait]
impl ToolHandler for DynamicToolHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters_schema.clone()
    }

    async fn call(&self, params: Value) -> Result<Value, ToolError> {
        self.sandbox
            .run(self.script_body.clone(), params)
            .await
            .map_err(|err| ToolError::ExecutionFailed {
                tool: self.name.clone(),
                message: err.to_string(),
            })
    }
}

/// Validates a candidate dynamic tool's script before it's persisted:
/// must compile under the same sandbox it will later run in. Mirrors the
/// registration-time validation in the approval pipeline for
/// `tool_creation` proposals.
pub async fn validate_dynamic_tool(sandbox: &ScriptRunner, script_body: &str) -> Result<(), ToolError> {
    // An empty-params dry run exercises compilation and the presence of
    // `run`; a script that only fails on missing fields at call time is
    // accepted here and will surface its error through normal tool-call
    // results instead.
    let result = sandbox.run(script_body.to_string(), Value::Null).await;
    match result {
        Ok(_) => Ok(()),
        Err(crate::error::SandboxError::CompileError { message }) => Err(ToolError::InvalidParams {
            tool: "dynamic_tool_registration".to_string(),
            message,
        }),
        Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardrailsConfig;
    use crate::error::KvError;
    use crate::kv::{KvStore, ScoredMember};
    use crate::storage::init_test_db;

    struct NoopKv;

    #[async_trait]
    impl KvStore for NoopKv {
        async fn zadd(&self, _: &str, _: &str, _: i64) -> Result<(), KvError> {
            Ok(())
        }
        async fn zpopmin(&self, _: &str) -> Result<Option<ScoredMember>, KvError> {
            Ok(None)
        }
        async fn zrem(&self, _: &str, _: &str) -> Result<(), KvError> {
            Ok(())
        }
        async fn zcard(&self, _: &str) -> Result<u64, KvError> {
            Ok(0)
        }
        async fn set_nx_ex(&self, _: &str, _: &str, _: u64) -> Result<bool, KvError> {
            Ok(true)
        }
        async fn compare_and_delete(&self, _: &str, _: &str) -> Result<bool, KvError> {
            Ok(true)
        }
        async fn get(&self, _: &str) -> Result<Option<String>, KvError> {
            Ok(None)
        }
        async fn set_ex(&self, _: &str, _: &str, _: u64) -> Result<(), KvError> {
            Ok(())
        }
        async fn del(&self, _: &str) -> Result<(), KvError> {
            Ok(())
        }
        async fn exists(&self, _: &str) -> Result<bool, KvError> {
            Ok(false)
        }
        async fn incr_with_ttl(&self, _: &str, _: u64) -> Result<i64, KvError> {
            Ok(1)
        }
    }

    fn registry(config: ToolsConfig) -> ToolRegistry {
        let guardrails = Arc::new(GuardrailEngine::new(
            Arc::new(NoopKv),
            GuardrailsConfig {
                restricted_contacts: vec![],
                default_tool_rate_limit_per_minute: 100,
            },
        ));
        ToolRegistry::new(guardrails, config)
    }

    #[tokio::test]
    async fn loads_and_calls_dynamic_tool() {
        let pool = init_test_db().await.unwrap();
        dynamic_tools::upsert(
            &pool,
            "echo",
            "Echoes its input",
            &serde_json::json!({}),
            "function run(params) return { echoed = params } end",
        )
        .await
        .unwrap();

        let mut registry = registry(ToolsConfig::default());
        registry.load_dynamic_tools(&pool, Arc::new(ScriptRunner::default())).await.unwrap();

        let result = registry.call("echo", serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(result["echoed"]["x"], 1);
    }

    #[tokio::test]
    async fn unknown_tool_errors() {
        let registry = registry(ToolsConfig::default());
        let result = registry.call("nonexistent", serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::UnknownTool { .. })));
    }

    #[test]
    fn source_scope_restricts_visible_tools() {
        let mut scopes = HashMap::new();
        scopes.insert("mail".to_string(), vec!["send_reply".to_string()]);
        let config = ToolsConfig {
            mcp_servers: vec![],
            source_scopes: scopes,
        };
        let mut registry = registry(config);
        registry.register(Arc::new(DynamicToolHandler {
            name: "send_reply".to_string(),
            description: "send a reply".to_string(),
            parameters_schema: serde_json::json!({}),
            script_body: "function run(p) end".to_string(),
            sandbox: Arc::new(ScriptRunner::default()),
        }));
        registry.register(Arc::new(DynamicToolHandler {
            name: "create_ticket".to_string(),
            description: "create a ticket".to_string(),
            parameters_schema: serde_json::json!({}),
            script_body: "function run(p) end".to_string(),
            sandbox: Arc::new(ScriptRunner::default()),
        }));

        let mail_tools = registry.tools_for_source("mail");
        assert_eq!(mail_tools.len(), 1);
        assert_eq!(mail_tools[0].name, "send_reply");

        let unscoped_source_tools = registry.tools_for_source("ticketing");
        assert_eq!(unscoped_source_tools.len(), 2);
    }
}
