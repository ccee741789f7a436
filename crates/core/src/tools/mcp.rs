//! External MCP tool servers: child processes speaking the Model Context
//! Protocol over stdio, discovered at startup and adapted into the
//! registry under `{server}__{tool}` names.
//!
//! The teacher only ever spoke MCP as a server (exposing its own tools
//! to a host); here the registry is the client, connecting out to
//! operator-configured servers instead.

use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{RunningService, ServiceExt};
use rmcp::RoleClient;
use serde_json::Value;
use tokio::process::Command;

use crate::error::{McpError, ToolError};
use crate::tools::ToolHandler;

/// One tool as discovered from a server's `tools/list` response.
pub struct DiscoveredTool {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

/// A live connection to one MCP server, reused across every tool it
/// exposes (each `McpToolHandler` holds a clone of the `Arc`).
pub struct McpConnection {
    service: RunningService<RoleClient, ()>,
}

impl McpConnection {
    pub async fn connect(command: &str, args: &[String]) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        let transport = rmcp::transport::TokioChildProcess::new(cmd).map_err(|e| McpError::ConnectFailed {
            message: e.to_string(),
        })?;
        let service = ().serve(transport).await.map_err(|e| McpError::ConnectFailed {
            message: e.to_string(),
        })?;
        Ok(Self { service })
    }

    pub async fn list_tools(&self) -> Result<Vec<DiscoveredTool>, McpError> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .map_err(|e| McpError::CallFailed { message: e.to_string() })?;
        Ok(tools
            .into_iter()
            .map(|tool| DiscoveredTool {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
                parameters_schema: serde_json::to_value(&tool.input_schema).unwrap_or(Value::Null),
            })
            .collect())
    }

    pub async fn call(&self, tool_name: &str, params: Value) -> Result<Value, McpError> {
        let arguments = params.as_object().cloned();
        let result = self
            .service
            .call_tool(CallToolRequestParam {
                name: tool_name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| McpError::CallFailed { message: e.to_string() })?;
        serde_json::to_value(&result.content).map_err(|e| McpError::CallFailed { message: e.to_string() })
    }
}

pub struct McpToolHandler {
    pub qualified_name: String,
    pub remote_name: String,
    pub description: String,
    pub parameters_schema: Value,
    pub connection: std::sync::Arc<McpConnection>,
}

#[async_trait]
impl ToolHandler for McpToolHandler {
    fn name(&self) -> &str {
        &self.qualified_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters_schema.clone()
    }

    async fn call(&self, params: Value) -> Result<Value, ToolError> {
        Ok(self.connection.call(&self.remote_name, params).await?)
    }
}
