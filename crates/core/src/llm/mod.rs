//! LLM provider abstraction.
//!
//! A tagged-union response type carries either plain text or a batch of
//! tool calls, so the reasoning loop can match on `LlmResponse` without
//! the provider needing to know anything about tools beyond their JSON
//! schemas. Object-safe so providers are held as `Arc<dyn LlmProvider>`.

pub mod embedding;
pub mod factory;
pub mod gemini;
pub mod openrouter;

use crate::error::LlmError;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A requested tool invocation as returned by the model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Tagged union: a completion either has text to show or tool calls to run.
#[derive(Debug, Clone)]
pub enum LlmResponse {
    Text { text: String, usage: TokenUsage },
    ToolCalls { calls: Vec<ToolCall>, usage: TokenUsage },
}

impl LlmResponse {
    pub fn usage(&self) -> &TokenUsage {
        match self {
            LlmResponse::Text { usage, .. } => usage,
            LlmResponse::ToolCalls { usage, .. } => usage,
        }
    }
}

/// One turn in a reasoning conversation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Message {
    User(String),
    Assistant { text: Option<String>, tool_calls: Vec<ToolCall> },
    ToolResult { tool_call_id: String, content: String },
}

/// A tool's JSON-schema description, passed to providers that support
/// function calling.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.3,
            system_prompt: None,
        }
    }
}

/// Trait abstracting all LLM provider operations. Implementations include
/// `GeminiProvider` and `OpenRouterProvider`.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Single-shot text completion (classification, summarization).
    async fn complete(
        &self,
        system: &str,
        user_message: &str,
        params: &GenerationParams,
    ) -> Result<LlmResponse, LlmError>;

    /// Multi-turn completion with tool definitions, for the reasoning loop.
    async fn complete_with_tools(
        &self,
        system: &str,
        history: &[Message],
        tools: &[ToolSpec],
        params: &GenerationParams,
    ) -> Result<LlmResponse, LlmError>;

    async fn health_check(&self) -> Result<(), LlmError>;
}

/// Trait for embedding providers, kept separate from `LlmProvider` since a
/// deployment may mix a chat model from one vendor with embeddings from
/// another.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}
