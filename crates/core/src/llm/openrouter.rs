//! OpenRouter-compatible (OpenAI chat-completions shape) provider, used as
//! an alternative backend for any model tier.

use crate::error::LlmError;
use crate::llm::{GenerationParams, LlmProvider, LlmResponse, Message, TokenUsage, ToolCall, ToolSpec};

pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenRouterProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: "https://openrouter.ai/api/v1".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(
        &self,
        system: &str,
        user_message: &str,
        params: &GenerationParams,
    ) -> Result<LlmResponse, LlmError> {
        let system_prompt = params.system_prompt.as_deref().unwrap_or(system);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message },
            ]
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: serde_json::Value = response.json().await?;
        let text = parsed["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();
        let usage = TokenUsage {
            input_tokens: parsed["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };
        Ok(LlmResponse::Text { text, usage })
    }

    async fn complete_with_tools(
        &self,
        system: &str,
        history: &[Message],
        tools: &[ToolSpec],
        params: &GenerationParams,
    ) -> Result<LlmResponse, LlmError> {
        let system_prompt = params.system_prompt.as_deref().unwrap_or(system);
        let mut messages = vec![serde_json::json!({ "role": "system", "content": system_prompt })];
        messages.extend(history.iter().map(message_to_openai));

        let tool_defs: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": { "name": t.name, "description": t.description, "parameters": t.parameters_schema }
                })
            })
            .collect();

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": messages,
            "tools": tool_defs,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: serde_json::Value = response.json().await?;
        let usage = TokenUsage {
            input_tokens: parsed["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        let message = &parsed["choices"][0]["message"];
        let tool_calls = message["tool_calls"].as_array().cloned().unwrap_or_default();
        if !tool_calls.is_empty() {
            let calls = tool_calls
                .iter()
                .map(|tc| ToolCall {
                    id: tc["id"].as_str().unwrap_or_default().to_string(),
                    name: tc["function"]["name"].as_str().unwrap_or_default().to_string(),
                    arguments: serde_json::from_str(tc["function"]["arguments"].as_str().unwrap_or("{}"))
                        .unwrap_or(serde_json::Value::Null),
                })
                .collect();
            return Ok(LlmResponse::ToolCalls { calls, usage });
        }

        let text = message["content"].as_str().unwrap_or_default().to_string();
        Ok(LlmResponse::Text { text, usage })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        self.complete("health check", "ping", &GenerationParams { max_tokens: 4, ..Default::default() })
            .await
            .map(|_| ())
    }
}

fn message_to_openai(message: &Message) -> serde_json::Value {
    match message {
        Message::User(text) => serde_json::json!({ "role": "user", "content": text }),
        Message::Assistant { text, tool_calls } => {
            let calls: Vec<serde_json::Value> = tool_calls
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "id": c.id,
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.arguments.to_string() }
                    })
                })
                .collect();
            serde_json::json!({ "role": "assistant", "content": text, "tool_calls": calls })
        }
        Message::ToolResult { tool_call_id, content } => {
            serde_json::json!({ "role": "tool", "tool_call_id": tool_call_id, "content": content })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn complete_parses_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "hi there" } }],
                "usage": { "prompt_tokens": 4, "completion_tokens": 2 }
            })))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::with_base_url("key".into(), "model".into(), server.uri());
        let response = provider.complete("sys", "hello", &GenerationParams::default()).await.unwrap();
        match response {
            LlmResponse::Text { text, .. } => assert_eq!(text, "hi there"),
            _ => panic!("expected text"),
        }
    }
}
