//! Gemini-compatible REST provider (`generateContent`), used for the
//! fast/moderate/pro/flash model tiers.

use crate::error::LlmError;
use crate::llm::{GenerationParams, LlmProvider, LlmResponse, Message, TokenUsage, ToolCall, ToolSpec};

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
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

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        system: &str,
        user_message: &str,
        params: &GenerationParams,
    ) -> Result<LlmResponse, LlmError> {
        let system_prompt = params.system_prompt.as_deref().unwrap_or(system);
        let body = serde_json::json!({
            "system_instruction": { "parts": [{ "text": system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": user_message }] }],
            "generationConfig": {
                "maxOutputTokens": params.max_tokens,
                "temperature": params.temperature,
            }
        });

        let response = self.client.post(self.endpoint()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: serde_json::Value = response.json().await?;
        let text = parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let usage = TokenUsage {
            input_tokens: parsed["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            output_tokens: parsed["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
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
        let contents: Vec<serde_json::Value> = history.iter().map(message_to_gemini_part).collect();
        let function_declarations: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters_schema,
                })
            })
            .collect();

        let body = serde_json::json!({
            "system_instruction": { "parts": [{ "text": system_prompt }] },
            "contents": contents,
            "tools": [{ "functionDeclarations": function_declarations }],
            "generationConfig": {
                "maxOutputTokens": params.max_tokens,
                "temperature": params.temperature,
            }
        });

        let response = self.client.post(self.endpoint()).json(&body).send().await?;
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
            input_tokens: parsed["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            output_tokens: parsed["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
        };

        let parts = parsed["candidates"][0]["content"]["parts"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let calls: Vec<ToolCall> = parts
            .iter()
            .filter_map(|p| p.get("functionCall"))
            .enumerate()
            .map(|(i, fc)| ToolCall {
                id: format!("call_{i}"),
                name: fc["name"].as_str().unwrap_or_default().to_string(),
                arguments: fc["args"].clone(),
            })
            .collect();

        if !calls.is_empty() {
            return Ok(LlmResponse::ToolCalls { calls, usage });
        }

        let text = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");
        Ok(LlmResponse::Text { text, usage })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        self.complete("You are a health check.", "ping", &GenerationParams {
            max_tokens: 8,
            ..Default::default()
        })
        .await
        .map(|_| ())
    }
}

fn message_to_gemini_part(message: &Message) -> serde_json::Value {
    match message {
        Message::User(text) => serde_json::json!({ "role": "user", "parts": [{ "text": text }] }),
        Message::Assistant { text, tool_calls } => {
            let mut parts: Vec<serde_json::Value> = Vec::new();
            if let Some(text) = text {
                parts.push(serde_json::json!({ "text": text }));
            }
            for call in tool_calls {
                parts.push(serde_json::json!({
                    "functionCall": { "name": call.name, "args": call.arguments }
                }));
            }
            serde_json::json!({ "role": "model", "parts": parts })
        }
        Message::ToolResult { content, .. } => {
            serde_json::json!({ "role": "function", "parts": [{ "text": content }] })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn complete_parses_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "hello" }] } }],
                "usageMetadata": { "promptTokenCount": 10, "candidatesTokenCount": 2 }
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::with_base_url("key".into(), "gemini-2.0-flash".into(), server.uri());
        let response = provider
            .complete("system", "hi", &GenerationParams::default())
            .await
            .unwrap();
        match response {
            LlmResponse::Text { text, usage } => {
                assert_eq!(text, "hello");
                assert_eq!(usage.input_tokens, 10);
            }
            _ => panic!("expected text response"),
        }
    }

    #[tokio::test]
    async fn complete_with_tools_parses_function_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [
                    { "functionCall": { "name": "send_reply", "args": { "to": "a@b.com" } } }
                ]}}],
                "usageMetadata": { "promptTokenCount": 5, "candidatesTokenCount": 3 }
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::with_base_url("key".into(), "gemini-2.0-flash".into(), server.uri());
        let tools = vec![ToolSpec {
            name: "send_reply".to_string(),
            description: "send a reply".to_string(),
            parameters_schema: serde_json::json!({"type": "object"}),
        }];
        let response = provider
            .complete_with_tools("system", &[Message::User("hi".into())], &tools, &GenerationParams::default())
            .await
            .unwrap();
        match response {
            LlmResponse::ToolCalls { calls, .. } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "send_reply");
            }
            _ => panic!("expected tool calls"),
        }
    }
}
