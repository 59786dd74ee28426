// OpenAI Provider Adapter
//
// GPT models via the backend relay. Requires API key.
// Default endpoint: https://api.openai.com/v1

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::error::{AiError, AiResult};
use super::transport::ProxyTransport;
use super::{cost_for, ProviderAdapter};
use crate::models::ai::{
    ChatMessage, ConversationContext, FunctionCall, FunctionSpec, GenerationOptions,
    ProviderCapabilities, ProviderConfig, ProviderKind,
};

/// Relay path forwarded to the OpenAI chat completions endpoint
const CHAT_PATH: &str = "/api/ai/openai/chat/completions";

pub struct OpenAiAdapter {
    config: ProviderConfig,
    transport: Arc<ProxyTransport>,
}

impl OpenAiAdapter {
    pub fn new(transport: Arc<ProxyTransport>) -> Self {
        Self {
            config: ProviderConfig::defaults_for(ProviderKind::OpenAi),
            transport,
        }
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(ref key) = self.config.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .unwrap_or_else(|_| HeaderValue::from_static("")),
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn build_messages(&self, prompt: &str, context: &ConversationContext) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(context.history.len() + 2);
        if let Some(ref system) = context.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend(context.history.iter().cloned());
        messages.push(ChatMessage::user(prompt));
        messages
    }

    fn build_request(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
        stream: bool,
        tools: Option<Vec<OpenAiTool>>,
    ) -> OpenAiChatRequest {
        OpenAiChatRequest {
            model: self.config.model.clone(),
            messages: self.build_messages(prompt, context),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            tools,
            stream,
        }
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

/// Result of parsing one server-sent line from the streaming endpoint
#[derive(Debug, PartialEq)]
pub(crate) enum StreamDelta {
    Text(String),
    Done,
    Ignore,
}

/// Parse one SSE line: `data: {...}` payloads carry deltas, `data: [DONE]`
/// terminates the stream, everything else is framing noise.
pub(crate) fn parse_stream_line(line: &str) -> AiResult<StreamDelta> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(StreamDelta::Ignore);
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return Ok(StreamDelta::Done);
    }
    let value: Value = serde_json::from_str(payload)?;
    match value["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => Ok(StreamDelta::Text(text.to_string())),
        _ => Ok(StreamDelta::Ignore),
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &'static str {
        "openai"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_function_calling: true,
            supports_streaming: true,
            supports_multimodal: true,
            max_tokens: 16_384,
        }
    }

    async fn configure(&mut self, config: ProviderConfig) -> AiResult<()> {
        self.transport.health_check().await?;
        if config.provider != ProviderKind::OpenAi {
            return Err(AiError::InvalidConfig(format!(
                "expected openai config, got {}",
                config.provider
            )));
        }
        self.config = config;
        log::info!("OpenAI adapter configured with model {}", self.config.model);
        Ok(())
    }

    async fn generate_response(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
    ) -> AiResult<Value> {
        let request = self.build_request(prompt, context, options, false, None);
        let body = serde_json::to_value(&request)?;
        self.transport
            .post_json(CHAT_PATH, &body, self.auth_headers())
            .await
    }

    async fn stream_response(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
        on_chunk: &(dyn for<'a> Fn(&'a str) + Send + Sync),
        cancel: &mut mpsc::Receiver<()>,
    ) -> AiResult<String> {
        let request = self.build_request(prompt, context, options, true, None);
        let body = serde_json::to_value(&request)?;
        let mut lines = self
            .transport
            .stream_lines(CHAT_PATH, &body, self.auth_headers())
            .await?;

        let mut assembled = String::new();
        loop {
            tokio::select! {
                _ = cancel.recv() => {
                    log::info!("OpenAI stream cancelled by user");
                    return Err(AiError::Aborted);
                }
                line = lines.next() => {
                    let Some(line) = line else { break };
                    match parse_stream_line(&line?)? {
                        StreamDelta::Text(text) => {
                            on_chunk(&text);
                            assembled.push_str(&text);
                        }
                        StreamDelta::Done => break,
                        StreamDelta::Ignore => {}
                    }
                }
            }
        }
        Ok(assembled)
    }

    async fn get_function_call(
        &self,
        prompt: &str,
        functions: &[FunctionSpec],
        context: &ConversationContext,
    ) -> AiResult<Option<FunctionCall>> {
        let tools = functions
            .iter()
            .map(|f| OpenAiTool {
                tool_type: "function".to_string(),
                function: OpenAiFunction {
                    name: f.name.clone(),
                    description: f.description.clone(),
                    parameters: f.parameters.clone(),
                },
            })
            .collect();
        let request = self.build_request(prompt, context, &GenerationOptions::default(), false, Some(tools));
        let body = serde_json::to_value(&request)?;
        let response = self
            .transport
            .post_json(CHAT_PATH, &body, self.auth_headers())
            .await?;

        let call = &response["choices"][0]["message"]["tool_calls"][0]["function"];
        let Some(name) = call["name"].as_str() else {
            return Ok(None);
        };
        // OpenAI returns arguments as a JSON-encoded string
        let arguments = match call["arguments"].as_str() {
            Some(raw) => serde_json::from_str(raw)?,
            None => Value::Null,
        };
        Ok(Some(FunctionCall {
            name: name.to_string(),
            arguments,
        }))
    }

    fn estimate_cost(&self, prompt_chars: usize, expected_response_chars: usize) -> f64 {
        cost_for(ProviderKind::OpenAi, prompt_chars, expected_response_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_line_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(
            parse_stream_line(line).unwrap(),
            StreamDelta::Text("Hi".to_string())
        );
    }

    #[test]
    fn test_parse_stream_line_done() {
        assert_eq!(parse_stream_line("data: [DONE]").unwrap(), StreamDelta::Done);
    }

    #[test]
    fn test_parse_stream_line_ignores_noise() {
        assert_eq!(parse_stream_line(": keep-alive").unwrap(), StreamDelta::Ignore);
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_stream_line(role_only).unwrap(), StreamDelta::Ignore);
    }

    #[test]
    fn test_build_messages_order() {
        let transport = Arc::new(ProxyTransport::new("http://localhost:3000", 5_000).unwrap());
        let adapter = OpenAiAdapter::new(transport);
        let context = ConversationContext {
            system_prompt: Some("be brief".to_string()),
            history: vec![ChatMessage::user("earlier"), ChatMessage::assistant("ok")],
        };
        let messages = adapter.build_messages("now", &context);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[3].content, "now");
    }

    #[test]
    fn test_capabilities() {
        let transport = Arc::new(ProxyTransport::new("http://localhost:3000", 5_000).unwrap());
        let adapter = OpenAiAdapter::new(transport);
        assert!(adapter.supports_streaming());
        assert!(adapter.supports_function_calling());
    }
}
