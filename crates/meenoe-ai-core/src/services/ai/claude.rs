// Claude (Anthropic) Provider Adapter
//
// Claude models via the backend relay. Requires API key.
// Default endpoint: https://api.anthropic.com/v1

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
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

/// Relay path forwarded to the Anthropic messages endpoint
const MESSAGES_PATH: &str = "/api/ai/claude/messages";

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeAdapter {
    config: ProviderConfig,
    transport: Arc<ProxyTransport>,
}

impl ClaudeAdapter {
    pub fn new(transport: Arc<ProxyTransport>) -> Self {
        Self {
            config: ProviderConfig::defaults_for(ProviderKind::Claude),
            transport,
        }
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(ref key) = self.config.api_key {
            headers.insert(
                "x-api-key",
                HeaderValue::from_str(key).unwrap_or_else(|_| HeaderValue::from_static("")),
            );
        }
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn build_request(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
        stream: bool,
        tools: Option<Vec<ClaudeTool>>,
    ) -> ClaudeMessagesRequest {
        // Claude takes the system prompt as a top-level field, not a message
        let mut messages = Vec::with_capacity(context.history.len() + 1);
        messages.extend(context.history.iter().cloned());
        messages.push(ChatMessage::user(prompt));

        ClaudeMessagesRequest {
            model: self.config.model.clone(),
            max_tokens: options.max_tokens.unwrap_or(4096),
            messages,
            system: context.system_prompt.clone(),
            temperature: options.temperature,
            top_p: options.top_p,
            tools,
            stream,
        }
    }
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct ClaudeMessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ClaudeTool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ClaudeTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, PartialEq)]
pub(crate) enum StreamDelta {
    Text(String),
    Done,
    Ignore,
}

/// Parse one SSE line from the messages stream. Text arrives as
/// `content_block_delta` events; `message_stop` terminates the stream.
pub(crate) fn parse_stream_line(line: &str) -> AiResult<StreamDelta> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(StreamDelta::Ignore);
    };
    let value: Value = serde_json::from_str(payload.trim())?;
    match value["type"].as_str() {
        Some("content_block_delta") => match value["delta"]["text"].as_str() {
            Some(text) if !text.is_empty() => Ok(StreamDelta::Text(text.to_string())),
            _ => Ok(StreamDelta::Ignore),
        },
        Some("message_stop") => Ok(StreamDelta::Done),
        _ => Ok(StreamDelta::Ignore),
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeAdapter {
    fn id(&self) -> &'static str {
        "claude"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_function_calling: true,
            supports_streaming: true,
            supports_multimodal: true,
            max_tokens: 8192,
        }
    }

    async fn configure(&mut self, config: ProviderConfig) -> AiResult<()> {
        self.transport.health_check().await?;
        if config.provider != ProviderKind::Claude {
            return Err(AiError::InvalidConfig(format!(
                "expected claude config, got {}",
                config.provider
            )));
        }
        self.config = config;
        log::info!("Claude adapter configured with model {}", self.config.model);
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
            .post_json(MESSAGES_PATH, &body, self.auth_headers())
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
            .stream_lines(MESSAGES_PATH, &body, self.auth_headers())
            .await?;

        let mut assembled = String::new();
        loop {
            tokio::select! {
                _ = cancel.recv() => {
                    log::info!("Claude stream cancelled by user");
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
            .map(|f| ClaudeTool {
                name: f.name.clone(),
                description: f.description.clone(),
                input_schema: f.parameters.clone(),
            })
            .collect();
        let request =
            self.build_request(prompt, context, &GenerationOptions::default(), false, Some(tools));
        let body = serde_json::to_value(&request)?;
        let response = self
            .transport
            .post_json(MESSAGES_PATH, &body, self.auth_headers())
            .await?;

        // Claude answers with a content array; a tool_use block carries the call
        let blocks = response["content"].as_array().cloned().unwrap_or_default();
        for block in blocks {
            if block["type"] == "tool_use" {
                if let Some(name) = block["name"].as_str() {
                    return Ok(Some(FunctionCall {
                        name: name.to_string(),
                        arguments: block["input"].clone(),
                    }));
                }
            }
        }
        Ok(None)
    }

    fn estimate_cost(&self, prompt_chars: usize, expected_response_chars: usize) -> f64 {
        cost_for(ProviderKind::Claude, prompt_chars, expected_response_chars)
    }
}
