// Ollama Provider Adapter
//
// Local models via the backend relay. No API key required.
// Default endpoint: http://127.0.0.1:11434

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

/// Relay path forwarded to the Ollama chat endpoint
const CHAT_PATH: &str = "/api/ai/ollama/chat";

pub struct OllamaAdapter {
    config: ProviderConfig,
    transport: Arc<ProxyTransport>,
}

impl OllamaAdapter {
    pub fn new(transport: Arc<ProxyTransport>) -> Self {
        Self {
            config: ProviderConfig::defaults_for(ProviderKind::Ollama),
            transport,
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn build_request(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
        stream: bool,
    ) -> OllamaChatRequest {
        let mut messages = Vec::with_capacity(context.history.len() + 2);
        if let Some(ref system) = context.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend(context.history.iter().cloned());
        messages.push(ChatMessage::user(prompt));

        OllamaChatRequest {
            model: self.config.model.clone(),
            messages,
            stream,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
                top_p: options.top_p,
            },
        }
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum StreamDelta {
    Text(String),
    Done,
    Ignore,
}

/// Parse one line of the streaming response: bare JSON objects, one per
/// line, terminated by an object with `"done": true`.
pub(crate) fn parse_stream_line(line: &str) -> AiResult<StreamDelta> {
    let value: Value = serde_json::from_str(line)?;
    if value["done"].as_bool() == Some(true) {
        return Ok(StreamDelta::Done);
    }
    match value["message"]["content"].as_str() {
        Some(text) if !text.is_empty() => Ok(StreamDelta::Text(text.to_string())),
        _ => Ok(StreamDelta::Ignore),
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn id(&self) -> &'static str {
        "ollama"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_function_calling: false,
            supports_streaming: true,
            supports_multimodal: false,
            max_tokens: 4096,
        }
    }

    async fn configure(&mut self, config: ProviderConfig) -> AiResult<()> {
        self.transport.health_check().await?;
        if config.provider != ProviderKind::Ollama {
            return Err(AiError::InvalidConfig(format!(
                "expected ollama config, got {}",
                config.provider
            )));
        }
        self.config = config;
        log::info!("Ollama adapter configured with model {}", self.config.model);
        Ok(())
    }

    async fn generate_response(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
    ) -> AiResult<Value> {
        let request = self.build_request(prompt, context, options, false);
        let body = serde_json::to_value(&request)?;
        self.transport
            .post_json(CHAT_PATH, &body, self.headers())
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
        let request = self.build_request(prompt, context, options, true);
        let body = serde_json::to_value(&request)?;
        let mut lines = self
            .transport
            .stream_lines(CHAT_PATH, &body, self.headers())
            .await?;

        let mut assembled = String::new();
        loop {
            tokio::select! {
                _ = cancel.recv() => {
                    log::info!("Ollama stream cancelled by user");
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
        _prompt: &str,
        _functions: &[FunctionSpec],
        _context: &ConversationContext,
    ) -> AiResult<Option<FunctionCall>> {
        Err(AiError::UnsupportedCapability {
            provider: "ollama".to_string(),
            capability: "function calling".to_string(),
        })
    }

    fn estimate_cost(&self, prompt_chars: usize, expected_response_chars: usize) -> f64 {
        cost_for(ProviderKind::Ollama, prompt_chars, expected_response_chars)
    }
}
