// Gemini (Google) Provider Adapter
//
// Gemini models via the backend relay. Requires API key.
// Default endpoint: https://generativelanguage.googleapis.com/v1beta

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
    ConversationContext, FunctionCall, FunctionSpec, GenerationOptions, ProviderCapabilities,
    ProviderConfig, ProviderKind,
};

/// Relay paths forwarded to generateContent / streamGenerateContent
const GENERATE_PATH: &str = "/api/ai/gemini/generateContent";
const STREAM_PATH: &str = "/api/ai/gemini/streamGenerateContent";

pub struct GeminiAdapter {
    config: ProviderConfig,
    transport: Arc<ProxyTransport>,
}

impl GeminiAdapter {
    pub fn new(transport: Arc<ProxyTransport>) -> Self {
        Self {
            config: ProviderConfig::defaults_for(ProviderKind::Gemini),
            transport,
        }
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(ref key) = self.config.api_key {
            headers.insert(
                "x-goog-api-key",
                HeaderValue::from_str(key).unwrap_or_else(|_| HeaderValue::from_static("")),
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn build_request(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
        tools: Option<Vec<GeminiTool>>,
    ) -> GeminiRequest {
        // Gemini uses "model" instead of "assistant" for reply turns
        let mut contents = Vec::with_capacity(context.history.len() + 1);
        for message in &context.history {
            let role = if message.role == "assistant" { "model" } else { "user" };
            contents.push(GeminiContent {
                role: role.to_string(),
                parts: vec![GeminiPart {
                    text: message.content.clone(),
                }],
            });
        }
        contents.push(GeminiContent {
            role: "user".to_string(),
            parts: vec![GeminiPart {
                text: prompt.to_string(),
            }],
        });

        GeminiRequest {
            model: self.config.model.clone(),
            contents,
            system_instruction: context.system_prompt.as_ref().map(|s| GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: s.clone() }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
                top_p: options.top_p,
            },
            tools,
        }
    }
}

// Gemini API types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    model: String,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, PartialEq)]
pub(crate) enum StreamDelta {
    Text(String),
    Done,
    Ignore,
}

/// Parse one line of the streaming response. The relay forwards
/// newline-delimited JSON objects; a candidate with a `finishReason`
/// terminates the stream after its text is consumed.
pub(crate) fn parse_stream_line(line: &str) -> AiResult<StreamDelta> {
    // Array framing punctuation from the vendor's JSON-array stream
    let trimmed = line.trim_start_matches(['[', ',']).trim();
    if trimmed.is_empty() || trimmed == "]" {
        return Ok(StreamDelta::Ignore);
    }
    let value: Value = serde_json::from_str(trimmed)?;
    let candidate = &value["candidates"][0];
    if let Some(text) = candidate["content"]["parts"][0]["text"].as_str() {
        if !text.is_empty() {
            return Ok(StreamDelta::Text(text.to_string()));
        }
    }
    if candidate["finishReason"].is_string() {
        return Ok(StreamDelta::Done);
    }
    Ok(StreamDelta::Ignore)
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> &'static str {
        "gemini"
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
        if config.provider != ProviderKind::Gemini {
            return Err(AiError::InvalidConfig(format!(
                "expected gemini config, got {}",
                config.provider
            )));
        }
        self.config = config;
        log::info!("Gemini adapter configured with model {}", self.config.model);
        Ok(())
    }

    async fn generate_response(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
    ) -> AiResult<Value> {
        let request = self.build_request(prompt, context, options, None);
        let body = serde_json::to_value(&request)?;
        self.transport
            .post_json(GENERATE_PATH, &body, self.auth_headers())
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
        let request = self.build_request(prompt, context, options, None);
        let body = serde_json::to_value(&request)?;
        let mut lines = self
            .transport
            .stream_lines(STREAM_PATH, &body, self.auth_headers())
            .await?;

        let mut assembled = String::new();
        loop {
            tokio::select! {
                _ = cancel.recv() => {
                    log::info!("Gemini stream cancelled by user");
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
        let tools = vec![GeminiTool {
            function_declarations: functions
                .iter()
                .map(|f| GeminiFunctionDeclaration {
                    name: f.name.clone(),
                    description: f.description.clone(),
                    parameters: f.parameters.clone(),
                })
                .collect(),
        }];
        let request = self.build_request(prompt, context, &GenerationOptions::default(), Some(tools));
        let body = serde_json::to_value(&request)?;
        let response = self
            .transport
            .post_json(GENERATE_PATH, &body, self.auth_headers())
            .await?;

        let parts = response["candidates"][0]["content"]["parts"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        for part in parts {
            let call = &part["functionCall"];
            if let Some(name) = call["name"].as_str() {
                return Ok(Some(FunctionCall {
                    name: name.to_string(),
                    arguments: call["args"].clone(),
                }));
            }
        }
        Ok(None)
    }

    fn estimate_cost(&self, prompt_chars: usize, expected_response_chars: usize) -> f64 {
        cost_for(ProviderKind::Gemini, prompt_chars, expected_response_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_line_text() {
        let line = r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#;
        assert_eq!(
            parse_stream_line(line).unwrap(),
            StreamDelta::Text("Hello".to_string())
        );
    }

    #[test]
    fn test_parse_stream_line_finish_without_text() {
        let line = r#"{"candidates":[{"finishReason":"STOP","content":{"parts":[]}}]}"#;
        assert_eq!(parse_stream_line(line).unwrap(), StreamDelta::Done);
    }

    #[test]
    fn test_parse_stream_line_array_framing() {
        assert_eq!(parse_stream_line("]").unwrap(), StreamDelta::Ignore);
        let line = r#",{"candidates":[{"content":{"parts":[{"text":"more"}]}}]}"#;
        assert_eq!(
            parse_stream_line(line).unwrap(),
            StreamDelta::Text("more".to_string())
        );
    }

    #[test]
    fn test_assistant_role_maps_to_model() {
        use crate::models::ai::ChatMessage;

        let transport = Arc::new(ProxyTransport::new("http://localhost:3000", 5_000).unwrap());
        let adapter = GeminiAdapter::new(transport);
        let context = ConversationContext {
            system_prompt: None,
            history: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
        };
        let request = adapter.build_request("next", &context, &GenerationOptions::default(), None);
        assert_eq!(request.contents[1].role, "model");
        assert_eq!(request.contents[2].role, "user");
    }
}
