// AI provider data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported AI providers, reachable through the backend relay
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Claude,
    Gemini,
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl ProviderKind {
    /// Stable identifier used for registry keys and relay paths
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "openai" => Some(ProviderKind::OpenAi),
            "claude" => Some(ProviderKind::Claude),
            "gemini" => Some(ProviderKind::Gemini),
            "ollama" => Some(ProviderKind::Ollama),
            _ => None,
        }
    }

    /// Returns whether this provider requires an API key
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Returns the default relay base URL for this provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Claude => "https://api.anthropic.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Ollama => "http://127.0.0.1:11434",
        }
    }

    /// Returns the default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Claude => "claude-3-haiku-20240307",
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::Ollama => "llama3.2",
        }
    }

    /// Advisory per-1000-token rates (input, output) in USD for the default model
    pub fn rates_per_1k_tokens(&self) -> (f64, f64) {
        match self {
            ProviderKind::OpenAi => (0.00015, 0.0006),
            ProviderKind::Claude => (0.00025, 0.00125),
            ProviderKind::Gemini => (0.000075, 0.0003),
            ProviderKind::Ollama => (0.0, 0.0),
        }
    }
}

/// Connection settings for a single provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    /// Opaque secret; the core never persists it
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl ProviderConfig {
    /// Create a config with the provider's default endpoint and model
    pub fn defaults_for(provider: ProviderKind) -> Self {
        Self {
            provider,
            api_key: None,
            base_url: provider.default_base_url().to_string(),
            model: provider.default_model().to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Static capability descriptor; immutable once an adapter is constructed
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    pub supports_function_calling: bool,
    pub supports_streaming: bool,
    pub supports_multimodal: bool,
    pub max_tokens: u32,
}

/// Chat message for provider calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Options for generation requests
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Top-p sampling
    pub top_p: Option<f32>,
}

/// Conversation state handed to an adapter alongside the prompt
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    /// Optional system prompt, sent however the vendor expects it
    pub system_prompt: Option<String>,
    /// Prior turns, oldest first
    pub history: Vec<ChatMessage>,
}

/// Declaration of a callable function exposed to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the function parameters
    pub parameters: serde_json::Value,
}

/// A function invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One user request as it enters the pipeline; never mutated after creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub request_type: String,
    pub content: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl RequestEnvelope {
    pub fn new(
        request_type: impl Into<String>,
        content: impl Into<String>,
        user_id: impl Into<String>,
        context: Option<serde_json::Value>,
    ) -> Self {
        Self {
            request_type: request_type.into(),
            content: content.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
            context,
        }
    }

    /// JSON view used for input validation (content plus optional context)
    pub fn validation_view(&self) -> serde_json::Value {
        let mut view = serde_json::json!({ "content": self.content });
        if let Some(ref ctx) = self.context {
            view["context"] = ctx.clone();
        }
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_roundtrip() {
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Claude,
            ProviderKind::Gemini,
            ProviderKind::Ollama,
        ] {
            assert_eq!(ProviderKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(ProviderKind::from_id("mistral"), None);
    }

    #[test]
    fn test_defaults_for_provider() {
        let config = ProviderConfig::defaults_for(ProviderKind::Claude);
        assert_eq!(config.model, "claude-3-haiku-20240307");
        assert!(config.base_url.contains("anthropic"));
        assert_eq!(config.timeout_ms, 30_000);
    }

    #[test]
    fn test_only_ollama_is_keyless() {
        assert!(ProviderKind::OpenAi.requires_api_key());
        assert!(ProviderKind::Claude.requires_api_key());
        assert!(ProviderKind::Gemini.requires_api_key());
        assert!(!ProviderKind::Ollama.requires_api_key());
    }

    #[test]
    fn test_envelope_validation_view_includes_context() {
        let envelope = RequestEnvelope::new(
            "chat",
            "hello",
            "user-1",
            Some(serde_json::json!({"activeTab": "agenda"})),
        );
        let view = envelope.validation_view();
        assert_eq!(view["content"], "hello");
        assert_eq!(view["context"]["activeTab"], "agenda");
    }
}
