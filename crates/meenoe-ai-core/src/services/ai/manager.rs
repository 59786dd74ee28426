// Provider Manager
//
// Owns the adapter registry, tracks the active provider, and runs the
// fallback chain when the active provider fails.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use super::error::{AiError, AiResult};
use super::transport::ProxyTransport;
use super::{create_adapter, ProviderAdapter};
use crate::models::ai::{
    ConversationContext, FunctionCall, FunctionSpec, GenerationOptions, ProviderConfig,
    ProviderKind,
};

pub struct ProviderManager {
    adapters: HashMap<String, Box<dyn ProviderAdapter>>,
    active: String,
    /// Providers tried, in order, after the active one fails
    fallback_order: Vec<String>,
    fallback_enabled: bool,
}

impl ProviderManager {
    /// Build a manager with all four adapters sharing one relay transport
    pub fn with_transport(transport: Arc<ProxyTransport>) -> Self {
        let mut adapters: HashMap<String, Box<dyn ProviderAdapter>> = HashMap::new();
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Claude,
            ProviderKind::Gemini,
            ProviderKind::Ollama,
        ] {
            adapters.insert(kind.id().to_string(), create_adapter(kind, transport.clone()));
        }
        Self {
            adapters,
            active: ProviderKind::OpenAi.id().to_string(),
            fallback_order: vec![
                ProviderKind::Claude.id().to_string(),
                ProviderKind::Gemini.id().to_string(),
                ProviderKind::Ollama.id().to_string(),
            ],
            fallback_enabled: true,
        }
    }

    /// Empty manager; adapters are registered explicitly
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
            active: String::new(),
            fallback_order: Vec::new(),
            fallback_enabled: true,
        }
    }

    pub fn register(&mut self, adapter: Box<dyn ProviderAdapter>) {
        let id = adapter.id().to_string();
        if self.active.is_empty() {
            self.active = id.clone();
        } else if id != self.active && !self.fallback_order.contains(&id) {
            self.fallback_order.push(id.clone());
        }
        self.adapters.insert(id, adapter);
    }

    pub fn set_fallback_enabled(&mut self, enabled: bool) {
        self.fallback_enabled = enabled;
    }

    pub fn active_provider(&self) -> &str {
        &self.active
    }

    pub fn set_provider(&mut self, id: &str) -> AiResult<()> {
        if !self.adapters.contains_key(id) {
            return Err(AiError::ProviderNotFound(id.to_string()));
        }
        self.active = id.to_string();
        log::info!("Active AI provider set to {id}");
        Ok(())
    }

    /// Configure the active adapter; fails when its relay is unreachable
    pub async fn configure_active(&mut self, config: ProviderConfig) -> AiResult<()> {
        let adapter = self
            .adapters
            .get_mut(&self.active)
            .ok_or_else(|| AiError::ProviderNotFound(self.active.clone()))?;
        adapter.configure(config).await
    }

    fn adapter(&self, id: &str) -> AiResult<&dyn ProviderAdapter> {
        self.adapters
            .get(id)
            .map(|a| a.as_ref())
            .ok_or_else(|| AiError::ProviderNotFound(id.to_string()))
    }

    pub fn active_supports_streaming(&self) -> bool {
        self.adapters
            .get(&self.active)
            .map(|a| a.supports_streaming())
            .unwrap_or(false)
    }

    /// Generate a response, falling back through the chain on failure.
    /// Returns the extracted text; the raw provider payload never escapes.
    pub async fn generate_response(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
    ) -> AiResult<String> {
        let active = self.adapter(&self.active)?;
        let mut last_error = match self.try_provider(active, prompt, context, options).await {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };

        if !self.fallback_enabled {
            return Err(last_error);
        }

        log::warn!(
            "Provider {} failed ({last_error}), trying fallbacks",
            self.active
        );
        for id in &self.fallback_order {
            if id == &self.active {
                continue;
            }
            let Ok(adapter) = self.adapter(id) else { continue };
            match self.try_provider(adapter, prompt, context, options).await {
                Ok(text) => {
                    log::info!("Fallback provider {id} answered");
                    return Ok(text);
                }
                Err(err) => {
                    log::warn!("Fallback provider {id} failed: {err}");
                    last_error = err;
                }
            }
        }
        Err(AiError::AllProvidersFailed(Box::new(last_error)))
    }

    async fn try_provider(
        &self,
        adapter: &dyn ProviderAdapter,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
    ) -> AiResult<String> {
        let raw = adapter.generate_response(prompt, context, options).await?;
        normalize_response(adapter.id(), &raw).ok_or_else(|| {
            AiError::ParseError(format!("no text in {} response", adapter.id()))
        })
    }

    /// Stream from the active provider. No fallback on the streaming path;
    /// a mid-stream provider switch would splice two different answers.
    pub async fn stream_response(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
        on_chunk: &(dyn for<'a> Fn(&'a str) + Send + Sync),
        cancel: &mut mpsc::Receiver<()>,
    ) -> AiResult<String> {
        let adapter = self.adapter(&self.active)?;
        if !adapter.supports_streaming() {
            return Err(AiError::UnsupportedCapability {
                provider: adapter.id().to_string(),
                capability: "streaming".to_string(),
            });
        }
        adapter
            .stream_response(prompt, context, options, on_chunk, cancel)
            .await
    }

    pub async fn get_function_call(
        &self,
        prompt: &str,
        functions: &[FunctionSpec],
        context: &ConversationContext,
    ) -> AiResult<Option<FunctionCall>> {
        let adapter = self.adapter(&self.active)?;
        if !adapter.supports_function_calling() {
            return Err(AiError::UnsupportedCapability {
                provider: adapter.id().to_string(),
                capability: "function calling".to_string(),
            });
        }
        adapter.get_function_call(prompt, functions, context).await
    }

    pub fn estimate_cost(&self, prompt_chars: usize, expected_response_chars: usize) -> AiResult<f64> {
        Ok(self
            .adapter(&self.active)?
            .estimate_cost(prompt_chars, expected_response_chars))
    }
}

/// Extract the reply text from a provider's raw payload.
/// Each vendor nests the text differently; unknown shapes fall through a
/// generic chain before giving up.
pub fn normalize_response(provider: &str, raw: &Value) -> Option<String> {
    let text = match provider {
        "openai" => raw["choices"][0]["message"]["content"].as_str(),
        "claude" => raw["content"].as_array().and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b["type"] == "text")
                .and_then(|b| b["text"].as_str())
        }),
        "gemini" => raw["candidates"][0]["content"]["parts"][0]["text"].as_str(),
        "ollama" => raw["message"]["content"].as_str(),
        _ => None,
    };
    text.or_else(|| raw["choices"][0]["message"]["content"].as_str())
        .or_else(|| raw["message"]["content"].as_str())
        .or_else(|| raw["content"].as_str())
        .or_else(|| raw["text"].as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai::test_support::ScriptedAdapter;
    use serde_json::json;

    fn openai_payload(text: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
    }

    #[test]
    fn test_normalize_openai() {
        let raw = openai_payload("hello");
        assert_eq!(normalize_response("openai", &raw).as_deref(), Some("hello"));
    }

    #[test]
    fn test_normalize_claude_skips_non_text_blocks() {
        let raw = json!({"content": [
            {"type": "tool_use", "name": "f", "input": {}},
            {"type": "text", "text": "answer"}
        ]});
        assert_eq!(normalize_response("claude", &raw).as_deref(), Some("answer"));
    }

    #[test]
    fn test_normalize_gemini_and_ollama() {
        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "g"}]}}]});
        assert_eq!(normalize_response("gemini", &gemini).as_deref(), Some("g"));

        let ollama = json!({"message": {"role": "assistant", "content": "o"}});
        assert_eq!(normalize_response("ollama", &ollama).as_deref(), Some("o"));
    }

    #[test]
    fn test_normalize_unknown_shape_is_none() {
        assert_eq!(normalize_response("openai", &json!({"odd": true})), None);
    }

    #[tokio::test]
    async fn test_set_provider_unknown_fails() {
        let mut manager = ProviderManager::empty();
        manager.register(Box::new(ScriptedAdapter::replying("openai", Value::Null)));
        assert!(matches!(
            manager.set_provider("mistral"),
            Err(AiError::ProviderNotFound(_))
        ));
        assert!(manager.set_provider("openai").is_ok());
    }

    #[tokio::test]
    async fn test_fallback_succeeds_after_primary_failure() {
        let mut manager = ProviderManager::empty();
        manager.register(Box::new(ScriptedAdapter::failing("openai", "boom")));
        manager.register(Box::new(ScriptedAdapter::replying(
            "claude",
            json!({"content": [{"type": "text", "text": "backup answer"}]}),
        )));

        let text = manager
            .generate_response("hi", &ConversationContext::default(), &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "backup answer");
    }

    #[tokio::test]
    async fn test_all_providers_failed_wraps_last_error() {
        let mut manager = ProviderManager::empty();
        manager.register(Box::new(ScriptedAdapter::failing("openai", "down")));
        manager.register(Box::new(ScriptedAdapter::auth_failing("claude", "bad key")));

        let err = manager
            .generate_response("hi", &ConversationContext::default(), &GenerationOptions::default())
            .await
            .unwrap_err();
        match err {
            AiError::AllProvidersFailed(inner) => {
                assert!(matches!(*inner, AiError::AuthFailed(_)));
            }
            other => panic!("expected AllProvidersFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fallback_disabled_returns_original_error() {
        let mut manager = ProviderManager::empty();
        manager.register(Box::new(ScriptedAdapter::failing("openai", "down")));
        manager.register(Box::new(ScriptedAdapter::replying(
            "claude",
            json!({"content": [{"type": "text", "text": "unused"}]}),
        )));
        manager.set_fallback_enabled(false);

        let err = manager
            .generate_response("hi", &ConversationContext::default(), &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Provider(_)));
    }

    #[tokio::test]
    async fn test_streaming_capability_checked() {
        let mut manager = ProviderManager::empty();
        let mut adapter = ScriptedAdapter::replying("openai", Value::Null);
        adapter.capabilities.supports_streaming = false;
        manager.register(Box::new(adapter));

        let (_tx, mut rx) = mpsc::channel(1);
        let err = manager
            .stream_response(
                "hi",
                &ConversationContext::default(),
                &GenerationOptions::default(),
                &|_| {},
                &mut rx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::UnsupportedCapability { .. }));
    }
}
