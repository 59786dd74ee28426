// AI Provider Abstraction
//
// Uniform adapter interface over OpenAI, Claude, Gemini, and Ollama, all
// reached through the backend relay transport.

pub mod claude;
pub mod error;
pub mod gemini;
pub mod manager;
pub mod ollama;
pub mod openai;
pub mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::models::ai::{
    ConversationContext, FunctionCall, FunctionSpec, GenerationOptions, ProviderCapabilities,
    ProviderConfig, ProviderKind,
};
use error::AiResult;
use transport::ProxyTransport;

/// Crude token estimate used only for advisory cost figures
pub(crate) fn estimate_tokens(chars: usize) -> f64 {
    chars as f64 / 4.0
}

/// Common interface implemented by every provider adapter
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider id ("openai", "claude", "gemini", "ollama")
    fn id(&self) -> &'static str;

    /// Static capability descriptor for this provider
    fn capabilities(&self) -> ProviderCapabilities;

    fn supports_streaming(&self) -> bool {
        self.capabilities().supports_streaming
    }

    fn supports_function_calling(&self) -> bool {
        self.capabilities().supports_function_calling
    }

    /// Store connection settings. Health-checks the relay first and refuses
    /// the new config when the relay is unreachable.
    async fn configure(&mut self, config: ProviderConfig) -> AiResult<()>;

    /// Generate a complete response; returns the raw provider JSON
    async fn generate_response(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
    ) -> AiResult<Value>;

    /// Stream a response, invoking `on_chunk` per text fragment and returning
    /// the assembled text. A message on `cancel` aborts with `AiError::Aborted`.
    async fn stream_response(
        &self,
        prompt: &str,
        context: &ConversationContext,
        options: &GenerationOptions,
        on_chunk: &(dyn for<'a> Fn(&'a str) + Send + Sync),
        cancel: &mut mpsc::Receiver<()>,
    ) -> AiResult<String>;

    /// Ask the model to pick a function call; None when it answered in prose
    async fn get_function_call(
        &self,
        prompt: &str,
        functions: &[FunctionSpec],
        context: &ConversationContext,
    ) -> AiResult<Option<FunctionCall>>;

    /// Advisory cost estimate in USD for a prompt/response of the given sizes
    fn estimate_cost(&self, prompt_chars: usize, expected_response_chars: usize) -> f64;
}

/// Create an adapter for the given provider kind
pub fn create_adapter(
    kind: ProviderKind,
    transport: Arc<ProxyTransport>,
) -> Box<dyn ProviderAdapter> {
    match kind {
        ProviderKind::OpenAi => Box::new(openai::OpenAiAdapter::new(transport)),
        ProviderKind::Claude => Box::new(claude::ClaudeAdapter::new(transport)),
        ProviderKind::Gemini => Box::new(gemini::GeminiAdapter::new(transport)),
        ProviderKind::Ollama => Box::new(ollama::OllamaAdapter::new(transport)),
    }
}

/// Default cost math shared by the adapters
pub(crate) fn cost_for(kind: ProviderKind, prompt_chars: usize, response_chars: usize) -> f64 {
    let (input_rate, output_rate) = kind.rates_per_1k_tokens();
    let input_tokens = estimate_tokens(prompt_chars);
    let output_tokens = estimate_tokens(response_chars);
    (input_tokens / 1000.0) * input_rate + (output_tokens / 1000.0) * output_rate
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_divides_by_four() {
        assert!((estimate_tokens(400) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cost_for_ollama_is_free() {
        assert_eq!(cost_for(ProviderKind::Ollama, 10_000, 10_000), 0.0);
    }

    #[test]
    fn test_cost_for_openai_is_positive() {
        let cost = cost_for(ProviderKind::OpenAi, 4_000, 4_000);
        assert!(cost > 0.0);
        // 1000 tokens each way at the default-model rates
        assert!((cost - (0.00015 + 0.0006)).abs() < 1e-9);
    }
}
