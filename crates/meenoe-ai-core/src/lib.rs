// Meenoe AI Core
// Provider abstraction, security/performance middleware, and conversation
// orchestration for the Meenoe assistant.
//
// The crate is UI-agnostic: the consumer submits messages through the
// ConversationOrchestrator, receives AssistantEvents over an mpsc channel,
// and supplies application state through the StateProvider trait.

pub mod models;
pub mod services;

pub use models::ai::{
    ChatMessage, ConversationContext, FunctionCall, FunctionSpec, GenerationOptions,
    ProviderCapabilities, ProviderConfig, ProviderKind, RequestEnvelope,
};
pub use models::context::{
    AssistantEvent, AssistantSettings, ContextSnapshot, ErrorCategory, Opportunity,
    OpportunityKind, Priority, WorkflowRun, WorkflowStatus,
};
pub use services::ai::error::{AiError, AiErrorCode, AiResult};
pub use services::ai::manager::ProviderManager;
pub use services::ai::transport::ProxyTransport;
pub use services::ai::ProviderAdapter;
pub use services::assistant::ConversationOrchestrator;
pub use services::context::{ContextAwarenessEngine, StateProvider};
pub use services::context::decision::DecisionEngine;
pub use services::performance::PerformanceOptimizer;
pub use services::security::SecurityManager;
