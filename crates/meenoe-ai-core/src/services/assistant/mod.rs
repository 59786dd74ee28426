// Conversation Orchestrator
//
// Ties the pipeline together: security checks, the performance optimizer,
// the provider layer, sanitization, proactive suggestions, and workflow
// tracking. Consumers hold one orchestrator and listen on its event channel.

pub mod stream;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

use crate::models::ai::{
    ChatMessage, ConversationContext, GenerationOptions, ProviderConfig, ProviderKind,
    RequestEnvelope,
};
use crate::models::context::{
    AssistantEvent, AssistantSettings, ErrorCategory, UserInteraction, WorkflowRun, WorkflowStatus,
};
use crate::services::ai::error::{AiError, AiResult};
use crate::services::ai::manager::ProviderManager;
use crate::services::context::decision::DecisionEngine;
use crate::services::context::ContextAwarenessEngine;
use crate::services::performance::{PerformanceOptimizer, RequestHandler};
use crate::services::security::SecurityManager;
use stream::StreamSessionManager;

/// Prior turns kept per conversation (each turn is two messages)
const MAX_HISTORY_MESSAGES: usize = 20;

pub struct ConversationOrchestrator {
    security: Arc<SecurityManager>,
    optimizer: PerformanceOptimizer,
    providers: Arc<RwLock<ProviderManager>>,
    context_engine: Arc<ContextAwarenessEngine>,
    decisions: DecisionEngine,
    streams: StreamSessionManager,
    settings: RwLock<AssistantSettings>,
    events: mpsc::UnboundedSender<AssistantEvent>,
    workflows: Mutex<HashMap<String, WorkflowRun>>,
    /// Per-user conversation history, oldest first
    conversations: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl ConversationOrchestrator {
    pub fn new(
        security: Arc<SecurityManager>,
        providers: Arc<RwLock<ProviderManager>>,
        context_engine: Arc<ContextAwarenessEngine>,
        events: mpsc::UnboundedSender<AssistantEvent>,
    ) -> Self {
        Self {
            security,
            optimizer: PerformanceOptimizer::new(),
            providers,
            context_engine,
            decisions: DecisionEngine::new(),
            streams: StreamSessionManager::new(),
            settings: RwLock::new(AssistantSettings::default()),
            events,
            workflows: Mutex::new(HashMap::new()),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    pub fn security(&self) -> &SecurityManager {
        &self.security
    }

    pub fn context_engine(&self) -> &ContextAwarenessEngine {
        &self.context_engine
    }

    /// Apply new assistant settings: check the key format, switch the active
    /// provider, and push the connection config to its adapter.
    pub async fn configure(&self, settings: AssistantSettings) -> AiResult<()> {
        let kind = ProviderKind::from_id(&settings.provider)
            .ok_or_else(|| AiError::ProviderNotFound(settings.provider.clone()))?;

        match settings.api_key.as_deref() {
            Some(key) => {
                if !self.security.validate_api_key(key, &kind) {
                    return Err(AiError::AuthFailed(format!(
                        "API key does not match the {kind} key format"
                    )));
                }
            }
            None if kind.requires_api_key() => {
                return Err(AiError::AuthFailed(format!("{kind} requires an API key")));
            }
            None => {}
        }

        let mut config = ProviderConfig::defaults_for(kind);
        config.api_key = settings.api_key.clone();
        if let Some(ref base_url) = settings.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(ref model) = settings.model {
            config.model = model.clone();
        }

        {
            let mut providers = self.providers.write().await;
            providers.set_provider(kind.id())?;
            providers.configure_active(config).await?;
        }

        *self.settings.write().await = settings;
        log::info!("Assistant configured for provider {kind}");
        Ok(())
    }

    /// Process one user message end to end. Progress and the outcome are
    /// delivered on the event channel; the returned session id ties those
    /// events to this call.
    pub async fn process_message(
        &self,
        message: &str,
        user_id: &str,
        context: Option<Value>,
    ) -> String {
        let (session_id, cancel_rx) = self.streams.create_session().await;
        let envelope = RequestEnvelope::new("chat", message, user_id, context);

        if let Err(error) = self.handle_message(&session_id, cancel_rx, &envelope).await {
            self.security.audit().log_error(&error, "process_message");
            let event = match error {
                AiError::Aborted => AssistantEvent::Stopped {
                    session_id: session_id.clone(),
                },
                other => {
                    let category = other.user_category();
                    AssistantEvent::Error {
                        session_id: session_id.clone(),
                        category,
                        message: other.user_message().to_string(),
                        open_settings: category == ErrorCategory::NeedsConfiguration,
                    }
                }
            };
            let _ = self.events.send(event);
        }

        self.streams.remove_session(&session_id).await;
        session_id
    }

    async fn handle_message(
        &self,
        session_id: &str,
        cancel_rx: mpsc::Receiver<()>,
        envelope: &RequestEnvelope,
    ) -> AiResult<()> {
        self.security.validate_request(envelope)?;
        self.context_engine
            .record_interaction(UserInteraction::new("chat", None));

        let settings = self.settings.read().await.clone();
        let provider_id = {
            let providers = self.providers.read().await;
            providers.active_provider().to_string()
        };
        let streaming =
            settings.enable_streaming && self.providers.read().await.active_supports_streaming();

        let conversation = self.conversation_context(envelope);
        let handler =
            self.build_handler(session_id, cancel_rx, &envelope.content, streaming, conversation);
        let raw = self
            .optimizer
            .optimize_request(&envelope.request_type, &envelope.content, &provider_id, handler)
            .await?;

        let clean = self.security.sanitize_response(&provider_id, &raw)?;
        let content = match clean {
            Value::String(text) => text,
            other => other.to_string(),
        };
        self.record_turn(&envelope.user_id, &envelope.content, &content);
        let _ = self.events.send(AssistantEvent::Complete {
            session_id: session_id.to_string(),
            content,
        });

        if settings.enable_proactive_assistance {
            self.run_proactive_pass();
        }
        Ok(())
    }

    /// Assemble the provider-facing context: this user's prior turns plus a
    /// system prompt carrying whatever application state the caller attached
    fn conversation_context(&self, envelope: &RequestEnvelope) -> ConversationContext {
        let history = {
            let conversations = recover_lock(&self.conversations);
            conversations
                .get(&envelope.user_id)
                .cloned()
                .unwrap_or_default()
        };
        let system_prompt = envelope
            .context
            .as_ref()
            .map(|state| format!("Current meeting state: {state}"));
        ConversationContext {
            system_prompt,
            history,
        }
    }

    /// Append a finished exchange to the user's history, trimming the oldest
    /// messages once the bound is exceeded
    fn record_turn(&self, user_id: &str, message: &str, reply: &str) {
        let mut conversations = recover_lock(&self.conversations);
        let history = conversations.entry(user_id.to_string()).or_default();
        history.push(ChatMessage::user(message));
        history.push(ChatMessage::assistant(reply));
        if history.len() > MAX_HISTORY_MESSAGES {
            let excess = history.len() - MAX_HISTORY_MESSAGES;
            history.drain(..excess);
        }
    }

    /// Build the deferred provider call handed to the optimizer. On a cache
    /// hit it never runs, so streamed replies replay from cache as a single
    /// Complete event.
    fn build_handler(
        &self,
        session_id: &str,
        cancel_rx: mpsc::Receiver<()>,
        prompt: &str,
        streaming: bool,
        context: ConversationContext,
    ) -> RequestHandler {
        let providers = self.providers.clone();
        let events = self.events.clone();
        let session_id = session_id.to_string();
        let prompt = prompt.to_string();

        Box::new(move || {
            Box::pin(async move {
                let providers = providers.read().await;
                let options = GenerationOptions::default();
                if streaming {
                    let mut cancel = cancel_rx;
                    let on_chunk = move |chunk: &str| {
                        let _ = events.send(AssistantEvent::Token {
                            session_id: session_id.clone(),
                            token: chunk.to_string(),
                        });
                    };
                    let text = providers
                        .stream_response(&prompt, &context, &options, &on_chunk, &mut cancel)
                        .await?;
                    Ok(Value::String(text))
                } else {
                    providers
                        .generate_response(&prompt, &context, &options)
                        .await
                        .map(Value::String)
                }
            })
        })
    }

    /// Snapshot the application state and surface any opportunities
    fn run_proactive_pass(&self) {
        let Some(snapshot) = self.context_engine.on_state_change() else {
            return;
        };
        for opportunity in self.decisions.identify_opportunities(&snapshot) {
            let _ = self
                .events
                .send(AssistantEvent::Suggestion { opportunity });
        }
    }

    /// Stop an in-flight response
    pub async fn cancel_stream(&self, session_id: &str) -> AiResult<()> {
        self.streams.cancel_session(session_id).await
    }

    pub async fn estimate_cost(
        &self,
        prompt_chars: usize,
        expected_response_chars: usize,
    ) -> AiResult<f64> {
        let providers = self.providers.read().await;
        providers.estimate_cost(prompt_chars, expected_response_chars)
    }

    // Workflow tracking

    pub fn start_workflow(&self, name: &str, parameters: Value) -> String {
        let run = WorkflowRun::new(name, parameters);
        let id = run.id.clone();
        let mut workflows = recover_lock(&self.workflows);
        workflows.insert(id.clone(), run);
        log::info!("Workflow {name} started ({id})");
        id
    }

    pub fn record_workflow_step(&self, id: &str, step: &str) -> AiResult<()> {
        let mut workflows = recover_lock(&self.workflows);
        let run = workflows
            .get_mut(id)
            .ok_or_else(|| AiError::InvalidConfig(format!("unknown workflow: {id}")))?;
        if run.status != WorkflowStatus::Running {
            return Err(AiError::InvalidConfig(format!(
                "workflow {id} is no longer running"
            )));
        }
        run.steps.push(step.to_string());
        Ok(())
    }

    pub fn complete_workflow(&self, id: &str, result: Value) -> AiResult<()> {
        self.finish_workflow(id, WorkflowStatus::Completed, Some(result), None)
    }

    pub fn fail_workflow(&self, id: &str, error: &str) -> AiResult<()> {
        self.finish_workflow(id, WorkflowStatus::Failed, None, Some(error.to_string()))
    }

    /// Transition a run out of Running exactly once
    fn finish_workflow(
        &self,
        id: &str,
        status: WorkflowStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> AiResult<()> {
        let mut workflows = recover_lock(&self.workflows);
        let run = workflows
            .get_mut(id)
            .ok_or_else(|| AiError::InvalidConfig(format!("unknown workflow: {id}")))?;
        if run.status != WorkflowStatus::Running {
            return Err(AiError::InvalidConfig(format!(
                "workflow {id} already finished"
            )));
        }
        run.status = status;
        run.result = result;
        run.error = error;
        Ok(())
    }

    pub fn workflow_run(&self, id: &str) -> Option<WorkflowRun> {
        let workflows = recover_lock(&self.workflows);
        workflows.get(id).cloned()
    }
}

fn recover_lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
