// Context, decision, and assistant event models

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Agenda-side analytics sampled from the application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaAnalytics {
    pub total_points: u32,
    /// Count of agenda items per urgency tier ("low", "medium", "high", ...)
    pub urgency_counts: HashMap<String, u32>,
}

impl AgendaAnalytics {
    /// Fallback shape used when the integration layer fails to answer
    pub fn zeroed() -> Self {
        Self::default()
    }
}

/// Action-side analytics sampled from the application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAnalytics {
    pub total_actions: u32,
    pub assigned_actions: u32,
    pub actions_with_due_dates: u32,
    pub completed_actions: u32,
}

impl ActionAnalytics {
    pub fn zeroed() -> Self {
        Self::default()
    }
}

/// What the user is looking at right now
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmediateContext {
    pub active_tab: Option<String>,
    pub selected_items: Vec<String>,
    pub user_focus: Option<String>,
}

/// Current session state and analytics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub state: String,
    pub agenda: AgendaAnalytics,
    pub actions: ActionAnalytics,
    pub duration_ms: u64,
}

/// Coarse interaction intensity over the recent window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBehaviorSummary {
    pub activity_level: ActivityLevel,
    pub focus_areas: Vec<String>,
}

impl Default for UserBehaviorSummary {
    fn default() -> Self {
        Self {
            activity_level: ActivityLevel::Low,
            focus_areas: Vec::new(),
        }
    }
}

/// Longer-horizon signals derived from snapshot history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalContext {
    pub patterns: Vec<String>,
    pub trends: Vec<String>,
    pub user_behavior: UserBehaviorSummary,
}

/// Point-in-time summary of application state; immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub immediate: ImmediateContext,
    pub session: SessionContext,
    pub historical: HistoricalContext,
    pub timestamp: DateTime<Utc>,
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            immediate: ImmediateContext::default(),
            session: SessionContext::default(),
            historical: HistoricalContext::default(),
            timestamp: Utc::now(),
        }
    }
}

/// A single recorded user interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInteraction {
    /// Interaction kind, e.g. "click", "edit", "navigate"
    pub kind: String,
    /// What was interacted with, e.g. "agenda", "actions"
    pub target: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UserInteraction {
    pub fn new(kind: impl Into<String>, target: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            target,
            timestamp: Utc::now(),
        }
    }
}

/// Proactive-assistance trigger kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    EmptyState,
    ImbalanceDetection,
    UrgencyAnalysis,
    CompletionMonitoring,
    WorkflowSuggestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// A heuristically detected assistance opportunity; produced fresh each pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub kind: OpportunityKind,
    pub priority: Priority,
    pub reason: String,
    /// Snapshot the heuristic fired against
    pub context: ContextSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

/// One launched workflow; transitions running -> completed|failed exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: String,
    pub name: String,
    pub parameters: serde_json::Value,
    pub status: WorkflowStatus,
    pub start_time: DateTime<Utc>,
    /// Ordered step names, recorded as the workflow progresses
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowRun {
    pub fn new(name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            id: format!("run_{}", Uuid::new_v4().simple()),
            name: name.into(),
            parameters,
            status: WorkflowStatus::Running,
            start_time: Utc::now(),
            steps: Vec::new(),
            result: None,
            error: None,
        }
    }
}

/// User-facing failure categories emitted by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    RateLimited,
    NeedsConfiguration,
    Retry,
}

/// Events delivered to the consumer (the UI layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AssistantEvent {
    /// One incremental text fragment on the streaming path
    Token { session_id: String, token: String },
    /// Full reply text once delivery finishes
    Complete { session_id: String, content: String },
    /// Mapped failure; `open_settings` asks the UI to surface configuration
    Error {
        session_id: String,
        category: ErrorCategory,
        message: String,
        open_settings: bool,
    },
    /// Stream cancelled by the user; distinct from an error
    Stopped { session_id: String },
    /// Proactive suggestion from the decision engine
    Suggestion { opportunity: Opportunity },
}

/// Assistant configuration accepted by the orchestrator.
/// Persistence is the consumer's job; the core only consumes this object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantSettings {
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub enable_proactive_assistance: bool,
    pub enable_streaming: bool,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: None,
            base_url: None,
            model: None,
            enable_proactive_assistance: true,
            enable_streaming: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_run_starts_running() {
        let run = WorkflowRun::new("summarize", serde_json::json!({"depth": 2}));
        assert!(run.id.starts_with("run_"));
        assert_eq!(run.status, WorkflowStatus::Running);
        assert!(run.steps.is_empty());
        assert!(run.result.is_none());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = AssistantEvent::Token {
            session_id: "s1".to_string(),
            token: "hi".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "token");
        assert_eq!(json["sessionId"], "s1");
    }
}
