// Context Awareness Engine
//
// Samples application state into immutable snapshots and keeps a short
// interaction log so the decision engine has something to reason about.

pub mod decision;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::models::context::{
    ActionAnalytics, ActivityLevel, AgendaAnalytics, ContextSnapshot, HistoricalContext,
    ImmediateContext, SessionContext, UserBehaviorSummary, UserInteraction,
};
use crate::services::ai::error::AiResult;

/// Snapshots retained for trend detection
const SNAPSHOT_HISTORY: usize = 50;

/// Interactions retained for behavior summaries
const INTERACTION_LOG: usize = 200;

/// Interactions inside this window drive the activity level
const ACTIVITY_WINDOW_SECS: i64 = 300;

const HIGH_ACTIVITY_THRESHOLD: usize = 20;
const MODERATE_ACTIVITY_THRESHOLD: usize = 5;

/// Integration seam to the host application's live state
pub trait StateProvider: Send + Sync {
    fn immediate_context(&self) -> ImmediateContext;
    fn session_state(&self) -> String;
    fn session_duration_ms(&self) -> u64;
    fn agenda_analytics(&self) -> AiResult<AgendaAnalytics>;
    fn action_analytics(&self) -> AiResult<ActionAnalytics>;
}

pub struct ContextAwarenessEngine {
    provider: Arc<dyn StateProvider>,
    monitoring: AtomicBool,
    history: Mutex<VecDeque<ContextSnapshot>>,
    interactions: Mutex<VecDeque<UserInteraction>>,
}

impl ContextAwarenessEngine {
    pub fn new(provider: Arc<dyn StateProvider>) -> Self {
        Self {
            provider,
            monitoring: AtomicBool::new(false),
            history: Mutex::new(VecDeque::new()),
            interactions: Mutex::new(VecDeque::new()),
        }
    }

    pub fn start_monitoring(&self) {
        self.monitoring.store(true, Ordering::SeqCst);
        log::info!("Context monitoring started");
    }

    pub fn stop_monitoring(&self) {
        self.monitoring.store(false, Ordering::SeqCst);
        log::info!("Context monitoring stopped");
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    pub fn record_interaction(&self, interaction: UserInteraction) {
        let mut log = match self.interactions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        log.push_back(interaction);
        while log.len() > INTERACTION_LOG {
            log.pop_front();
        }
    }

    /// Take a snapshot in response to a state change. Returns None while
    /// monitoring is stopped; the history is untouched in that case.
    pub fn on_state_change(&self) -> Option<ContextSnapshot> {
        if !self.is_monitoring() {
            return None;
        }
        let snapshot = self.build_snapshot();
        let mut history = match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        history.push_back(snapshot.clone());
        while history.len() > SNAPSHOT_HISTORY {
            history.pop_front();
        }
        Some(snapshot)
    }

    pub fn latest_snapshot(&self) -> Option<ContextSnapshot> {
        let history = match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        history.back().cloned()
    }

    /// Assemble a snapshot from the provider. Analytics failures degrade to
    /// zeroed figures rather than losing the whole snapshot.
    fn build_snapshot(&self) -> ContextSnapshot {
        let agenda = self.provider.agenda_analytics().unwrap_or_else(|e| {
            log::warn!("Agenda analytics unavailable: {e}");
            AgendaAnalytics::zeroed()
        });
        let actions = self.provider.action_analytics().unwrap_or_else(|e| {
            log::warn!("Action analytics unavailable: {e}");
            ActionAnalytics::zeroed()
        });

        let session = SessionContext {
            state: self.provider.session_state(),
            agenda,
            actions,
            duration_ms: self.provider.session_duration_ms(),
        };

        ContextSnapshot {
            immediate: self.provider.immediate_context(),
            historical: HistoricalContext {
                patterns: self.detect_patterns(),
                trends: self.detect_trends(&session),
                user_behavior: self.summarize_behavior(),
            },
            session,
            timestamp: Utc::now(),
        }
    }

    /// Compare against the previous snapshot for growth trends
    fn detect_trends(&self, session: &SessionContext) -> Vec<String> {
        let history = match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(previous) = history.back() else {
            return Vec::new();
        };
        let mut trends = Vec::new();
        if session.agenda.total_points > previous.session.agenda.total_points {
            trends.push("agenda_expanding".to_string());
        }
        if session.actions.total_actions > previous.session.actions.total_actions {
            trends.push("actions_expanding".to_string());
        }
        trends
    }

    /// Flag interaction kinds that recur heavily in the log
    fn detect_patterns(&self) -> Vec<String> {
        let log = match self.interactions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for interaction in log.iter() {
            *counts.entry(interaction.kind.as_str()).or_default() += 1;
        }
        let mut patterns: Vec<String> = counts
            .into_iter()
            .filter(|(_, count)| *count >= 10)
            .map(|(kind, _)| format!("recurring_{kind}"))
            .collect();
        patterns.sort();
        patterns
    }

    fn summarize_behavior(&self) -> UserBehaviorSummary {
        let log = match self.interactions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let cutoff = Utc::now() - Duration::seconds(ACTIVITY_WINDOW_SECS);
        let recent = log.iter().filter(|i| i.timestamp > cutoff).count();
        let activity_level = if recent >= HIGH_ACTIVITY_THRESHOLD {
            ActivityLevel::High
        } else if recent >= MODERATE_ACTIVITY_THRESHOLD {
            ActivityLevel::Moderate
        } else {
            ActivityLevel::Low
        };

        let mut target_counts: HashMap<&str, usize> = HashMap::new();
        for interaction in log.iter() {
            if let Some(ref target) = interaction.target {
                *target_counts.entry(target.as_str()).or_default() += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = target_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let focus_areas = ranked
            .into_iter()
            .take(3)
            .map(|(target, _)| target.to_string())
            .collect();

        UserBehaviorSummary {
            activity_level,
            focus_areas,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::services::ai::error::AiError;
    use std::sync::Mutex;

    /// Fixed-state provider for engine and orchestrator tests
    pub struct FixedStateProvider {
        pub state: String,
        pub duration_ms: u64,
        pub agenda: Mutex<AgendaAnalytics>,
        pub actions: Mutex<ActionAnalytics>,
        pub fail_analytics: bool,
    }

    impl FixedStateProvider {
        pub fn new(agenda: AgendaAnalytics, actions: ActionAnalytics, duration_ms: u64) -> Self {
            Self {
                state: "editing".to_string(),
                duration_ms,
                agenda: Mutex::new(agenda),
                actions: Mutex::new(actions),
                fail_analytics: false,
            }
        }

        pub fn set_agenda(&self, agenda: AgendaAnalytics) {
            *self.agenda.lock().unwrap() = agenda;
        }
    }

    impl StateProvider for FixedStateProvider {
        fn immediate_context(&self) -> ImmediateContext {
            ImmediateContext {
                active_tab: Some("agenda".to_string()),
                selected_items: Vec::new(),
                user_focus: None,
            }
        }

        fn session_state(&self) -> String {
            self.state.clone()
        }

        fn session_duration_ms(&self) -> u64 {
            self.duration_ms
        }

        fn agenda_analytics(&self) -> AiResult<AgendaAnalytics> {
            if self.fail_analytics {
                return Err(AiError::Provider("analytics backend down".to_string()));
            }
            Ok(self.agenda.lock().unwrap().clone())
        }

        fn action_analytics(&self) -> AiResult<ActionAnalytics> {
            if self.fail_analytics {
                return Err(AiError::Provider("analytics backend down".to_string()));
            }
            Ok(self.actions.lock().unwrap().clone())
        }
    }

    pub fn agenda_with(total: u32) -> AgendaAnalytics {
        AgendaAnalytics {
            total_points: total,
            urgency_counts: HashMap::new(),
        }
    }

    pub fn actions_with(total: u32, assigned: u32, due: u32) -> ActionAnalytics {
        ActionAnalytics {
            total_actions: total,
            assigned_actions: assigned,
            actions_with_due_dates: due,
            completed_actions: 0,
        }
    }
}
