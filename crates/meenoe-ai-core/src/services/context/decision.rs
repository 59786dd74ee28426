// Decision Engine
//
// Deterministic heuristics over context snapshots. Every check is a pure
// function of the snapshot; the same snapshot always yields the same
// opportunities, in the same order.

use crate::models::context::{
    ActionAnalytics, AgendaAnalytics, ContextSnapshot, Opportunity, OpportunityKind, Priority,
};

/// Session must be at least this old before the empty-state nudge fires
const EMPTY_STATE_MIN_DURATION_MS: u64 = 30_000;

#[derive(Debug, Default)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run every check against the snapshot, in fixed order
    pub fn identify_opportunities(&self, snapshot: &ContextSnapshot) -> Vec<Opportunity> {
        [
            check_empty_state(snapshot),
            check_imbalance(snapshot),
            check_urgency(snapshot),
            check_completion(snapshot),
            check_workflow(snapshot),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn opportunity(
    kind: OpportunityKind,
    priority: Priority,
    reason: impl Into<String>,
    snapshot: &ContextSnapshot,
) -> Opportunity {
    Opportunity {
        kind,
        priority,
        reason: reason.into(),
        context: snapshot.clone(),
    }
}

/// A session past the grace period with no agenda or no actions
pub fn check_empty_state(snapshot: &ContextSnapshot) -> Option<Opportunity> {
    let session = &snapshot.session;
    if session.duration_ms <= EMPTY_STATE_MIN_DURATION_MS {
        return None;
    }
    if session.agenda.total_points == 0 || session.actions.total_actions == 0 {
        let missing = if session.agenda.total_points == 0 {
            "agenda points"
        } else {
            "actions"
        };
        return Some(opportunity(
            OpportunityKind::EmptyState,
            Priority::High,
            format!("This meeting has no {missing} yet"),
            snapshot,
        ));
    }
    None
}

/// Agenda-to-action ratio far from a workable shape
pub fn check_imbalance(snapshot: &ContextSnapshot) -> Option<Opportunity> {
    let agenda = snapshot.session.agenda.total_points;
    let actions = snapshot.session.actions.total_actions;
    if agenda == 0 {
        return None;
    }
    let ratio = f64::from(actions) / f64::from(agenda);
    if agenda > 2 && ratio < 0.5 {
        return Some(opportunity(
            OpportunityKind::ImbalanceDetection,
            Priority::Medium,
            format!("{agenda} agenda points but only {actions} actions; most points have no follow-up"),
            snapshot,
        ));
    }
    if ratio > 4.0 {
        return Some(opportunity(
            OpportunityKind::ImbalanceDetection,
            Priority::Low,
            format!("{actions} actions for {agenda} agenda points; consider consolidating"),
            snapshot,
        ));
    }
    None
}

/// Urgency distribution skewed to a single tier. Dominance is measured
/// against the whole agenda, not just the items carrying an urgency tag.
pub fn check_urgency(snapshot: &ContextSnapshot) -> Option<Opportunity> {
    let agenda = &snapshot.session.agenda;
    let total = agenda.total_points;
    let tagged: u32 = agenda.urgency_counts.values().sum();
    if total == 0 || tagged == 0 {
        return None;
    }

    // A lone tier covering the full agenda trivially dominates, so check it
    // before the dominance rule
    let used_tiers = agenda.urgency_counts.values().filter(|c| **c > 0).count();
    if used_tiers == 1 && tagged == total && total > 3 {
        return Some(opportunity(
            OpportunityKind::UrgencyAnalysis,
            Priority::Low,
            "All agenda points share one urgency tier; the ranking carries no signal",
            snapshot,
        ));
    }

    let mut tiers: Vec<(&String, &u32)> = agenda.urgency_counts.iter().collect();
    tiers.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    let (dominant_tier, dominant_count) = tiers[0];
    if dominant_count * 2 > total {
        return Some(opportunity(
            OpportunityKind::UrgencyAnalysis,
            Priority::Medium,
            format!("Most agenda points are marked {dominant_tier} urgency"),
            snapshot,
        ));
    }
    None
}

/// Actions missing owners or due dates
pub fn check_completion(snapshot: &ContextSnapshot) -> Option<Opportunity> {
    let actions = &snapshot.session.actions;
    if actions.total_actions < 3 {
        return None;
    }
    let total = f64::from(actions.total_actions);
    let unassigned = f64::from(actions.total_actions - actions.assigned_actions.min(actions.total_actions));
    if unassigned / total > 0.8 {
        return Some(opportunity(
            OpportunityKind::CompletionMonitoring,
            Priority::Medium,
            "Most actions have no assignee",
            snapshot,
        ));
    }
    if actions.total_actions >= 5 && f64::from(actions.actions_with_due_dates) / total < 0.2 {
        return Some(opportunity(
            OpportunityKind::CompletionMonitoring,
            Priority::Low,
            "Few actions have due dates",
            snapshot,
        ));
    }
    None
}

/// A structurally middling meeting that a workflow could tighten up
pub fn check_workflow(snapshot: &ContextSnapshot) -> Option<Opportunity> {
    let agenda = &snapshot.session.agenda;
    let actions = &snapshot.session.actions;
    if agenda.total_points <= 2 || actions.total_actions <= 1 {
        return None;
    }
    let score = structural_completeness(agenda, actions);
    if score > 60.0 && score < 90.0 {
        return Some(opportunity(
            OpportunityKind::WorkflowSuggestion,
            Priority::Low,
            format!("Meeting structure is {score:.0}% complete; a review pass could close the gaps"),
            snapshot,
        ));
    }
    None
}

/// Structural completeness score in [0, 100]:
/// action coverage of the agenda (40), assignee coverage (30), due-date
/// coverage (30).
pub fn structural_completeness(agenda: &AgendaAnalytics, actions: &ActionAnalytics) -> f64 {
    let coverage = if agenda.total_points == 0 {
        0.0
    } else {
        (f64::from(actions.total_actions) / f64::from(agenda.total_points)).min(1.0)
    };
    let (assigned, due) = if actions.total_actions == 0 {
        (0.0, 0.0)
    } else {
        let total = f64::from(actions.total_actions);
        (
            f64::from(actions.assigned_actions.min(actions.total_actions)) / total,
            f64::from(actions.actions_with_due_dates.min(actions.total_actions)) / total,
        )
    };
    coverage * 40.0 + assigned * 30.0 + due * 30.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::context::{ContextSnapshot, SessionContext};
    use crate::services::context::test_support::{actions_with, agenda_with};
    use std::collections::HashMap;

    fn snapshot(agenda: AgendaAnalytics, actions: ActionAnalytics, duration_ms: u64) -> ContextSnapshot {
        ContextSnapshot {
            session: SessionContext {
                state: "editing".to_string(),
                agenda,
                actions,
                duration_ms,
            },
            ..ContextSnapshot::default()
        }
    }

    #[test]
    fn test_empty_state_fires_after_grace_period() {
        let engine = DecisionEngine::new();
        let snap = snapshot(agenda_with(0), actions_with(0, 0, 0), 31_000);
        let found = engine.identify_opportunities(&snap);
        assert_eq!(found[0].kind, OpportunityKind::EmptyState);
        assert_eq!(found[0].priority, Priority::High);

        let early = snapshot(agenda_with(0), actions_with(0, 0, 0), 10_000);
        assert!(engine.identify_opportunities(&early).is_empty());
    }

    #[test]
    fn test_imbalance_too_few_actions() {
        let snap = snapshot(agenda_with(5), actions_with(1, 1, 1), 60_000);
        let opportunity = check_imbalance(&snap).unwrap();
        assert_eq!(opportunity.kind, OpportunityKind::ImbalanceDetection);
        assert_eq!(opportunity.priority, Priority::Medium);
    }

    #[test]
    fn test_imbalance_too_many_actions() {
        let snap = snapshot(agenda_with(2), actions_with(9, 9, 9), 60_000);
        let opportunity = check_imbalance(&snap).unwrap();
        assert_eq!(opportunity.priority, Priority::Low);
        assert!(opportunity.reason.contains("consolidat"));
    }

    #[test]
    fn test_imbalance_quiet_in_workable_range() {
        let snap = snapshot(agenda_with(4), actions_with(3, 3, 3), 60_000);
        assert!(check_imbalance(&snap).is_none());
    }

    #[test]
    fn test_urgency_dominant_tier() {
        let mut agenda = agenda_with(5);
        agenda.urgency_counts =
            HashMap::from([("high".to_string(), 4), ("low".to_string(), 1)]);
        let snap = snapshot(agenda, actions_with(4, 4, 4), 60_000);
        let opportunity = check_urgency(&snap).unwrap();
        assert_eq!(opportunity.priority, Priority::Medium);
        assert!(opportunity.reason.contains("high"));
    }

    #[test]
    fn test_urgency_single_tier_is_low_signal() {
        let mut agenda = agenda_with(5);
        agenda.urgency_counts = HashMap::from([("medium".to_string(), 5)]);
        let snap = snapshot(agenda, actions_with(4, 4, 4), 60_000);
        let opportunity = check_urgency(&snap).unwrap();
        assert_eq!(opportunity.priority, Priority::Low);
    }

    #[test]
    fn test_urgency_dominance_counts_untagged_items() {
        // 4 of 10 agenda points marked high is not a majority of the agenda,
        // even though it is a majority of the tagged items
        let mut agenda = agenda_with(10);
        agenda.urgency_counts =
            HashMap::from([("high".to_string(), 4), ("low".to_string(), 3)]);
        let snap = snapshot(agenda, actions_with(4, 4, 4), 60_000);
        assert!(check_urgency(&snap).is_none());

        // 4 of 6 is a majority of the whole agenda
        let mut agenda = agenda_with(6);
        agenda.urgency_counts =
            HashMap::from([("high".to_string(), 4), ("low".to_string(), 1)]);
        let snap = snapshot(agenda, actions_with(4, 4, 4), 60_000);
        assert_eq!(check_urgency(&snap).unwrap().priority, Priority::Medium);
    }

    #[test]
    fn test_urgency_lone_tier_on_partial_agenda_is_quiet() {
        let mut agenda = agenda_with(10);
        agenda.urgency_counts = HashMap::from([("high".to_string(), 5)]);
        let snap = snapshot(agenda, actions_with(4, 4, 4), 60_000);
        assert!(check_urgency(&snap).is_none());
    }

    #[test]
    fn test_urgency_even_spread_is_quiet() {
        let mut agenda = agenda_with(2);
        agenda.urgency_counts = HashMap::from([("medium".to_string(), 1), ("low".to_string(), 1)]);
        let snap = snapshot(agenda, actions_with(2, 2, 2), 60_000);
        assert!(check_urgency(&snap).is_none());
    }

    #[test]
    fn test_completion_unassigned_actions() {
        let snap = snapshot(agenda_with(4), actions_with(5, 0, 3), 60_000);
        let opportunity = check_completion(&snap).unwrap();
        assert_eq!(opportunity.kind, OpportunityKind::CompletionMonitoring);
        assert_eq!(opportunity.priority, Priority::Medium);
    }

    #[test]
    fn test_completion_missing_due_dates() {
        let snap = snapshot(agenda_with(4), actions_with(6, 6, 0), 60_000);
        let opportunity = check_completion(&snap).unwrap();
        assert_eq!(opportunity.priority, Priority::Low);
    }

    #[test]
    fn test_completion_requires_enough_actions() {
        let snap = snapshot(agenda_with(4), actions_with(2, 0, 0), 60_000);
        assert!(check_completion(&snap).is_none());
    }

    #[test]
    fn test_workflow_fires_in_middling_band() {
        // coverage 1.0 (40) + assigned 0.75 (22.5) + due 0.5 (15) = 77.5
        let snap = snapshot(agenda_with(4), actions_with(4, 3, 2), 60_000);
        let opportunity = check_workflow(&snap).unwrap();
        assert_eq!(opportunity.kind, OpportunityKind::WorkflowSuggestion);

        // Fully structured meeting scores 100; no suggestion
        let complete = snapshot(agenda_with(4), actions_with(4, 4, 4), 60_000);
        assert!(check_workflow(&complete).is_none());
    }

    #[test]
    fn test_structural_completeness_bounds() {
        assert_eq!(
            structural_completeness(&agenda_with(0), &actions_with(0, 0, 0)),
            0.0
        );
        assert_eq!(
            structural_completeness(&agenda_with(3), &actions_with(3, 3, 3)),
            100.0
        );
        // Coverage is capped, surplus actions cannot push past 40
        let score = structural_completeness(&agenda_with(1), &actions_with(10, 0, 0));
        assert!((score - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_same_snapshot_same_opportunities() {
        let engine = DecisionEngine::new();
        let snap = snapshot(agenda_with(5), actions_with(1, 1, 1), 60_000);
        let first = engine.identify_opportunities(&snap);
        let second = engine.identify_opportunities(&snap);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.priority, b.priority);
            assert_eq!(a.reason, b.reason);
        }
    }
}
