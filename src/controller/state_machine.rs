//! Formal finite state machine for the CanaryDeployment lifecycle
//!
//! The phase graph is kept as a flat transition table with explicit guards.
//! Handlers in the reconciler propose an event; the table decides whether
//! the transition is legal for the current phase, which keeps every phase
//! change auditable and makes illegal transitions an internal error rather
//! than a silent status overwrite.

use std::fmt;

use crate::crd::CanaryPhase;

/// Events that trigger phase transitions in the rollout lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RolloutEvent {
    /// The spec passed the Pending validation gate
    SpecValidated,
    /// The spec failed the Pending validation gate
    SpecRejected,
    /// Every traffic-split step has been enacted
    StepsExhausted,
    /// The current step requires a manual approval hold
    PauseReached,
    /// The analyzer returned a failing verdict
    AnalysisFailed,
    /// Author asked to continue from a pause
    ResumeRequested,
    /// Author asked to jump past all remaining steps
    PromoteRequested,
    /// Author asked to abandon the rollout
    AbortRequested,
    /// Traffic has been fully returned to the stable service
    RollbackSucceeded,
}

impl fmt::Display for RolloutEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloutEvent::SpecValidated => write!(f, "SpecValidated"),
            RolloutEvent::SpecRejected => write!(f, "SpecRejected"),
            RolloutEvent::StepsExhausted => write!(f, "StepsExhausted"),
            RolloutEvent::PauseReached => write!(f, "PauseReached"),
            RolloutEvent::AnalysisFailed => write!(f, "AnalysisFailed"),
            RolloutEvent::ResumeRequested => write!(f, "ResumeRequested"),
            RolloutEvent::PromoteRequested => write!(f, "PromoteRequested"),
            RolloutEvent::AbortRequested => write!(f, "AbortRequested"),
            RolloutEvent::RollbackSucceeded => write!(f, "RollbackSucceeded"),
        }
    }
}

/// Context information available during state transitions
#[derive(Debug, Clone)]
pub struct TransitionContext {
    /// Index of the step being processed
    pub current_step: i32,
    /// Number of steps in the traffic split
    pub total_steps: i32,
    /// Canary weight the route currently carries
    pub canary_weight: i32,
    /// Verdict of the analysis run in this invocation, if one ran
    pub analysis_passed: Option<bool>,
}

impl TransitionContext {
    /// Create a new transition context
    pub fn new(current_step: i32, total_steps: i32, canary_weight: i32) -> Self {
        Self {
            current_step,
            total_steps,
            canary_weight,
            analysis_passed: None,
        }
    }

    /// Check if every step has been enacted
    pub fn steps_exhausted(&self) -> bool {
        self.current_step >= self.total_steps
    }
}

/// A state transition definition with optional guard
#[derive(Debug)]
pub struct Transition {
    /// Source phase
    pub from: CanaryPhase,
    /// Target phase
    pub to: CanaryPhase,
    /// Event that triggers this transition
    pub event: RolloutEvent,
    /// Human-readable description of this transition
    pub description: &'static str,
}

impl Transition {
    const fn new(
        from: CanaryPhase,
        to: CanaryPhase,
        event: RolloutEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

/// Result of attempting a state transition
#[derive(Debug)]
pub enum TransitionResult {
    /// Transition was successful
    Success {
        from: CanaryPhase,
        to: CanaryPhase,
        event: RolloutEvent,
        description: &'static str,
    },
    /// Transition was not valid for current phase
    InvalidTransition {
        current: CanaryPhase,
        event: RolloutEvent,
    },
    /// Guard condition prevented the transition
    GuardFailed {
        from: CanaryPhase,
        to: CanaryPhase,
        event: RolloutEvent,
        reason: String,
    },
}

/// Formal state machine for the rollout lifecycle
pub struct RolloutStateMachine {
    transitions: Vec<Transition>,
}

impl Default for RolloutStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RolloutStateMachine {
    /// Create a new state machine with the defined transition table
    pub fn new() -> Self {
        Self {
            transitions: vec![
                // === Pending ===
                Transition::new(
                    CanaryPhase::Pending,
                    CanaryPhase::Progressing,
                    RolloutEvent::SpecValidated,
                    "Spec validated, starting rollout",
                ),
                Transition::new(
                    CanaryPhase::Pending,
                    CanaryPhase::Failed,
                    RolloutEvent::SpecRejected,
                    "Spec rejected by validation",
                ),
                // === Progressing ===
                Transition::new(
                    CanaryPhase::Progressing,
                    CanaryPhase::Succeeded,
                    RolloutEvent::StepsExhausted,
                    "All steps enacted, canary promoted",
                ),
                Transition::new(
                    CanaryPhase::Progressing,
                    CanaryPhase::Paused,
                    RolloutEvent::PauseReached,
                    "Holding for manual approval",
                ),
                Transition::new(
                    CanaryPhase::Progressing,
                    CanaryPhase::RollingBack,
                    RolloutEvent::AnalysisFailed,
                    "Analysis failed, rolling back",
                ),
                // === Paused ===
                Transition::new(
                    CanaryPhase::Paused,
                    CanaryPhase::Progressing,
                    RolloutEvent::ResumeRequested,
                    "Resumed from pause",
                ),
                Transition::new(
                    CanaryPhase::Paused,
                    CanaryPhase::Progressing,
                    RolloutEvent::PromoteRequested,
                    "Promotion requested, skipping remaining steps",
                ),
                Transition::new(
                    CanaryPhase::Paused,
                    CanaryPhase::RollingBack,
                    RolloutEvent::AbortRequested,
                    "Aborted by user",
                ),
                // === RollingBack ===
                Transition::new(
                    CanaryPhase::RollingBack,
                    CanaryPhase::Failed,
                    RolloutEvent::RollbackSucceeded,
                    "Rollback completed",
                ),
                // === Succeeded / Failed are terminal ===
            ],
        }
    }

    /// Attempt to transition to a new phase based on an event
    pub fn transition(
        &self,
        current: &CanaryPhase,
        event: RolloutEvent,
        ctx: &TransitionContext,
    ) -> TransitionResult {
        let transition = self
            .transitions
            .iter()
            .find(|t| t.from == *current && t.event == event);

        match transition {
            Some(t) => {
                if let Some(reason) = self.check_guard(t, ctx) {
                    TransitionResult::GuardFailed {
                        from: t.from,
                        to: t.to,
                        event,
                        reason,
                    }
                } else {
                    TransitionResult::Success {
                        from: t.from,
                        to: t.to,
                        event,
                        description: t.description,
                    }
                }
            }
            None => TransitionResult::InvalidTransition {
                current: *current,
                event,
            },
        }
    }

    /// Check if a transition is valid (ignoring guards)
    pub fn can_transition(&self, from: &CanaryPhase, event: &RolloutEvent) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == *from && t.event == *event)
    }

    /// Get all valid events for a given phase
    pub fn valid_events(&self, phase: &CanaryPhase) -> Vec<&RolloutEvent> {
        self.transitions
            .iter()
            .filter(|t| t.from == *phase)
            .map(|t| &t.event)
            .collect()
    }

    /// Check guard conditions for a transition
    fn check_guard(&self, transition: &Transition, ctx: &TransitionContext) -> Option<String> {
        match (&transition.to, &transition.event) {
            // Guard: promotion to Succeeded requires every step enacted
            (CanaryPhase::Succeeded, RolloutEvent::StepsExhausted) => {
                if !ctx.steps_exhausted() {
                    Some(format!(
                        "Steps not exhausted: {}/{}",
                        ctx.current_step, ctx.total_steps
                    ))
                } else {
                    None
                }
            }
            // Guard: a failing verdict must actually exist
            (CanaryPhase::RollingBack, RolloutEvent::AnalysisFailed) => {
                match ctx.analysis_passed {
                    Some(false) => None,
                    _ => Some("No failing analysis verdict recorded".to_string()),
                }
            }
            // Guard: Failed-after-rollback requires the route fully reset
            (CanaryPhase::Failed, RolloutEvent::RollbackSucceeded) => {
                if ctx.canary_weight != 0 {
                    Some(format!(
                        "Canary weight is {}, rollback not enacted",
                        ctx.canary_weight
                    ))
                } else {
                    None
                }
            }
            // No guard for other transitions
            _ => None,
        }
    }
}
