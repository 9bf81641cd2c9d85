//! Status and conditions management for CanaryDeployment resources
//!
//! Status objects are composed by pure functions so the weight and step
//! invariants can be tested without a cluster; `StatusManager` only adds
//! the write to the status subresource.

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};

use crate::controller::Context;
use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::Result;
use crate::crd::{
    AnalysisRunStatus, CanaryDeployment, CanaryDeploymentStatus, CanaryPhase, Condition,
};

/// Standard condition types following Kubernetes conventions
pub mod condition_types {
    /// Rollout is progressing towards full promotion
    pub const PROGRESSING: &str = "Progressing";
    /// The canary passed its most recent analysis
    pub const HEALTHY: &str = "Healthy";
    /// The rollout reached a terminal outcome
    pub const COMPLETE: &str = "Complete";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
}

impl ConditionBuilder {
    /// Create a new condition builder
    pub fn new(generation: Option<i64>) -> Self {
        Self {
            conditions: Vec::new(),
            generation,
        }
    }

    /// Create from existing conditions
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        let now = Utc::now().to_rfc3339();

        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            // Only bump the transition time when the boolean status flips
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = now;
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
                observed_generation: self.generation,
            });
        }
        self
    }

    /// Set the Progressing condition
    pub fn progressing(self, is_progressing: bool, reason: &str, message: &str) -> Self {
        let status = if is_progressing {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        };
        self.set_condition(condition_types::PROGRESSING, status, reason, message)
    }

    /// Set the Healthy condition
    pub fn healthy(self, is_healthy: bool, reason: &str, message: &str) -> Self {
        let status = if is_healthy {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        };
        self.set_condition(condition_types::HEALTHY, status, reason, message)
    }

    /// Set the Complete condition
    pub fn complete(self, is_complete: bool, reason: &str, message: &str) -> Self {
        let status = if is_complete {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        };
        self.set_condition(condition_types::COMPLETE, status, reason, message)
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

fn existing_status(canary: &CanaryDeployment) -> CanaryDeploymentStatus {
    canary.status.clone().unwrap_or_default()
}

fn existing_conditions(canary: &CanaryDeployment) -> Vec<Condition> {
    canary
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default()
}

/// Timestamp for the phase about to be written: preserved when the phase is
/// unchanged, stamped now when it differs.
fn transition_time(canary: &CanaryDeployment, new_phase: CanaryPhase) -> Option<String> {
    let current = canary.status.as_ref().map(|s| s.phase);
    let existing = canary
        .status
        .as_ref()
        .and_then(|s| s.last_transition_time.clone());

    if current == Some(new_phase) && existing.is_some() {
        existing
    } else {
        Some(Utc::now().to_rfc3339())
    }
}

/// Initial status for a freshly observed rollout.
pub fn pending_status(canary: &CanaryDeployment) -> CanaryDeploymentStatus {
    let generation = canary.metadata.generation;
    let conditions = ConditionBuilder::from_existing(existing_conditions(canary), generation)
        .progressing(false, "Initialized", "Rollout observed, awaiting validation")
        .complete(false, "NotStarted", "Rollout has not started")
        .build();

    CanaryDeploymentStatus {
        phase: CanaryPhase::Pending,
        message: "Initialized".to_string(),
        current_step: 0,
        canary_weight: 0,
        stable_weight: 100,
        conditions,
        last_transition_time: transition_time(canary, CanaryPhase::Pending),
        analysis_run: None,
    }
}

/// Status for an advancing rollout. `analysis` replaces the recorded run
/// when present and preserves the previous one otherwise.
pub fn progressing_status(
    canary: &CanaryDeployment,
    message: &str,
    current_step: i32,
    canary_weight: i32,
    analysis: Option<AnalysisRunStatus>,
) -> CanaryDeploymentStatus {
    let generation = canary.metadata.generation;
    let prior = existing_status(canary);

    let mut builder = ConditionBuilder::from_existing(existing_conditions(canary), generation)
        .progressing(true, "RolloutAdvancing", message)
        .complete(false, "InProgress", "Rollout in progress");
    if let Some(run) = &analysis {
        let reason = if run.passed {
            "AnalysisPassed"
        } else {
            "AnalysisFailed"
        };
        builder = builder.healthy(run.passed, reason, message);
    }

    CanaryDeploymentStatus {
        phase: CanaryPhase::Progressing,
        message: message.to_string(),
        current_step,
        canary_weight,
        stable_weight: 100 - canary_weight,
        conditions: builder.build(),
        last_transition_time: transition_time(canary, CanaryPhase::Progressing),
        analysis_run: analysis.or(prior.analysis_run),
    }
}

/// Status for a rollout holding at a step for manual approval.
pub fn paused_status(
    canary: &CanaryDeployment,
    message: &str,
    current_step: i32,
    canary_weight: i32,
) -> CanaryDeploymentStatus {
    let generation = canary.metadata.generation;
    let prior = existing_status(canary);
    let conditions = ConditionBuilder::from_existing(existing_conditions(canary), generation)
        .progressing(false, "AwaitingApproval", message)
        .complete(false, "InProgress", "Rollout paused")
        .build();

    CanaryDeploymentStatus {
        phase: CanaryPhase::Paused,
        message: message.to_string(),
        current_step,
        canary_weight,
        stable_weight: 100 - canary_weight,
        conditions,
        last_transition_time: transition_time(canary, CanaryPhase::Paused),
        analysis_run: prior.analysis_run,
    }
}

/// Status for a rollout returning traffic to the stable service. The
/// caller states the weight the route still carries until the reset lands.
pub fn rolling_back_status(
    canary: &CanaryDeployment,
    message: &str,
    canary_weight: i32,
    analysis: Option<AnalysisRunStatus>,
) -> CanaryDeploymentStatus {
    let generation = canary.metadata.generation;
    let prior = existing_status(canary);
    let conditions = ConditionBuilder::from_existing(existing_conditions(canary), generation)
        .progressing(true, "RollingBack", message)
        .healthy(false, "RollbackInitiated", message)
        .complete(false, "RollingBack", message)
        .build();

    CanaryDeploymentStatus {
        phase: CanaryPhase::RollingBack,
        message: message.to_string(),
        current_step: prior.current_step,
        canary_weight,
        stable_weight: 100 - canary_weight,
        conditions,
        last_transition_time: transition_time(canary, CanaryPhase::RollingBack),
        analysis_run: analysis.or(prior.analysis_run),
    }
}

/// Status for a fully promoted rollout.
pub fn succeeded_status(canary: &CanaryDeployment) -> CanaryDeploymentStatus {
    let generation = canary.metadata.generation;
    let prior = existing_status(canary);
    let total_steps = canary.spec.traffic_split.len() as i32;
    let message = "Canary deployment completed successfully";

    let conditions = ConditionBuilder::from_existing(existing_conditions(canary), generation)
        .progressing(false, "Promoted", message)
        .complete(true, "Promoted", message)
        .build();

    CanaryDeploymentStatus {
        phase: CanaryPhase::Succeeded,
        message: message.to_string(),
        current_step: total_steps,
        canary_weight: 100,
        stable_weight: 0,
        conditions,
        last_transition_time: transition_time(canary, CanaryPhase::Succeeded),
        analysis_run: prior.analysis_run,
    }
}

/// Status for a failed rollout. The caller states the weights the route
/// actually carries (0/100 after a rollback, unchanged after a rejected spec).
pub fn failed_status(
    canary: &CanaryDeployment,
    reason: &str,
    message: &str,
    canary_weight: i32,
) -> CanaryDeploymentStatus {
    let generation = canary.metadata.generation;
    let prior = existing_status(canary);
    let conditions = ConditionBuilder::from_existing(existing_conditions(canary), generation)
        .progressing(false, reason, message)
        .complete(false, reason, message)
        .build();

    CanaryDeploymentStatus {
        phase: CanaryPhase::Failed,
        message: message.to_string(),
        current_step: prior.current_step,
        canary_weight,
        stable_weight: 100 - canary_weight,
        conditions,
        last_transition_time: transition_time(canary, CanaryPhase::Failed),
        analysis_run: prior.analysis_run,
    }
}

/// Status carrying a new message with no phase change, for transient errors.
pub fn message_status(canary: &CanaryDeployment, message: &str) -> CanaryDeploymentStatus {
    let mut status = existing_status(canary);
    status.message = message.to_string();
    status
}

/// Status manager for CanaryDeployment resources
pub struct StatusManager<'a> {
    canary: &'a CanaryDeployment,
    ctx: &'a Context,
    ns: &'a str,
}

impl<'a> StatusManager<'a> {
    /// Create a new status manager
    pub fn new(canary: &'a CanaryDeployment, ctx: &'a Context, ns: &'a str) -> Self {
        Self { canary, ctx, ns }
    }

    /// Write a full status object to the status subresource
    pub async fn update(&self, status: CanaryDeploymentStatus) -> Result<()> {
        let api: Api<CanaryDeployment> = Api::namespaced(self.ctx.client.clone(), self.ns);
        let name = self.canary.name_any();

        let patch = serde_json::json!({
            "status": status
        });

        api.patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        Ok(())
    }

    /// Initialize status on first observation
    pub async fn set_pending_initialized(&self) -> Result<()> {
        self.update(pending_status(self.canary)).await
    }

    /// Record an advancing rollout
    pub async fn set_progressing(
        &self,
        message: &str,
        current_step: i32,
        canary_weight: i32,
        analysis: Option<AnalysisRunStatus>,
    ) -> Result<()> {
        self.update(progressing_status(
            self.canary,
            message,
            current_step,
            canary_weight,
            analysis,
        ))
        .await
    }

    /// Record a manual-approval hold
    pub async fn set_paused(
        &self,
        message: &str,
        current_step: i32,
        canary_weight: i32,
    ) -> Result<()> {
        self.update(paused_status(self.canary, message, current_step, canary_weight))
            .await
    }

    /// Record the start of a rollback
    pub async fn set_rolling_back(
        &self,
        message: &str,
        canary_weight: i32,
        analysis: Option<AnalysisRunStatus>,
    ) -> Result<()> {
        self.update(rolling_back_status(self.canary, message, canary_weight, analysis))
            .await
    }

    /// Record full promotion
    pub async fn set_succeeded(&self) -> Result<()> {
        self.update(succeeded_status(self.canary)).await
    }

    /// Record a terminal failure
    pub async fn set_failed(&self, reason: &str, message: &str, canary_weight: i32) -> Result<()> {
        self.update(failed_status(self.canary, reason, message, canary_weight))
            .await
    }

    /// Record a transient error without changing phase or weights
    pub async fn record_message(&self, message: &str) -> Result<()> {
        self.update(message_status(self.canary, message)).await
    }
}
