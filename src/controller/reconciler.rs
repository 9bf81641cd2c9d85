//! Reconciliation logic for CanaryDeployment resources
//!
//! A level-triggered control loop: each invocation reads the rollout,
//! dispatches on the status phase, performs at most one route mutation and
//! one status write, and returns a requeue decision. The rollout object is
//! the only state carried between invocations.

use std::sync::Arc;
use std::time::Duration;

use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::analysis::MetricsQuerier;
use crate::controller::context::{Context, FIELD_MANAGER};
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::intents::{self, Intent};
use crate::controller::state_machine::{RolloutEvent, TransitionContext, TransitionResult};
use crate::controller::status::StatusManager;
use crate::controller::validation::validate_spec;
use crate::crd::{CanaryDeployment, CanaryPhase};
use crate::resources::httproute;

/// Finalizer name for route cleanup on deletion
pub const FINALIZER: &str = "gateway-cd.io/finalizer";

/// Status message written when leaving Paused via the resume intent. The
/// next Progressing tick reads it back to tell a freshly reached pause
/// from one the author has already approved.
pub const RESUMED_MESSAGE: &str = "Resumed from pause";

/// Default backoff configuration for error handling
fn default_backoff() -> BackoffConfig {
    BackoffConfig::default()
}

/// Main reconciliation function
#[instrument(skip(canary, ctx), fields(name = %canary.name_any(), namespace = canary.namespace().unwrap_or_default()))]
pub async fn reconcile(canary: Arc<CanaryDeployment>, ctx: Arc<Context>) -> Result<Action> {
    let ns = canary.namespace().unwrap_or_default();
    let name = canary.name_any();
    let start = std::time::Instant::now();

    debug!("Reconciling CanaryDeployment");

    // Handle deletion
    if canary.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&canary, &ctx, &ns).await;
    }

    // Ensure finalizer is present so deletion runs route cleanup
    if !has_finalizer(&canary) {
        add_finalizer(&canary, &ctx, &ns).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let result = dispatch(&canary, &ctx, &ns).await;
    match &result {
        Ok(_) => ctx.record_reconcile(&ns, &name, start.elapsed().as_secs_f64()),
        Err(e) => {
            error!("Reconciliation failed: {}", e);
            ctx.record_error(&ns, &name);
        }
    }
    result
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(canary: Arc<CanaryDeployment>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = canary.name_any();
    let backoff = default_backoff();

    let delay = backoff.delay_for_error(error, 0);

    if error.is_retryable() {
        warn!(
            "Retryable error for {}: {:?}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}

/// Dispatch on the rollout phase
async fn dispatch(canary: &CanaryDeployment, ctx: &Context, ns: &str) -> Result<Action> {
    // First observation: claim the status and start the clock
    if canary.status.is_none() {
        let status_manager = StatusManager::new(canary, ctx, ns);
        status_manager.set_pending_initialized().await?;
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    let phase = canary.status.as_ref().map(|s| s.phase).unwrap_or_default();
    match phase {
        CanaryPhase::Pending => handle_pending(canary, ctx, ns).await,
        CanaryPhase::Progressing => handle_progressing(canary, ctx, ns).await,
        CanaryPhase::Paused => handle_paused(canary, ctx, ns).await,
        CanaryPhase::RollingBack => handle_rolling_back(canary, ctx, ns).await,
        // Terminal phases: nothing to do beyond the cached read
        CanaryPhase::Succeeded | CanaryPhase::Failed => Ok(Action::await_change()),
    }
}

/// Transition context derived from the observed rollout
fn transition_context(canary: &CanaryDeployment, analysis_passed: Option<bool>) -> TransitionContext {
    let status = canary.status.clone().unwrap_or_default();
    TransitionContext {
        current_step: status.current_step,
        total_steps: canary.spec.traffic_split.len() as i32,
        canary_weight: status.canary_weight,
        analysis_passed,
    }
}

/// Validate a proposed phase change against the transition table. A
/// rejected transition is an invariant violation, not a user error.
fn require_transition(
    ctx: &Context,
    current: CanaryPhase,
    event: RolloutEvent,
    tctx: &TransitionContext,
) -> Result<CanaryPhase> {
    match ctx.transitions.transition(&current, event, tctx) {
        TransitionResult::Success { to, description, .. } => {
            debug!(from = %current, to = %to, event = %event, "{}", description);
            Ok(to)
        }
        TransitionResult::GuardFailed { reason, .. } => Err(Error::InternalError(format!(
            "transition {} --{}--> rejected: {}",
            current, event, reason
        ))),
        TransitionResult::InvalidTransition { .. } => Err(Error::InternalError(format!(
            "no transition from {} on {}",
            current, event
        ))),
    }
}

/// Pending: validate the spec and the route, then start the rollout
async fn handle_pending(canary: &CanaryDeployment, ctx: &Context, ns: &str) -> Result<Action> {
    let status_manager = StatusManager::new(canary, ctx, ns);

    // Well-formedness plus route existence; the first mutation touches the
    // route, so its absence here is a validation failure, not a transient.
    let mut validation = validate_spec(canary);
    if validation.is_ok() && !httproute::route_exists(&ctx.client, canary).await? {
        validation = Err(Error::ValidationError(format!(
            "HTTPRoute {}/{} not found",
            canary.route_namespace(),
            canary.spec.gateway.http_route
        )));
    }

    if let Err(e) = validation {
        let detail = match &e {
            Error::ValidationError(msg) => msg.clone(),
            other => other.to_string(),
        };
        let message = format!("Validation failed: {}", detail);
        let tctx = transition_context(canary, None);
        require_transition(ctx, CanaryPhase::Pending, RolloutEvent::SpecRejected, &tctx)?;

        warn!("{}", message);
        ctx.publish_warning_event(canary, "ValidationFailed", "Validating", Some(message.clone()))
            .await;
        let weight = canary.status.as_ref().map(|s| s.canary_weight).unwrap_or(0);
        status_manager
            .set_failed("ValidationFailed", &message, weight)
            .await?;
        return Ok(Action::await_change());
    }

    let tctx = transition_context(canary, None);
    require_transition(ctx, CanaryPhase::Pending, RolloutEvent::SpecValidated, &tctx)?;

    info!("Starting canary rollout");
    ctx.publish_normal_event(canary, "RolloutStarted", "Progressing", None)
        .await;
    status_manager
        .set_progressing("Starting canary rollout", 0, 0, None)
        .await?;

    Ok(Action::requeue(Duration::from_secs(5)))
}

/// Progressing: enact the current step, analyze, advance
async fn handle_progressing(canary: &CanaryDeployment, ctx: &Context, ns: &str) -> Result<Action> {
    let status = canary.status.clone().unwrap_or_default();
    let steps = &canary.spec.traffic_split;
    let total_steps = steps.len() as i32;
    let status_manager = StatusManager::new(canary, ctx, ns);

    if status.current_step < 0 || status.current_step > total_steps {
        return Err(Error::InternalError(format!(
            "currentStep {} out of bounds 0-{}",
            status.current_step, total_steps
        )));
    }

    // All steps enacted: promote
    if status.current_step == total_steps {
        // The promote intent jumps here with the route still on an earlier
        // weight; enact full promotion before declaring success
        if status.canary_weight != 100 {
            if let Err(e) = httproute::update_traffic_split(&ctx.client, canary, 100).await {
                warn!("Failed to update traffic split: {}", e);
                status_manager
                    .record_message(&format!("Failed to update traffic split: {}", e))
                    .await?;
                return Ok(Action::requeue(Duration::from_secs(30)));
            }
            ctx.record_canary_weight(ns, &canary.name_any(), 100);
        }

        let tctx = transition_context(canary, None);
        require_transition(ctx, CanaryPhase::Progressing, RolloutEvent::StepsExhausted, &tctx)?;

        info!("Canary rollout completed successfully");
        ctx.publish_normal_event(canary, "RolloutSucceeded", "Promoting", None)
            .await;
        status_manager.set_succeeded().await?;
        return Ok(Action::await_change());
    }

    let step = steps[status.current_step as usize].clone();

    // A paused step has served its pause when the previous invocation was
    // the resume itself; resume leaves its marker in the engine-owned
    // message and does not advance the step.
    let pause_served = step.pause && status.message == RESUMED_MESSAGE;
    let forced_pause = intents::pending_for(canary, &[Intent::Pause]).is_some();

    if let Err(e) = httproute::update_traffic_split(&ctx.client, canary, step.weight).await {
        warn!("Failed to update traffic split: {}", e);
        status_manager
            .record_message(&format!("Failed to update traffic split: {}", e))
            .await?;
        return Ok(Action::requeue(Duration::from_secs(30)));
    }
    ctx.record_canary_weight(ns, &canary.name_any(), step.weight);

    if (step.pause && !pause_served) || forced_pause {
        let message = format!(
            "Paused at step {} for manual approval",
            status.current_step + 1
        );
        let tctx = transition_context(canary, None);
        require_transition(ctx, CanaryPhase::Progressing, RolloutEvent::PauseReached, &tctx)?;

        ctx.publish_normal_event(canary, "RolloutPaused", "Pausing", Some(message.clone()))
            .await;
        status_manager
            .set_paused(&message, status.current_step, step.weight)
            .await?;
        if forced_pause {
            intents::clear(&ctx.client, canary, Intent::Pause).await?;
        }
        return Ok(Action::await_change());
    }

    // Analysis runs immediately after a successful weight change on an
    // unpaused step, before the dwell timer is armed
    let verdict = if !pause_served && canary.analysis_enabled() {
        match &ctx.metrics_provider {
            Some(provider) => Some(provider.run_analysis(canary).await),
            None => {
                debug!("No metrics backend configured, skipping analysis");
                None
            }
        }
    } else {
        None
    };

    if let Some(v) = &verdict
        && !v.passed()
    {
        let message = format!("Analysis failed, rolling back: {}", v.reason());
        let tctx = transition_context(canary, Some(false));
        require_transition(ctx, CanaryPhase::Progressing, RolloutEvent::AnalysisFailed, &tctx)?;

        warn!("{}", message);
        ctx.publish_warning_event(canary, "AnalysisFailed", "RollingBack", Some(v.reason()))
            .await;
        status_manager
            .set_rolling_back(&message, step.weight, Some(v.run.clone()))
            .await?;
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    // Move to the next step
    let message = format!(
        "Traffic split updated: {}% canary, {}% stable",
        step.weight,
        100 - step.weight
    );
    status_manager
        .set_progressing(
            &message,
            status.current_step + 1,
            step.weight,
            verdict.map(|v| v.run),
        )
        .await?;

    // A served pause already dwelled while Paused
    let dwell = if pause_served {
        Duration::from_secs(5)
    } else {
        step.dwell()
    };
    Ok(Action::requeue(dwell))
}

/// Paused: wait for an author intent
async fn handle_paused(canary: &CanaryDeployment, ctx: &Context, ns: &str) -> Result<Action> {
    let status = canary.status.clone().unwrap_or_default();
    let total_steps = canary.spec.traffic_split.len() as i32;
    let status_manager = StatusManager::new(canary, ctx, ns);

    // Status is written before the annotation is cleared; a crash in
    // between replays an idempotent intent on the next invocation
    match intents::pending_for(canary, &[Intent::Abort, Intent::Promote, Intent::Resume]) {
        Some(Intent::Abort) => {
            let tctx = transition_context(canary, None);
            require_transition(ctx, CanaryPhase::Paused, RolloutEvent::AbortRequested, &tctx)?;

            info!("Rollout aborted by user");
            ctx.publish_warning_event(
                canary,
                "RolloutAborted",
                "RollingBack",
                Some("Aborted by user".to_string()),
            )
            .await;
            status_manager
                .set_rolling_back("Aborted by user", status.canary_weight, None)
                .await?;
            intents::clear(&ctx.client, canary, Intent::Abort).await?;
            Ok(Action::requeue(Duration::from_secs(5)))
        }
        Some(Intent::Promote) => {
            let tctx = transition_context(canary, None);
            require_transition(ctx, CanaryPhase::Paused, RolloutEvent::PromoteRequested, &tctx)?;

            let message = "Promotion requested, skipping remaining steps";
            info!("{}", message);
            ctx.publish_normal_event(canary, "RolloutPromoted", "Promoting", Some(message.to_string()))
                .await;
            status_manager
                .set_progressing(message, total_steps, status.canary_weight, None)
                .await?;
            intents::clear(&ctx.client, canary, Intent::Promote).await?;
            Ok(Action::requeue(Duration::ZERO))
        }
        Some(Intent::Resume) => {
            let tctx = transition_context(canary, None);
            require_transition(ctx, CanaryPhase::Paused, RolloutEvent::ResumeRequested, &tctx)?;

            info!("Rollout resumed from pause");
            ctx.publish_normal_event(canary, "RolloutResumed", "Progressing", None)
                .await;
            // The step is not advanced here; the next Progressing tick
            // detects the served pause and advances exactly once
            status_manager
                .set_progressing(RESUMED_MESSAGE, status.current_step, status.canary_weight, None)
                .await?;
            intents::clear(&ctx.client, canary, Intent::Resume).await?;
            Ok(Action::requeue(Duration::from_secs(5)))
        }
        _ => Ok(Action::requeue(Duration::from_secs(30))),
    }
}

/// RollingBack: return all traffic to the stable service, then fail
async fn handle_rolling_back(canary: &CanaryDeployment, ctx: &Context, ns: &str) -> Result<Action> {
    let status_manager = StatusManager::new(canary, ctx, ns);

    if let Err(e) = httproute::update_traffic_split(&ctx.client, canary, 0).await {
        warn!("Failed to roll back traffic split: {}", e);
        status_manager
            .record_message(&format!("Failed to roll back traffic split: {}", e))
            .await?;
        return Ok(Action::requeue(Duration::from_secs(10)));
    }
    ctx.record_canary_weight(ns, &canary.name_any(), 0);

    let mut tctx = transition_context(canary, None);
    // The reset has been enacted on the route
    tctx.canary_weight = 0;
    require_transition(ctx, CanaryPhase::RollingBack, RolloutEvent::RollbackSucceeded, &tctx)?;

    info!("Rollback completed");
    ctx.publish_normal_event(canary, "RollbackCompleted", "RollingBack", None)
        .await;
    status_manager
        .set_failed("RollbackComplete", "Rollback completed", 0)
        .await?;
    Ok(Action::await_change())
}

/// Handle deletion of the CanaryDeployment
async fn handle_deletion(canary: &CanaryDeployment, ctx: &Context, ns: &str) -> Result<Action> {
    let name = canary.name_any();
    info!("Handling deletion of {}", name);

    // Return all traffic to the stable service before letting go
    httproute::cleanup(&ctx.client, canary).await?;

    if has_finalizer(canary) {
        let api: Api<CanaryDeployment> = Api::namespaced(ctx.client.clone(), ns);

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": null
            }
        });

        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        info!("Removed finalizer from {}", name);
    }

    Ok(Action::await_change())
}

/// Check if the finalizer is present
fn has_finalizer(canary: &CanaryDeployment) -> bool {
    canary
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.contains(&FINALIZER.to_string()))
}

/// Add the finalizer to the resource
async fn add_finalizer(canary: &CanaryDeployment, ctx: &Context, ns: &str) -> Result<()> {
    let api: Api<CanaryDeployment> = Api::namespaced(ctx.client.clone(), ns);
    let name = canary.name_any();

    let patch = serde_json::json!({
        "metadata": {
            "finalizers": [FINALIZER]
        }
    });

    api.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;

    info!("Added finalizer to {}", name);
    Ok(())
}
