//! Wait condition helpers for CanaryDeployment resources

use kube::Api;
use kube::runtime::wait::{Condition, await_condition};
use std::time::Duration;
use thiserror::Error;

use gateway_cd_operator::crd::{CanaryDeployment, CanaryPhase};

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("Timeout waiting for condition")]
    Timeout,

    #[error("Watch error: {0}")]
    Watch(#[from] kube::runtime::wait::Error),
}

/// Condition that checks if the rollout is in a specific phase
pub fn is_phase(expected: CanaryPhase) -> impl Condition<CanaryDeployment> {
    move |obj: Option<&CanaryDeployment>| {
        obj.and_then(|canary| canary.status.as_ref())
            .map(|status| status.phase == expected)
            .unwrap_or(false)
    }
}

/// Condition that checks if the enacted canary weight matches
pub fn has_canary_weight(expected: i32) -> impl Condition<CanaryDeployment> {
    move |obj: Option<&CanaryDeployment>| {
        obj.and_then(|canary| canary.status.as_ref())
            .map(|status| status.canary_weight == expected)
            .unwrap_or(false)
    }
}

/// Condition that checks if the status message contains a substring
pub fn has_message_containing(expected: &str) -> impl Condition<CanaryDeployment> {
    let expected = expected.to_string();
    move |obj: Option<&CanaryDeployment>| {
        obj.and_then(|canary| canary.status.as_ref())
            .map(|status| status.message.contains(&expected))
            .unwrap_or(false)
    }
}

/// Condition that checks an annotation has been consumed
pub fn annotation_absent(key: &str) -> impl Condition<CanaryDeployment> {
    let key = key.to_string();
    move |obj: Option<&CanaryDeployment>| {
        obj.map(|canary| {
            canary
                .metadata
                .annotations
                .as_ref()
                .is_none_or(|ann| !ann.contains_key(&key))
        })
        .unwrap_or(false)
    }
}

/// Wait for a condition on a rollout, with a timeout
pub async fn wait_for(
    api: &Api<CanaryDeployment>,
    name: &str,
    condition: impl Condition<CanaryDeployment>,
    timeout: Duration,
) -> Result<(), WaitError> {
    tokio::time::timeout(timeout, await_condition(api.clone(), name, condition))
        .await
        .map_err(|_| WaitError::Timeout)??;
    Ok(())
}
