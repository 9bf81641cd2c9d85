//! Unit tests for the annotation intent channel

use crate::common::CanaryDeploymentBuilder;
use gateway_cd_operator::controller::intents::{Intent, pending_for};

#[test]
fn test_abort_beats_everything() {
    let canary = CanaryDeploymentBuilder::new("contended", "default")
        .with_step(100, None, false)
        .with_annotation("gateway-cd.io/resume", "true")
        .with_annotation("gateway-cd.io/promote", "true")
        .with_annotation("gateway-cd.io/abort", "true")
        .build();

    let honored = [Intent::Abort, Intent::Promote, Intent::Resume];
    assert_eq!(pending_for(&canary, &honored), Some(Intent::Abort));
}

#[test]
fn test_promote_beats_resume() {
    let canary = CanaryDeploymentBuilder::new("contended", "default")
        .with_step(100, None, false)
        .with_annotation("gateway-cd.io/resume", "true")
        .with_annotation("gateway-cd.io/promote", "true")
        .build();

    let honored = [Intent::Abort, Intent::Promote, Intent::Resume];
    assert_eq!(pending_for(&canary, &honored), Some(Intent::Promote));
}

#[test]
fn test_resume_not_honored_in_progressing() {
    // The Progressing handler only honors pause; a resume annotation set on
    // a non-Paused rollout is left alone for the next Paused entry
    let canary = CanaryDeploymentBuilder::new("progressing", "default")
        .with_step(100, None, false)
        .with_annotation("gateway-cd.io/resume", "true")
        .build();

    assert_eq!(pending_for(&canary, &[Intent::Pause]), None);
}

#[test]
fn test_pause_honored_in_progressing() {
    let canary = CanaryDeploymentBuilder::new("progressing", "default")
        .with_step(100, None, false)
        .with_annotation("gateway-cd.io/pause", "true")
        .build();

    assert_eq!(pending_for(&canary, &[Intent::Pause]), Some(Intent::Pause));
}

#[test]
fn test_no_annotations_means_no_intent() {
    let canary = CanaryDeploymentBuilder::new("quiet", "default")
        .with_step(100, None, false)
        .build();

    let honored = [Intent::Abort, Intent::Promote, Intent::Resume, Intent::Pause];
    assert_eq!(pending_for(&canary, &honored), None);
}

#[test]
fn test_unrelated_annotations_are_ignored() {
    let canary = CanaryDeploymentBuilder::new("noisy", "default")
        .with_step(100, None, false)
        .with_annotation("kubectl.kubernetes.io/last-applied-configuration", "{}")
        .with_annotation("gateway-cd.io/owner", "team-checkout")
        .build();

    let honored = [Intent::Abort, Intent::Promote, Intent::Resume, Intent::Pause];
    assert_eq!(pending_for(&canary, &honored), None);
}
