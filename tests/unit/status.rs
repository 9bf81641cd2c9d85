//! Unit tests for status composition and the condition builder
//!
//! Status objects are composed by pure functions, so the weight and step
//! invariants can be checked without a cluster.

use crate::common::{CanaryDeploymentBuilder, create_observed_canary, status_with};
use gateway_cd_operator::controller::status::{
    ConditionBuilder, condition_status, condition_types, failed_status, message_status,
    paused_status, pending_status, progressing_status, rolling_back_status, succeeded_status,
};
use gateway_cd_operator::crd::{AnalysisPhase, AnalysisRunStatus, CanaryPhase};

const THREE_STEPS: &[(i32, &str, bool)] = &[(10, "1s", false), (50, "1s", false), (100, "", false)];

mod condition_builder_tests {
    use super::*;

    #[test]
    fn test_new_condition_is_added() {
        let conditions = ConditionBuilder::new(Some(1))
            .progressing(true, "RolloutAdvancing", "moving")
            .build();

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, condition_types::PROGRESSING);
        assert_eq!(conditions[0].status, condition_status::TRUE);
        assert_eq!(conditions[0].observed_generation, Some(1));
    }

    #[test]
    fn test_unchanged_status_keeps_transition_time() {
        let first = ConditionBuilder::new(Some(1))
            .progressing(true, "RolloutAdvancing", "step 1")
            .build();
        let original_time = first[0].last_transition_time.clone();

        let second = ConditionBuilder::from_existing(first, Some(2))
            .progressing(true, "RolloutAdvancing", "step 2")
            .build();

        assert_eq!(second[0].last_transition_time, original_time);
        assert_eq!(second[0].message, "step 2");
        assert_eq!(second[0].observed_generation, Some(2));
    }

    #[test]
    fn test_flipped_status_bumps_transition_time() {
        let first = ConditionBuilder::new(None)
            .healthy(true, "AnalysisPassed", "ok")
            .build();

        let second = ConditionBuilder::from_existing(first.clone(), None)
            .healthy(false, "AnalysisFailed", "success rate too low")
            .build();

        assert_eq!(second[0].status, condition_status::FALSE);
        assert_eq!(second[0].reason, "AnalysisFailed");
    }

    #[test]
    fn test_multiple_condition_types_coexist() {
        let conditions = ConditionBuilder::new(None)
            .progressing(true, "RolloutAdvancing", "moving")
            .healthy(true, "AnalysisPassed", "ok")
            .complete(false, "InProgress", "not done")
            .build();

        assert_eq!(conditions.len(), 3);
    }
}

mod status_invariant_tests {
    use super::*;

    #[test]
    fn test_pending_status_shape() {
        let canary = CanaryDeploymentBuilder::new("fresh", "default")
            .with_step(100, None, false)
            .build();

        let status = pending_status(&canary);
        assert_eq!(status.phase, CanaryPhase::Pending);
        assert_eq!(status.current_step, 0);
        assert_eq!(status.canary_weight, 0);
        assert_eq!(status.stable_weight, 100);
        assert!(status.last_transition_time.is_some());
    }

    #[test]
    fn test_weights_always_sum_to_one_hundred() {
        let canary = create_observed_canary(
            "sum",
            "default",
            THREE_STEPS,
            CanaryPhase::Progressing,
            1,
            10,
        );

        for weight in [0, 10, 35, 99, 100] {
            let status = progressing_status(&canary, "advancing", 1, weight, None);
            assert_eq!(status.canary_weight + status.stable_weight, 100);

            let status = paused_status(&canary, "paused", 1, weight);
            assert_eq!(status.canary_weight + status.stable_weight, 100);

            let status = failed_status(&canary, "Failed", "failed", weight);
            assert_eq!(status.canary_weight + status.stable_weight, 100);
        }
    }

    #[test]
    fn test_succeeded_status_is_fully_promoted() {
        let canary = create_observed_canary(
            "done",
            "default",
            THREE_STEPS,
            CanaryPhase::Progressing,
            3,
            100,
        );

        let status = succeeded_status(&canary);
        assert_eq!(status.phase, CanaryPhase::Succeeded);
        assert_eq!(status.canary_weight, 100);
        assert_eq!(status.stable_weight, 0);
        assert_eq!(status.current_step, 3);

        let complete = status
            .conditions
            .iter()
            .find(|c| c.type_ == condition_types::COMPLETE)
            .unwrap();
        assert_eq!(complete.status, condition_status::TRUE);
    }

    #[test]
    fn test_rolling_back_keeps_enacted_weights() {
        let canary = create_observed_canary(
            "rb",
            "default",
            THREE_STEPS,
            CanaryPhase::Progressing,
            1,
            10,
        );

        let status = rolling_back_status(&canary, "Analysis failed, rolling back", 10, None);
        assert_eq!(status.phase, CanaryPhase::RollingBack);
        // The route still carries the canary weight until the reset lands
        assert_eq!(status.canary_weight, 10);
        assert_eq!(status.stable_weight, 90);
    }

    #[test]
    fn test_failed_after_rollback_is_fully_stable() {
        let canary = create_observed_canary(
            "failed",
            "default",
            THREE_STEPS,
            CanaryPhase::RollingBack,
            1,
            10,
        );

        let status = failed_status(&canary, "RollbackComplete", "Rollback completed", 0);
        assert_eq!(status.phase, CanaryPhase::Failed);
        assert_eq!(status.canary_weight, 0);
        assert_eq!(status.stable_weight, 100);
    }

    #[test]
    fn test_message_status_changes_nothing_but_message() {
        let canary = create_observed_canary(
            "transient",
            "default",
            THREE_STEPS,
            CanaryPhase::Progressing,
            1,
            10,
        );

        let status = message_status(&canary, "Failed to update traffic split: conflict");
        assert_eq!(status.phase, CanaryPhase::Progressing);
        assert_eq!(status.current_step, 1);
        assert_eq!(status.canary_weight, 10);
        assert_eq!(status.message, "Failed to update traffic split: conflict");
    }

    #[test]
    fn test_transition_time_preserved_within_phase() {
        let mut canary = create_observed_canary(
            "time",
            "default",
            THREE_STEPS,
            CanaryPhase::Progressing,
            1,
            10,
        );
        let stamp = "2026-08-01T00:00:00+00:00".to_string();
        canary.status.as_mut().unwrap().last_transition_time = Some(stamp.clone());

        // Progressing -> Progressing keeps the stamp
        let status = progressing_status(&canary, "advancing", 2, 50, None);
        assert_eq!(status.last_transition_time, Some(stamp.clone()));

        // Progressing -> Paused stamps a new time
        let status = paused_status(&canary, "paused", 1, 10);
        assert_ne!(status.last_transition_time, Some(stamp));
    }

    #[test]
    fn test_analysis_run_recorded_and_preserved() {
        let mut canary = create_observed_canary(
            "analysis",
            "default",
            THREE_STEPS,
            CanaryPhase::Progressing,
            1,
            10,
        );

        let run = AnalysisRunStatus {
            phase: AnalysisPhase::Successful,
            success_rate: 0.999,
            passed: true,
            ..Default::default()
        };

        let status = progressing_status(&canary, "advancing", 2, 50, Some(run.clone()));
        assert!(status.analysis_run.is_some());

        // A later write without a fresh verdict preserves the recorded run
        canary.status = Some(status);
        let status = progressing_status(&canary, "advancing", 3, 100, None);
        let recorded = status.analysis_run.unwrap();
        assert!(recorded.passed);
        assert!((recorded.success_rate - 0.999).abs() < f64::EPSILON);
    }

    #[test]
    fn test_paused_step_bounds() {
        let canary = create_observed_canary(
            "bounds",
            "default",
            THREE_STEPS,
            CanaryPhase::Progressing,
            0,
            0,
        );

        let status = paused_status(&canary, "Paused at step 1 for manual approval", 0, 10);
        assert!(status.current_step >= 0);
        assert!(status.current_step <= THREE_STEPS.len() as i32);
    }

    #[test]
    fn test_status_helper_weights_consistent() {
        let status = status_with(CanaryPhase::Paused, 1, 30);
        assert_eq!(status.canary_weight + status.stable_weight, 100);
    }
}
