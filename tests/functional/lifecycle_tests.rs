//! Lifecycle decision tests: schedule gate, defaulting, conditions and the
//! status report.

use std::time::Duration;

use kanary_operator::controller::scheduler::{
    ScheduleGate, evaluate_schedule, schedule_condition_message,
};
use kanary_operator::controller::spec_validation::validate_spec;
use kanary_operator::controller::status::{
    build_report, is_scheduled, is_terminal, lifecycle_label, set_condition, status_changed,
};
use kanary_operator::crd::defaulting::{default_spec, is_defaulted};
use kanary_operator::crd::{
    CanaryRolloutStatus, RolloutCondition, RolloutConditionType, TrafficSource,
};

use crate::fixtures::{reference_time, rollout_with_traffic};

// ============================================================================
// Schedule gate
// ============================================================================

#[test]
fn test_unscheduled_rollout_starts_immediately() {
    assert_eq!(
        evaluate_schedule(None, false, reference_time()),
        ScheduleGate::Ready
    );
}

#[test]
fn test_scheduled_rollout_waits_then_fires() {
    let now = reference_time();
    let schedule = (now + chrono::Duration::minutes(10)).to_rfc3339();

    // Ten minutes early: wait exactly until the schedule.
    assert_eq!(
        evaluate_schedule(Some(&schedule), false, now),
        ScheduleGate::Wait(Duration::from_secs(600))
    );

    // At the scheduled instant: go.
    assert_eq!(
        evaluate_schedule(Some(&schedule), false, now + chrono::Duration::minutes(10)),
        ScheduleGate::Ready
    );

    // Thirty seconds late is still inside the grace period.
    let late = now + chrono::Duration::minutes(10) + chrono::Duration::seconds(30);
    assert_eq!(
        evaluate_schedule(Some(&schedule), false, late),
        ScheduleGate::Ready
    );
}

#[test]
fn test_future_schedule_records_scheduled_before_the_wait() {
    let now = reference_time();
    let schedule = (now + chrono::Duration::seconds(30)).to_rfc3339();

    // The gate asks to wait, but the rollout is accepted right away: the
    // Scheduled condition carries the start instant while the wait runs.
    assert!(matches!(
        evaluate_schedule(Some(&schedule), false, now),
        ScheduleGate::Wait(_)
    ));

    let before = CanaryRolloutStatus::default();
    let mut after = before.clone();
    set_condition(
        &mut after.conditions,
        RolloutCondition::new(
            RolloutConditionType::Scheduled,
            true,
            &schedule_condition_message(Some(&schedule)),
        ),
    );
    assert!(is_scheduled(&after));
    assert_eq!(after.conditions[0].message, schedule);
    // A new condition is a real change, so the pass persists it.
    assert!(status_changed(&before, &after));
}

#[test]
fn test_scheduled_message_distinguishes_immediate_starts() {
    assert_eq!(schedule_condition_message(None), "on the fly");
    let schedule = "2026-03-01T12:30:00+00:00";
    assert_eq!(schedule_condition_message(Some(schedule)), schedule);
}

#[test]
fn test_missed_schedule_never_fires() {
    let now = reference_time();
    let schedule = (now - chrono::Duration::minutes(10)).to_rfc3339();
    assert!(matches!(
        evaluate_schedule(Some(&schedule), false, now),
        ScheduleGate::Rejected(_)
    ));
}

#[test]
fn test_operator_restart_does_not_reject_a_started_rollout() {
    // Once the Scheduled condition is recorded, the stale schedule string in
    // the spec must not reject the rollout on a later pass.
    let now = reference_time();
    let schedule = (now - chrono::Duration::hours(2)).to_rfc3339();
    assert_eq!(
        evaluate_schedule(Some(&schedule), true, now),
        ScheduleGate::Ready
    );
}

// ============================================================================
// Defaulting and spec validation
// ============================================================================

#[test]
fn test_fixture_spec_is_valid_and_defaulted() {
    let rollout = rollout_with_traffic("crr", TrafficSource::Both);
    assert!(validate_spec(&rollout.spec).is_ok());

    let defaulted = default_spec(&rollout.spec);
    assert!(is_defaulted(&defaulted));
}

#[test]
fn test_defaulting_then_validation_accepts_bare_scale() {
    let mut rollout = rollout_with_traffic("crr", TrafficSource::None);
    rollout.spec.scale = Default::default();

    let defaulted = default_spec(&rollout.spec);
    assert_eq!(defaulted.scale.static_.as_ref().unwrap().replicas, Some(1));
    assert!(validate_spec(&defaulted).is_ok());
}

#[test]
fn test_validation_rejects_rollout_without_validators() {
    let mut rollout = rollout_with_traffic("crr", TrafficSource::None);
    rollout.spec.validations.items.clear();
    assert!(validate_spec(&rollout.spec).is_err());
}

#[test]
fn test_config_error_is_terminal_not_retried() {
    // A spec only the user can fix must end the rollout, not keep it in a
    // retry loop behind the Errored condition.
    let mut rollout = rollout_with_traffic("crr", TrafficSource::None);
    rollout.spec.validations.items.clear();
    let err = validate_spec(&rollout.spec).expect_err("invalid spec");
    assert!(!err.is_retryable());

    let mut status = CanaryRolloutStatus::default();
    set_condition(
        &mut status.conditions,
        RolloutCondition::new(RolloutConditionType::Failed, true, &err.to_string()),
    );
    assert!(is_terminal(&status));
    assert_eq!(lifecycle_label(&status), "Failed");
    assert!(status.conditions[0].message.contains("validations.items"));
}

// ============================================================================
// Conditions and the report
// ============================================================================

fn running_status() -> CanaryRolloutStatus {
    let mut status = CanaryRolloutStatus::default();
    set_condition(
        &mut status.conditions,
        RolloutCondition::new(RolloutConditionType::Scheduled, true, "on the fly"),
    );
    set_condition(
        &mut status.conditions,
        RolloutCondition::new(RolloutConditionType::Running, true, "validation window open"),
    );
    status
}

#[test]
fn test_condition_progression_to_success() {
    let mut status = running_status();
    assert!(is_scheduled(&status));
    assert_eq!(lifecycle_label(&status), "Running");

    set_condition(
        &mut status.conditions,
        RolloutCondition::new(RolloutConditionType::Succeeded, true, "rollout validated"),
    );
    assert_eq!(lifecycle_label(&status), "Succeeded");
    assert!(is_terminal(&status));
}

#[test]
fn test_failure_outranks_every_other_condition() {
    let mut status = running_status();
    set_condition(
        &mut status.conditions,
        RolloutCondition::new(RolloutConditionType::Failed, true, "manual.status=invalid"),
    );
    set_condition(
        &mut status.conditions,
        RolloutCondition::new(RolloutConditionType::Succeeded, true, "should not matter"),
    );
    assert_eq!(lifecycle_label(&status), "Failed");
}

#[test]
fn test_report_projection_for_kubectl_columns() {
    let rollout = rollout_with_traffic("crr", TrafficSource::KanaryService);
    let report = build_report(&rollout, &running_status());
    assert_eq!(report.status, "Running");
    assert_eq!(report.scale, "static");
    assert_eq!(report.traffic, "kanary-service");
    assert_eq!(report.validation, "manual");
}

#[test]
fn test_condition_refresh_does_not_trigger_a_status_write() {
    let before = running_status();
    let mut after = before.clone();
    // A later pass refreshes the same conditions with new timestamps.
    set_condition(
        &mut after.conditions,
        RolloutCondition::new(RolloutConditionType::Running, true, "validation window open"),
    );
    assert!(!status_changed(&before, &after));

    set_condition(
        &mut after.conditions,
        RolloutCondition::new(RolloutConditionType::Failed, true, "promQL reported issue"),
    );
    assert!(status_changed(&before, &after));
}
