//! Validator verdict and aggregation tests: the decisions that promote or
//! invalidate a rollout.

use std::collections::BTreeMap;
use std::time::Duration;

use kanary_operator::crd::{
    LabelWatchValidation, ManualDeadlineStatus, ManualStatus, ManualValidation,
};
use kanary_operator::validation::{
    clamp_requeue, compute_status, deadline_status, label_watch, manual, promql,
};

use crate::fixtures::{closed_deadline, open_deadline, reference_time};

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Full-window scenarios
// ============================================================================

/// A rollout with a deadline-valid manual gate promotes once the window
/// closes, and only then.
#[test]
fn test_happy_path_reaches_promotion() {
    let config = ManualValidation {
        status: None,
        status_after_deadline: ManualDeadlineStatus::Valid,
    };

    // Mid-window: the validator only asks to come back at the deadline.
    let mid = compute_status(&[manual::evaluate(&config, &open_deadline(Duration::from_secs(300)))]);
    assert!(mid.failure_message.is_none());
    assert!(!mid.need_update);
    assert_eq!(mid.requeue_after, Some(Duration::from_secs(300)));

    // Window closed: unanimous need_update, no forced success.
    let done = compute_status(&[manual::evaluate(&config, &closed_deadline())]);
    assert!(done.failure_message.is_none());
    assert!(done.need_update);
    assert!(!done.force_success);
}

/// An explicit manual approval promotes before the deadline.
#[test]
fn test_early_manual_approval_short_circuits_the_window() {
    let config = ManualValidation {
        status: Some(ManualStatus::Valid),
        status_after_deadline: ManualDeadlineStatus::None,
    };
    let aggregated =
        compute_status(&[manual::evaluate(&config, &open_deadline(Duration::from_secs(600)))]);
    assert!(aggregated.force_success);
    assert!(aggregated.need_update);
}

/// An invalidation from any validator fails the rollout even when another
/// validator approved it.
#[test]
fn test_one_invalidation_fails_a_multi_validator_rollout() {
    let approved = manual::evaluate(
        &ManualValidation {
            status: Some(ManualStatus::Valid),
            status_after_deadline: ManualDeadlineStatus::None,
        },
        &open_deadline(Duration::from_secs(60)),
    );
    let watch_config = LabelWatchValidation {
        deployment_invalidation_labels: Some(labels(&[("rollback", "true")])),
        pod_invalidation_labels: None,
    };
    let invalidated = label_watch::evaluate(
        &watch_config,
        Some(&labels(&[("rollback", "true")])),
        &[],
        &open_deadline(Duration::from_secs(60)),
    );

    let aggregated = compute_status(&[approved, invalidated]);
    assert_eq!(
        aggregated.failure_message.as_deref(),
        Some(label_watch::INVALIDATION_COMMENT)
    );
    assert!(!aggregated.force_success);
    assert!(!aggregated.need_update);
}

/// Promotion needs every validator on board: one validator still waiting
/// holds the rollout open.
#[test]
fn test_promotion_waits_for_every_validator() {
    let done = manual::evaluate(
        &ManualValidation {
            status: None,
            status_after_deadline: ManualDeadlineStatus::Valid,
        },
        &closed_deadline(),
    );
    // A second gate with no deadline verdict keeps waiting.
    let waiting = manual::evaluate(&ManualValidation::default(), &closed_deadline());

    let aggregated = compute_status(&[done, waiting]);
    assert!(aggregated.failure_message.is_none());
    assert!(!aggregated.need_update);
}

// ============================================================================
// promQL verdicts
// ============================================================================

#[test]
fn test_anomalous_pods_invalidate_the_rollout() {
    let result = promql::evaluate(
        &["web-kanary-abc".to_string()],
        &open_deadline(Duration::from_secs(120)),
    );
    let aggregated = compute_status(&[result]);
    let message = aggregated.failure_message.expect("failure");
    assert!(message.starts_with(promql::ANOMALY_COMMENT));
    assert!(message.contains("web-kanary-abc"));
}

#[test]
fn test_clean_metrics_promote_at_the_deadline() {
    let aggregated = compute_status(&[promql::evaluate(&[], &closed_deadline())]);
    assert!(aggregated.need_update);
    assert!(!aggregated.force_success);
}

// ============================================================================
// Requeue cadence
// ============================================================================

/// The reconcile cadence follows the smallest validator request, capped by
/// the interval ceiling.
#[test]
fn test_requeue_cadence_is_min_then_clamped() {
    let slow = promql::evaluate(&[], &open_deadline(Duration::from_secs(600)));
    let fast = manual::evaluate(
        &ManualValidation::default(),
        &open_deadline(Duration::from_secs(45)),
    );
    let aggregated = compute_status(&[slow, fast]);
    assert_eq!(aggregated.requeue_after, Some(Duration::from_secs(45)));

    let clamped = clamp_requeue(
        aggregated.requeue_after.unwrap(),
        Duration::from_secs(20),
    );
    assert_eq!(clamped, Duration::from_secs(20));
}

#[test]
fn test_deadline_math_over_the_window() {
    let created = reference_time();
    let period = Duration::from_secs(900);

    let early = deadline_status(created, period, created + chrono::Duration::seconds(60));
    assert!(!early.reached);
    assert_eq!(early.remaining, Duration::from_secs(840));

    let exact = deadline_status(created, period, created + chrono::Duration::seconds(900));
    assert!(exact.reached);
    assert_eq!(exact.remaining, Duration::ZERO);

    let late = deadline_status(created, period, created + chrono::Duration::seconds(1200));
    assert!(late.reached);
}
