//! Status and condition management for CanaryRollout.
//!
//! Conditions are the source of truth for the rollout lifecycle; the report
//! block is a flattened projection of them for kubectl columns.

use crate::crd::{
    CanaryRollout, CanaryRolloutStatus, RolloutCondition, RolloutConditionType, RolloutReport,
};
use crate::scale::ScaleStrategy;

/// Add or refresh a condition.
///
/// An existing condition of the same type is refreshed in place; its
/// transition timestamp only moves when the status actually flips. A
/// condition that was never recorded is only appended when it holds, so the
/// list never fills up with vacuous False entries.
pub fn set_condition(conditions: &mut Vec<RolloutCondition>, condition: RolloutCondition) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        let flipped = existing.status != condition.status;
        existing.status = condition.status;
        existing.message = condition.message;
        existing.last_update_time = condition.last_update_time;
        if flipped {
            existing.last_transition_time = condition.last_transition_time;
        }
    } else if condition.is_true() {
        conditions.push(condition);
    }
}

fn condition_is_true(status: &CanaryRolloutStatus, condition_type: RolloutConditionType) -> bool {
    status
        .conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .is_some_and(RolloutCondition::is_true)
}

/// Whether a validator invalidated the rollout (terminal).
pub fn is_failed(status: &CanaryRolloutStatus) -> bool {
    condition_is_true(status, RolloutConditionType::Failed)
}

/// Whether the rollout validated (terminal).
pub fn is_succeeded(status: &CanaryRolloutStatus) -> bool {
    condition_is_true(status, RolloutConditionType::Succeeded)
}

/// Whether the schedule gate already let the rollout through.
pub fn is_scheduled(status: &CanaryRolloutStatus) -> bool {
    condition_is_true(status, RolloutConditionType::Scheduled)
}

/// Whether the validation window is open.
pub fn is_running(status: &CanaryRolloutStatus) -> bool {
    condition_is_true(status, RolloutConditionType::Running)
}

/// Whether the rollout reached an end state, successful or not.
pub fn is_terminal(status: &CanaryRolloutStatus) -> bool {
    is_failed(status) || is_succeeded(status)
}

/// Coarse lifecycle label for the report, worst state first.
pub fn lifecycle_label(status: &CanaryRolloutStatus) -> &'static str {
    if is_failed(status) {
        "Failed"
    } else if is_succeeded(status) {
        "Succeeded"
    } else if is_running(status) {
        "Running"
    } else if is_scheduled(status) {
        "Scheduled"
    } else {
        "Created"
    }
}

/// Rebuild the flattened report from the spec and conditions.
pub fn build_report(rollout: &CanaryRollout, status: &CanaryRolloutStatus) -> RolloutReport {
    let validation = rollout
        .spec
        .validations
        .items
        .iter()
        .map(|item| item.kind())
        .collect::<Vec<_>>()
        .join(",");
    let scale = ScaleStrategy::from_spec(&rollout.spec.scale)
        .map(|s| s.kind())
        .unwrap_or("invalid");

    RolloutReport {
        status: lifecycle_label(status).to_string(),
        validation,
        scale: scale.to_string(),
        traffic: rollout.spec.traffic.source.to_string(),
    }
}

/// Whether two statuses differ in anything but refresh timestamps.
///
/// Guarding status writes with this keeps a steady-state rollout from
/// patching its own status on every pass, which would wake the controller
/// right back up.
pub fn status_changed(current: &CanaryRolloutStatus, desired: &CanaryRolloutStatus) -> bool {
    let strip = |status: &CanaryRolloutStatus| {
        let mut stripped = status.clone();
        for condition in &mut stripped.conditions {
            condition.last_update_time = None;
            condition.last_transition_time = None;
        }
        stripped
    };
    strip(current) != strip(desired)
}
