//! Manual validation: a human sets the verdict on the rollout spec.

use crate::crd::{ManualDeadlineStatus, ManualStatus, ManualValidation};
use crate::validation::{DeadlineStatus, ValidationResult};

/// Comment recorded when the explicit status invalidates the rollout.
pub const INVALID_STATUS_COMMENT: &str = "manual.status=invalid";

/// Comment recorded when the deadline verdict invalidates the rollout.
pub const INVALID_DEADLINE_COMMENT: &str = "manual.statusAfterDeadline=invalid";

/// Evaluate the manual gate.
///
/// An explicit `status` always wins; the `statusAfterDeadline` verdict only
/// applies once the window has closed. While waiting, the validator asks to
/// be consulted again at the deadline.
pub fn evaluate(config: &ManualValidation, deadline: &DeadlineStatus) -> ValidationResult {
    match config.status {
        Some(ManualStatus::Valid) => {
            return ValidationResult {
                need_update_deployment: true,
                force_success_now: true,
                ..Default::default()
            };
        }
        Some(ManualStatus::Invalid) => {
            return ValidationResult {
                is_failed: true,
                comment: INVALID_STATUS_COMMENT.to_string(),
                ..Default::default()
            };
        }
        None => {}
    }

    if deadline.reached {
        match config.status_after_deadline {
            ManualDeadlineStatus::Valid => ValidationResult {
                need_update_deployment: true,
                ..Default::default()
            },
            ManualDeadlineStatus::Invalid => ValidationResult {
                is_failed: true,
                comment: INVALID_DEADLINE_COMMENT.to_string(),
                ..Default::default()
            },
            // No verdict configured: keep the window open.
            ManualDeadlineStatus::None => ValidationResult::default(),
        }
    } else {
        ValidationResult {
            requeue_after: Some(deadline.remaining),
            ..Default::default()
        }
    }
}
