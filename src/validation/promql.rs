//! Metric-query validation: anomalous canary pods fail the rollout.

use kube::{Client, ResourceExt};

use crate::anomaly::AnomalyDetector;
use crate::controller::error::Result;
use crate::crd::{CanaryRollout, PromQLValidation};
use crate::resources::deployment::canary_pod_selector;
use crate::validation::{DeadlineStatus, ValidationResult};

/// Comment recorded when the detector reports anomalous pods.
pub const ANOMALY_COMMENT: &str = "promQL reported issue";

/// Pure decision over the detector's verdict.
pub fn evaluate(out_of_bounds_pods: &[String], deadline: &DeadlineStatus) -> ValidationResult {
    if !out_of_bounds_pods.is_empty() {
        return ValidationResult {
            is_failed: true,
            comment: format!("{}: {}", ANOMALY_COMMENT, out_of_bounds_pods.join(",")),
            ..Default::default()
        };
    }

    if deadline.reached {
        ValidationResult {
            need_update_deployment: true,
            ..Default::default()
        }
    } else {
        ValidationResult {
            requeue_after: Some(deadline.remaining),
            ..Default::default()
        }
    }
}

/// Run one detection pass against the canary pods.
///
/// The detector is rebuilt from the probe configuration on every pass; it
/// carries no state between reconciles.
pub async fn validate(
    config: &PromQLValidation,
    client: &Client,
    rollout: &CanaryRollout,
    deadline: &DeadlineStatus,
) -> Result<ValidationResult> {
    let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());
    let selector = canary_pod_selector(&rollout.name_any());
    let detector = AnomalyDetector::from_validation(config, &namespace, &selector)?;
    let out_of_bounds = detector.get_pods_out_of_bounds(client).await?;
    Ok(evaluate(&out_of_bounds, deadline))
}
