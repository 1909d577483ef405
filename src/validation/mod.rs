//! Validation strategies and verdict aggregation.
//!
//! Each validator inspects the canary over the validation window and returns
//! a [`ValidationResult`]. The reconciler aggregates the results with
//! [`compute_status`]: a failure always wins, a forced success never
//! overrides a failure, and the primary is only rolled when every validator
//! agrees it should be.

pub mod label_watch;
pub mod manual;
pub mod promql;

use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use kube::Client;

use crate::controller::error::{Error, Result};
use crate::crd::{CanaryRollout, ValidationSpec};

/// Verdict of a single validator for one reconcile pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationResult {
    /// The validator invalidated the rollout (terminal).
    pub is_failed: bool,
    /// The validator considers the canary proven and the primary updatable.
    pub need_update_deployment: bool,
    /// The validator succeeded ahead of the deadline (e.g. manual approval).
    pub force_success_now: bool,
    /// Delay until this validator wants to be consulted again.
    pub requeue_after: Option<Duration>,
    /// Human-readable explanation, surfaced in conditions on failure.
    pub comment: String,
}

/// Aggregation of every validator's verdict.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregatedStatus {
    /// Set when any validator failed; carries its comment.
    pub failure_message: Option<String>,
    /// Any validator forced an early success.
    pub force_success: bool,
    /// Every validator agreed the primary should be updated.
    pub need_update: bool,
    /// Minimum requeue delay requested across validators.
    pub requeue_after: Option<Duration>,
}

/// Aggregate validator results.
///
/// A failure wins over everything, including a later forced success. The
/// primary is rolled only when all validators report
/// `need_update_deployment`.
pub fn compute_status(results: &[ValidationResult]) -> AggregatedStatus {
    let mut aggregated = AggregatedStatus::default();

    for result in results {
        if result.is_failed && aggregated.failure_message.is_none() {
            aggregated.failure_message = Some(if result.comment.is_empty() {
                "unknown failure".to_string()
            } else {
                result.comment.clone()
            });
        }
        if let Some(requeue) = result.requeue_after {
            aggregated.requeue_after = Some(match aggregated.requeue_after {
                Some(current) => current.min(requeue),
                None => requeue,
            });
        }
    }

    if aggregated.failure_message.is_none() {
        aggregated.force_success = results.iter().any(|r| r.force_success_now);
        aggregated.need_update =
            !results.is_empty() && results.iter().all(|r| r.need_update_deployment);
    }

    aggregated
}

/// Position of "now" relative to the validation deadline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeadlineStatus {
    /// End of the validation window.
    pub deadline: DateTime<Utc>,
    /// Whether the window has closed.
    pub reached: bool,
    /// Time left until the deadline (zero once reached).
    pub remaining: Duration,
}

/// Shared deadline math over the validation window.
///
/// The window opens at the canary's creation instant and closes
/// `validation_period` later.
pub fn deadline_status(
    canary_created_at: DateTime<Utc>,
    validation_period: Duration,
    now: DateTime<Utc>,
) -> DeadlineStatus {
    let deadline = canary_created_at
        + chrono::Duration::from_std(validation_period).unwrap_or_else(|_| chrono::Duration::zero());
    let reached = now >= deadline;
    let remaining = if reached {
        Duration::ZERO
    } else {
        (deadline - now).to_std().unwrap_or(Duration::ZERO)
    };
    DeadlineStatus {
        deadline,
        reached,
        remaining,
    }
}

/// Cap a requeue delay by the configured interval ceiling.
pub fn clamp_requeue(remaining: Duration, max_interval: Duration) -> Duration {
    if max_interval > Duration::ZERO {
        remaining.min(max_interval)
    } else {
        remaining
    }
}

/// One configured validator, ready to run.
pub enum Validator {
    Manual(crate::crd::ManualValidation),
    LabelWatch(crate::crd::LabelWatchValidation),
    PromQL(crate::crd::PromQLValidation),
}

impl Validator {
    /// Build a validator from one item of `spec.validations.items`.
    pub fn from_spec(spec: &ValidationSpec) -> Result<Self> {
        if let Some(manual) = spec.manual.as_ref() {
            Ok(Validator::Manual(manual.clone()))
        } else if let Some(label_watch) = spec.label_watch.as_ref() {
            Ok(Validator::LabelWatch(label_watch.clone()))
        } else if let Some(prom_ql) = spec.prom_ql.as_ref() {
            Ok(Validator::PromQL(prom_ql.clone()))
        } else {
            Err(Error::Validation(
                "validation item carries no validator (manual, labelWatch or promQL)".to_string(),
            ))
        }
    }

    /// Run the validator for one reconcile pass.
    pub async fn validate(
        &self,
        client: &Client,
        rollout: &CanaryRollout,
        canary: &Deployment,
        deadline: &DeadlineStatus,
    ) -> Result<ValidationResult> {
        match self {
            Validator::Manual(config) => Ok(manual::evaluate(config, deadline)),
            Validator::LabelWatch(config) => {
                label_watch::validate(config, client, rollout, canary, deadline).await
            }
            Validator::PromQL(config) => {
                promql::validate(config, client, rollout, deadline).await
            }
        }
    }
}

/// Build every configured validator, rejecting empty or ambiguous items.
pub fn build_validators(rollout: &CanaryRollout) -> Result<Vec<Validator>> {
    rollout
        .spec
        .validations
        .items
        .iter()
        .map(Validator::from_spec)
        .collect()
}
