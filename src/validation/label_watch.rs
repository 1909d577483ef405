//! Label-watch validation: invalidation labels on the canary Deployment or
//! its pods fail the rollout.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};

use crate::controller::error::Result;
use crate::crd::{CanaryRollout, LabelWatchValidation};
use crate::resources::deployment::canary_pod_selector;
use crate::validation::{DeadlineStatus, ValidationResult};

/// Comment recorded when invalidation labels are found.
pub const INVALIDATION_COMMENT: &str = "labelWatch detected invalidation labels";

/// Whether every wanted label pair is present on the target.
pub fn labels_match(
    target: Option<&BTreeMap<String, String>>,
    wanted: &BTreeMap<String, String>,
) -> bool {
    if wanted.is_empty() {
        return false;
    }
    let Some(target) = target else {
        return false;
    };
    wanted
        .iter()
        .all(|(key, value)| target.get(key) == Some(value))
}

/// Pure evaluation over already-fetched labels.
pub fn evaluate(
    config: &LabelWatchValidation,
    deployment_labels: Option<&BTreeMap<String, String>>,
    pod_labels: &[Option<BTreeMap<String, String>>],
    deadline: &DeadlineStatus,
) -> ValidationResult {
    let deployment_invalidated = config
        .deployment_invalidation_labels
        .as_ref()
        .is_some_and(|wanted| labels_match(deployment_labels, wanted));

    let pod_invalidated = config.pod_invalidation_labels.as_ref().is_some_and(|wanted| {
        pod_labels
            .iter()
            .any(|labels| labels_match(labels.as_ref(), wanted))
    });

    if deployment_invalidated || pod_invalidated {
        return ValidationResult {
            is_failed: true,
            comment: INVALIDATION_COMMENT.to_string(),
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

/// Run the label watch: fetch canary pod labels when configured, then apply
/// the pure evaluation.
pub async fn validate(
    config: &LabelWatchValidation,
    client: &Client,
    rollout: &CanaryRollout,
    canary: &Deployment,
    deadline: &DeadlineStatus,
) -> Result<ValidationResult> {
    let pod_labels = if config.pod_invalidation_labels.is_some() {
        let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Pod> = Api::namespaced(client.clone(), &namespace);
        let selector = canary_pod_selector(&rollout.name_any());
        api.list(&ListParams::default().labels(&selector))
            .await?
            .items
            .into_iter()
            .map(|pod| pod.metadata.labels)
            .collect()
    } else {
        Vec::new()
    };

    Ok(evaluate(
        config,
        canary.metadata.labels.as_ref(),
        &pod_labels,
        deadline,
    ))
}
