//! HorizontalPodAutoscaler generation for autoscaled canaries.

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{CanaryRollout, HpaScale};
use crate::resources::common::{canary_deployment_name, owner_reference, rollout_labels};

/// Generate the HPA targeting the canary Deployment.
///
/// Named after the canary so at most one exists per rollout.
pub fn generate_canary_hpa(rollout: &CanaryRollout, hpa: &HpaScale) -> HorizontalPodAutoscaler {
    let canary_name = canary_deployment_name(rollout);

    HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(canary_name.clone()),
            namespace: rollout.namespace(),
            labels: Some(rollout_labels(&rollout.name_any())),
            owner_references: Some(vec![owner_reference(rollout)]),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: canary_name,
            },
            min_replicas: hpa.min_replicas,
            max_replicas: hpa.max_replicas.unwrap_or(1),
            metrics: if hpa.metrics.is_empty() {
                None
            } else {
                Some(hpa.metrics.clone())
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Whether the live HPA drifted from the desired one.
pub fn hpa_needs_update(
    current: &HorizontalPodAutoscaler,
    desired: &HorizontalPodAutoscaler,
) -> bool {
    let current_spec = current.spec.clone().unwrap_or_default();
    let desired_spec = desired.spec.clone().unwrap_or_default();
    current_spec.min_replicas != desired_spec.min_replicas
        || current_spec.max_replicas != desired_spec.max_replicas
        || current_spec.metrics != desired_spec.metrics
        || current_spec.scale_target_ref != desired_spec.scale_target_ref
}
