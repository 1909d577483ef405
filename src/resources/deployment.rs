//! Deployment generation for the primary and the canary.
//!
//! The primary is created from the embedded template when missing and is not
//! owned by the rollout. The canary carries the marker labels, the template
//! fingerprint annotation, and (when traffic requires isolation) rewritten
//! selector values so the primary Service no longer matches its pods.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::crd::{CanaryRollout, TrafficSource};
use crate::resources::common::{
    canary_deployment_name, deployment_name, owner_reference, rollout_labels,
    CANARY_POD_LABEL_KEY, CANARY_POD_LABEL_VALUE, KANARY_NAME_LABEL_KEY, KANARY_SUFFIX,
    TEMPLATE_HASH_ANNOTATION,
};

/// Whether canary pods must carry rewritten selector labels so the primary
/// Service does not route to them.
///
/// True for dedicated (`kanary-service`) and mirrored traffic; false when
/// canary pods are meant to receive live traffic (or none at all).
pub fn needs_dedicated_pods(source: TrafficSource) -> bool {
    matches!(source, TrafficSource::KanaryService | TrafficSource::Mirror)
}

/// Generate the primary Deployment from the rollout template.
///
/// The primary is not owned by the rollout: it conceptually predates it and
/// must survive the rollout's deletion.
pub fn generate_primary_deployment(rollout: &CanaryRollout, hash: &str) -> Deployment {
    let name = deployment_name(rollout);
    let mut metadata = rollout
        .spec
        .template
        .metadata
        .clone()
        .unwrap_or_default();
    metadata.name = Some(name);
    metadata.namespace = rollout.namespace();
    metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(TEMPLATE_HASH_ANNOTATION.to_string(), hash.to_string());

    Deployment {
        metadata,
        spec: rollout.spec.template.spec.clone(),
        ..Default::default()
    }
}

/// Generate the canary Deployment for a rollout.
///
/// The canary starts at zero replicas; the scale strategy raises it on the
/// next pass. Pod labels always gain `canary-pod=true` and the rollout name
/// so the kanary Service can select them regardless of traffic source.
pub fn generate_canary_deployment(rollout: &CanaryRollout, hash: &str) -> Deployment {
    let rollout_name = rollout.name_any();
    let name = canary_deployment_name(rollout);

    let mut labels = rollout
        .spec
        .template
        .metadata
        .as_ref()
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();
    labels.extend(rollout_labels(&rollout_name));

    let mut annotations = BTreeMap::new();
    annotations.insert(TEMPLATE_HASH_ANNOTATION.to_string(), hash.to_string());

    let mut spec = rollout.spec.template.spec.clone().unwrap_or_default();
    spec.replicas = Some(0);
    rewrite_canary_selector(
        &mut spec,
        &rollout_name,
        needs_dedicated_pods(rollout.spec.traffic.source),
    );

    Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: rollout.namespace(),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_reference(rollout)]),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    }
}

/// Rewrite the canary selector and pod-template labels.
///
/// When `isolate` is set, every value referenced by the selector gains the
/// `-kanary` suffix on both sides so the primary Service selector no longer
/// matches the pods. The canary marker labels are added in all cases.
fn rewrite_canary_selector(spec: &mut DeploymentSpec, rollout_name: &str, isolate: bool) {
    let selector_keys: Vec<String> = spec
        .selector
        .match_labels
        .as_ref()
        .map(|labels| labels.keys().cloned().collect())
        .unwrap_or_default();

    if isolate {
        if let Some(match_labels) = spec.selector.match_labels.as_mut() {
            for value in match_labels.values_mut() {
                value.push_str(KANARY_SUFFIX);
            }
        }
    }
    add_canary_markers(spec.selector.match_labels.get_or_insert_with(BTreeMap::new), rollout_name);

    let pod_meta = spec
        .template
        .metadata
        .get_or_insert_with(Default::default);
    let pod_labels = pod_meta.labels.get_or_insert_with(BTreeMap::new);
    if isolate {
        for key in &selector_keys {
            if let Some(value) = pod_labels.get_mut(key) {
                value.push_str(KANARY_SUFFIX);
            }
        }
    }
    add_canary_markers(pod_labels, rollout_name);
}

fn add_canary_markers(labels: &mut BTreeMap<String, String>, rollout_name: &str) {
    labels.insert(
        CANARY_POD_LABEL_KEY.to_string(),
        CANARY_POD_LABEL_VALUE.to_string(),
    );
    labels.insert(
        KANARY_NAME_LABEL_KEY.to_string(),
        rollout_name.to_string(),
    );
}

/// Selector matching the canary pods of a rollout, as a list-call string.
pub fn canary_pod_selector(rollout_name: &str) -> String {
    format!(
        "{}={},{}={}",
        CANARY_POD_LABEL_KEY, CANARY_POD_LABEL_VALUE, KANARY_NAME_LABEL_KEY, rollout_name
    )
}

/// Selector rewritten for dedicated traffic, applied to a Service selector.
///
/// Mirrors the pod-label rewrite: selector values gain the `-kanary` suffix
/// when the source isolates canary pods, and the canary markers are added.
pub fn canary_service_selector_labels(
    primary_selector: &BTreeMap<String, String>,
    rollout_name: &str,
    source: TrafficSource,
) -> BTreeMap<String, String> {
    let mut selector = primary_selector.clone();
    if needs_dedicated_pods(source) {
        for value in selector.values_mut() {
            value.push_str(KANARY_SUFFIX);
        }
    }
    add_canary_markers(&mut selector, rollout_name);
    selector
}

/// Extract the template hash annotation from a Deployment, if present.
pub fn deployment_template_hash(deployment: &Deployment) -> Option<&str> {
    deployment
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(TEMPLATE_HASH_ANNOTATION))
        .map(String::as_str)
}

/// Build a LabelSelector from plain match labels.
pub fn label_selector(labels: BTreeMap<String, String>) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels),
        ..Default::default()
    }
}
