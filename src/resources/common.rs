//! Naming, labels, owner references and the template fingerprint.
//!
//! Every child object name is a pure function of the CanaryRollout so that
//! repeated reconciles converge on the same objects.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::{CanaryRollout, DeploymentTemplate};

/// Label marking every object managed for a rollout.
pub const KANARY_LABEL_KEY: &str = "is-kanary";

/// Value of [`KANARY_LABEL_KEY`].
pub const KANARY_LABEL_VALUE: &str = "true";

/// Label carrying the owning CanaryRollout name.
pub const KANARY_NAME_LABEL_KEY: &str = "kanary-name";

/// Label carried by canary pods, used by the kanary Service selector.
pub const CANARY_POD_LABEL_KEY: &str = "canary-pod";

/// Value of [`CANARY_POD_LABEL_KEY`].
pub const CANARY_POD_LABEL_VALUE: &str = "true";

/// Annotation on the canary Deployment carrying the template fingerprint.
pub const TEMPLATE_HASH_ANNOTATION: &str = "md5";

/// Suffix appended to names and isolated selector values.
pub const KANARY_SUFFIX: &str = "-kanary";

/// API version written into owner references.
pub const API_VERSION: &str = "kanary.k8s.io/v1alpha1";

/// Kind written into owner references.
pub const KIND: &str = "CanaryRollout";

/// Name of the primary Deployment the rollout evolves.
///
/// Resolution order: `spec.deploymentName`, the template's metadata name,
/// then the CanaryRollout name itself.
pub fn deployment_name(rollout: &CanaryRollout) -> String {
    if let Some(name) = rollout.spec.deployment_name.as_deref() {
        return name.to_string();
    }
    if let Some(name) = rollout
        .spec
        .template
        .metadata
        .as_ref()
        .and_then(|m| m.name.as_deref())
    {
        return name.to_string();
    }
    rollout.name_any()
}

/// Name of the canary Deployment: `<primary>-kanary`.
pub fn canary_deployment_name(rollout: &CanaryRollout) -> String {
    format!("{}{}", deployment_name(rollout), KANARY_SUFFIX)
}

/// Name of the dedicated kanary Service.
///
/// `spec.traffic.kanaryService` wins, then `<serviceName>-kanary`, then
/// `<primary>-kanary` when no primary Service is declared.
pub fn kanary_service_name(rollout: &CanaryRollout) -> String {
    if let Some(name) = rollout.spec.traffic.kanary_service.as_deref() {
        return name.to_string();
    }
    match rollout.spec.service_name.as_deref() {
        Some(service) => format!("{}{}", service, KANARY_SUFFIX),
        None => format!("{}{}", deployment_name(rollout), KANARY_SUFFIX),
    }
}

/// Marker labels identifying objects owned for a given rollout.
pub fn rollout_labels(rollout_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(KANARY_LABEL_KEY.to_string(), KANARY_LABEL_VALUE.to_string());
    labels.insert(
        KANARY_NAME_LABEL_KEY.to_string(),
        rollout_name.to_string(),
    );
    labels
}

/// Label selector string matching every Service owned for a rollout.
pub fn kanary_service_selector(rollout_name: &str) -> String {
    format!("{}={}", KANARY_NAME_LABEL_KEY, rollout_name)
}

/// Owner reference pointing at the CanaryRollout, with cascade deletion.
pub fn owner_reference(rollout: &CanaryRollout) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: rollout.name_any(),
        uid: rollout.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// MD5 fingerprint of the rollout's Deployment spec, in lowercase hex.
///
/// serde_json emits struct fields in declaration order and k8s-openapi maps
/// are BTreeMaps, so the encoding is canonical for a given spec.
pub fn template_hash(template: &DeploymentTemplate) -> Result<String, serde_json::Error> {
    let encoded = serde_json::to_vec(&template.spec)?;
    Ok(format!("{:x}", md5::compute(encoded)))
}
