//! Fixed-replica scale strategy for the canary.

use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::info;

use crate::controller::error::Result;
use crate::crd::StaticScale;

/// Desired canary replica count, defaulting to a single pod.
pub fn desired_replicas(config: &StaticScale) -> i32 {
    config.replicas.unwrap_or(1).max(0)
}

/// Whether the live canary must be rescaled.
pub fn needs_rescale(current: Option<i32>, desired: i32) -> bool {
    current != Some(desired)
}

/// Bring the canary Deployment to the configured replica count.
///
/// Returns true when a patch was issued, meaning the caller should requeue
/// and let the new pods come up before validating.
pub async fn reconcile(
    config: &StaticScale,
    client: &Client,
    canary: &Deployment,
) -> Result<bool> {
    let desired = desired_replicas(config);
    let current = canary.spec.as_ref().and_then(|s| s.replicas);
    if !needs_rescale(current, desired) {
        return Ok(false);
    }

    let namespace = canary.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    info!(
        deployment = %canary.name_any(),
        current = ?current,
        desired,
        "Scaling canary deployment"
    );
    api.patch(
        &canary.name_any(),
        &PatchParams::default(),
        &Patch::Merge(json!({"spec": {"replicas": desired}})),
    )
    .await?;
    Ok(true)
}
