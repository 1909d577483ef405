//! Autoscaled canary: a HorizontalPodAutoscaler drives the replica count.

use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::info;

use crate::controller::error::Result;
use crate::crd::{CanaryRollout, HpaScale};
use crate::resources::common::canary_deployment_name;
use crate::resources::hpa::{generate_canary_hpa, hpa_needs_update};

/// Make sure the canary HPA exists and matches the configuration.
///
/// Returns true when the HPA was created, meaning the caller should requeue
/// and let the autoscaler raise the canary before validating.
pub async fn reconcile(config: &HpaScale, client: &Client, rollout: &CanaryRollout) -> Result<bool> {
    let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<HorizontalPodAutoscaler> = Api::namespaced(client.clone(), &namespace);
    let desired = generate_canary_hpa(rollout, config);
    let name = canary_deployment_name(rollout);

    match api.get_opt(&name).await? {
        Some(current) => {
            if hpa_needs_update(&current, &desired) {
                info!(hpa = %name, "Updating canary autoscaler");
                api.patch(&name, &PatchParams::default(), &Patch::Merge(&desired))
                    .await?;
            }
            Ok(false)
        }
        None => {
            info!(hpa = %name, "Creating canary autoscaler");
            api.create(&PostParams::default(), &desired).await?;
            Ok(true)
        }
    }
}

/// Delete the canary HPA, ignoring its absence.
///
/// Called when the rollout reaches a terminal state so a leftover autoscaler
/// cannot resurrect canary pods.
pub async fn clear(client: &Client, rollout: &CanaryRollout) -> Result<()> {
    let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<HorizontalPodAutoscaler> = Api::namespaced(client.clone(), &namespace);
    let name = canary_deployment_name(rollout);
    if api.get_opt(&name).await?.is_some() {
        api.delete(&name, &DeleteParams::default()).await?;
        info!(hpa = %name, "Deleted canary autoscaler");
    }
    Ok(())
}
