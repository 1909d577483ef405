//! Teardown of Services created for a rollout.

use k8s_openapi::api::core::v1::Service;
use kube::api::{DeleteParams, ListParams};
use kube::{Api, Client, ResourceExt};
use tracing::info;

use crate::controller::error::Result;
use crate::crd::CanaryRollout;
use crate::resources::common::kanary_service_selector;

/// Delete every Service labeled for the rollout.
///
/// Returns true while labeled Services still exist, so the caller keeps
/// requeueing until the teardown has converged.
pub async fn cleanup_services(client: &Client, rollout: &CanaryRollout) -> Result<bool> {
    let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Service> = Api::namespaced(client.clone(), &namespace);
    let selector = kanary_service_selector(&rollout.name_any());

    let services = api
        .list(&ListParams::default().labels(&selector))
        .await?
        .items;
    if services.is_empty() {
        return Ok(false);
    }

    for service in &services {
        info!(service = %service.name_any(), "Deleting kanary service");
        api.delete(&service.name_any(), &DeleteParams::default())
            .await?;
    }
    Ok(true)
}
