//! Dedicated kanary Service management.

use k8s_openapi::api::core::v1::Service;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::info;

use crate::controller::error::{Error, Result};
use crate::crd::CanaryRollout;
use crate::resources::common::kanary_service_name;
use crate::resources::service::{generate_kanary_service, kanary_service_needs_update};

/// Make sure the dedicated kanary Service exists and tracks the primary.
///
/// The clone needs the primary Service as its base. A declared but missing
/// primary is transient: the rollout waits for it rather than failing.
pub async fn reconcile(client: &Client, rollout: &CanaryRollout) -> Result<()> {
    let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Service> = Api::namespaced(client.clone(), &namespace);

    let primary_name = rollout.spec.service_name.as_deref().ok_or_else(|| {
        Error::Validation("traffic source needs spec.serviceName".to_string())
    })?;
    let primary = api.get_opt(primary_name).await?.ok_or_else(|| {
        Error::Transient(format!("primary service {} not found yet", primary_name))
    })?;

    let desired = generate_kanary_service(rollout, &primary);
    let name = kanary_service_name(rollout);

    match api.get_opt(&name).await? {
        Some(current) => {
            if kanary_service_needs_update(&current, &desired) {
                info!(service = %name, "Updating kanary service");
                api.patch(&name, &PatchParams::default(), &Patch::Merge(&desired))
                    .await?;
            }
        }
        None => {
            info!(service = %name, "Creating kanary service");
            api.create(&PostParams::default(), &desired).await?;
        }
    }
    Ok(())
}
