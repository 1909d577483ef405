//! Kanary Service generation.
//!
//! The dedicated Service is a clone of the primary: renamed, stripped of
//! observed and collision-prone fields, and re-selected onto canary pods.

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::CanaryRollout;
use crate::resources::common::{kanary_service_name, owner_reference, rollout_labels};
use crate::resources::deployment::canary_service_selector_labels;

/// Clone the primary Service into the desired kanary Service.
///
/// Normalization rules:
/// - `clusterIP`/`clusterIPs` are observed fields and are cleared
/// - `NodePort`/`LoadBalancer` types collide across Services, so the clone
///   always becomes `ClusterIP` with per-port `nodePort` cleared
/// - the selector is overridden to match canary pods only
pub fn generate_kanary_service(rollout: &CanaryRollout, primary: &Service) -> Service {
    let rollout_name = rollout.name_any();

    let mut labels = primary.metadata.labels.clone().unwrap_or_default();
    labels.extend(rollout_labels(&rollout_name));

    let mut spec = primary.spec.clone().unwrap_or_default();
    spec.cluster_ip = None;
    spec.cluster_ips = None;
    spec.load_balancer_ip = None;
    spec.external_ips = None;
    spec.type_ = Some("ClusterIP".to_string());
    if let Some(ports) = spec.ports.as_mut() {
        for port in ports.iter_mut() {
            port.node_port = None;
        }
    }

    let primary_selector = primary
        .spec
        .as_ref()
        .and_then(|s| s.selector.clone())
        .unwrap_or_default();
    spec.selector = Some(canary_service_selector_labels(
        &primary_selector,
        &rollout_name,
        rollout.spec.traffic.source,
    ));

    Service {
        metadata: ObjectMeta {
            name: Some(kanary_service_name(rollout)),
            namespace: rollout.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(rollout)]),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    }
}

/// Whether the live kanary Service drifted from the desired clone.
///
/// Observed-only fields (`clusterIP`, `clusterIPs`, `loadBalancerIP`,
/// per-port `nodePort`) are ignored in the comparison.
pub fn kanary_service_needs_update(current: &Service, desired: &Service) -> bool {
    let current_spec = current.spec.clone().unwrap_or_default();
    let desired_spec = desired.spec.clone().unwrap_or_default();

    if current_spec.selector != desired_spec.selector {
        return true;
    }
    if current_spec.type_ != desired_spec.type_ {
        return true;
    }

    let strip = |spec: &k8s_openapi::api::core::v1::ServiceSpec| {
        spec.ports.clone().unwrap_or_default().into_iter().map(|mut p| {
            p.node_port = None;
            p
        }).collect::<Vec<_>>()
    };
    strip(&current_spec) != strip(&desired_spec)
}
