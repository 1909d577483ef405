//! Generated child objects: naming, selectors and traffic isolation as a
//! whole, across the canary Deployment and the kanary Service.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use kanary_operator::crd::TrafficSource;
use kanary_operator::resources::common::{
    canary_deployment_name, deployment_name, kanary_service_name, template_hash,
};
use kanary_operator::resources::deployment::{
    deployment_template_hash, generate_canary_deployment, generate_primary_deployment,
};
use kanary_operator::resources::service::generate_kanary_service;

use crate::fixtures::{app_labels, rollout_with_traffic, web_template};

fn primary_service() -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(app_labels()),
            ports: Some(vec![ServicePort {
                port: 80,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_labels(deployment: &k8s_openapi::api::apps::v1::Deployment) -> BTreeMap<String, String> {
    deployment
        .spec
        .as_ref()
        .unwrap()
        .template
        .metadata
        .as_ref()
        .unwrap()
        .labels
        .clone()
        .unwrap()
}

fn selector_matches(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

#[test]
fn test_naming_is_a_pure_function_of_the_rollout() {
    let rollout = rollout_with_traffic("crr", TrafficSource::Both);
    assert_eq!(deployment_name(&rollout), "web");
    assert_eq!(canary_deployment_name(&rollout), "web-kanary");
    assert_eq!(kanary_service_name(&rollout), "web-kanary");
}

/// In `both` mode the canary pods must be reachable through the primary
/// Service and the kanary Service at the same time.
#[test]
fn test_both_mode_pods_match_primary_and_kanary_selectors() {
    let rollout = rollout_with_traffic("crr", TrafficSource::Both);
    let canary = generate_canary_deployment(&rollout, "h");
    let pods = pod_labels(&canary);

    // Primary Service selector still matches.
    assert!(selector_matches(&app_labels(), &pods));

    // And so does the kanary Service clone's selector.
    let kanary_svc = generate_kanary_service(&rollout, &primary_service());
    let kanary_selector = kanary_svc.spec.as_ref().unwrap().selector.clone().unwrap();
    assert!(selector_matches(&kanary_selector, &pods));
}

/// In `kanary-service` mode the primary Service must NOT match canary pods,
/// while the kanary Service must.
#[test]
fn test_dedicated_mode_isolates_pods_from_the_primary_service() {
    let rollout = rollout_with_traffic("crr", TrafficSource::KanaryService);
    let canary = generate_canary_deployment(&rollout, "h");
    let pods = pod_labels(&canary);

    assert!(!selector_matches(&app_labels(), &pods));

    let kanary_svc = generate_kanary_service(&rollout, &primary_service());
    let kanary_selector = kanary_svc.spec.as_ref().unwrap().selector.clone().unwrap();
    assert!(selector_matches(&kanary_selector, &pods));
}

/// The primary Service keeps routing to primary pods even in isolated mode:
/// only the canary side of the selector is rewritten.
#[test]
fn test_isolation_leaves_the_primary_deployment_untouched() {
    let rollout = rollout_with_traffic("crr", TrafficSource::KanaryService);
    let primary = generate_primary_deployment(&rollout, "h");
    let primary_pods = primary
        .spec
        .as_ref()
        .unwrap()
        .template
        .metadata
        .as_ref()
        .unwrap()
        .labels
        .clone()
        .unwrap();
    assert!(selector_matches(&app_labels(), &primary_pods));
}

#[test]
fn test_template_hash_round_trips_through_the_annotation() {
    let rollout = rollout_with_traffic("crr", TrafficSource::None);
    let hash = template_hash(&rollout.spec.template).expect("hash");

    let canary = generate_canary_deployment(&rollout, &hash);
    assert_eq!(deployment_template_hash(&canary), Some(hash.as_str()));

    // An edited template yields a different fingerprint, which is how the
    // reconciler notices drift.
    let mut edited = web_template();
    edited.spec.as_mut().unwrap().replicas = Some(5);
    let edited_hash = template_hash(&edited).expect("hash");
    assert_ne!(hash, edited_hash);
}

#[test]
fn test_canary_is_owned_and_starts_dormant() {
    let rollout = rollout_with_traffic("crr", TrafficSource::Both);
    let canary = generate_canary_deployment(&rollout, "h");

    assert_eq!(canary.spec.as_ref().unwrap().replicas, Some(0));
    let owners = canary.metadata.owner_references.as_ref().unwrap();
    assert_eq!(owners[0].kind, "CanaryRollout");
    assert_eq!(owners[0].name, "crr");

    // The primary outlives the rollout: no owner reference.
    let primary = generate_primary_deployment(&rollout, "h");
    assert!(primary.metadata.owner_references.is_none());
}
