//! Pod predicates and set helpers used by the anomaly detector.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

/// Whether a pod is running and has a `Ready=True` condition.
pub fn is_pod_ready(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    if status.phase.as_deref() != Some("Running") {
        return false;
    }
    status
        .conditions
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|c| c.type_ == "Ready" && c.status == "True")
}

/// Whether every container of a pod reports ready.
pub fn all_containers_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| !statuses.is_empty() && statuses.iter().all(|c| c.ready))
        .unwrap_or(false)
}

/// Whether a pod should be considered as not serving traffic yet.
///
/// A terminating pod, or one whose containers are not all ready, is in
/// service-endpoint limbo and must not be judged by the detector.
pub fn is_pod_without_traffic(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some() || !all_containers_ready(pod)
}

/// Keep only ready pods.
pub fn purge_not_ready_pods(pods: Vec<Pod>) -> Vec<Pod> {
    pods.into_iter().filter(is_pod_ready).collect()
}

/// Partition pods into a by-name map and the set of names excluded by the
/// predicate.
pub fn partition_pods<F>(pods: Vec<Pod>, excluded: F) -> (BTreeMap<String, Pod>, BTreeSet<String>)
where
    F: Fn(&Pod) -> bool,
{
    let mut by_name = BTreeMap::new();
    let mut without_traffic = BTreeSet::new();
    for pod in pods {
        let name = pod.name_any();
        if excluded(&pod) {
            without_traffic.insert(name.clone());
        }
        by_name.insert(name, pod);
    }
    (by_name, without_traffic)
}
