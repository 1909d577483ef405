//! Custom anomaly probe: delegate the verdict to an external HTTP service.
//!
//! The service is expected to answer `GET http://<uri>` within one second
//! with a JSON-encoded Kubernetes pod list naming the out-of-bounds pods.

use std::time::Duration;

use k8s_openapi::List;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::controller::error::{Error, Result};

/// Hard timeout on the custom probe round trip.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Fetch the out-of-bounds pod names from a custom anomaly service.
///
/// Any non-200 answer is a transient failure; the rollout is not marked
/// failed for an unreachable probe.
pub async fn fetch_out_of_bounds_pods(service_uri: &str) -> Result<Vec<String>> {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()?;

    let url = format!("http://{}", service_uri.trim_start_matches("http://"));
    let response = client.get(&url).send().await?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(Error::Transient(format!(
            "custom anomaly service answered {}",
            response.status()
        )));
    }

    let body = response.text().await?;
    parse_pod_list(&body)
}

/// Decode a pod-list envelope into pod names.
pub fn parse_pod_list(body: &str) -> Result<Vec<String>> {
    let pod_list: List<Pod> = serde_json::from_str(body)
        .map_err(|e| Error::Transient(format!("malformed pod list from probe: {}", e)))?;
    Ok(pod_list.items.iter().map(|p| p.name_any()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pod_list() {
        let body = r#"{
            "apiVersion": "v1",
            "kind": "PodList",
            "items": [
                {"metadata": {"name": "web-kanary-abc"}},
                {"metadata": {"name": "web-kanary-def"}}
            ]
        }"#;
        let pods = parse_pod_list(body).expect("parse");
        assert_eq!(pods, vec!["web-kanary-abc", "web-kanary-def"]);
    }

    #[test]
    fn test_parse_empty_pod_list() {
        let body = r#"{"apiVersion": "v1", "kind": "PodList", "items": []}"#;
        assert!(parse_pod_list(body).expect("parse").is_empty());
    }

    #[test]
    fn test_parse_garbage_is_transient() {
        let err = parse_pod_list("<html>oops</html>").expect_err("should fail");
        assert!(err.is_retryable());
    }
}
