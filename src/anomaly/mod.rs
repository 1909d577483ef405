//! Anomaly detection: turn time-series queries into per-pod verdicts.
//!
//! The detector lists canary pods, drops those that are not ready or not yet
//! serving, queries the metric store (or a custom HTTP probe), and applies an
//! analyzer-specific bound check to every verdict. A single verdict keyed by
//! [`GLOBAL_VERDICT_KEY`] is broadcast to the whole canary set, which lets a
//! scalar query judge all pods at once.

mod continuous;
mod custom_service;
mod discrete;
pub mod prometheus;
mod range;

pub use continuous::ContinuousValueAnalyzer;
pub use custom_service::{fetch_out_of_bounds_pods, parse_pod_list};
pub use discrete::DiscreteValueAnalyzer;
pub use range::ValueInRangeAnalyzer;

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::crd::PromQLValidation;
use crate::pods::{is_pod_without_traffic, partition_pods, purge_not_ready_pods};
use crate::anomaly::prometheus::{MetricQueryClient, Sample};

/// Sentinel verdict key meaning "applies to every canary pod".
pub const GLOBAL_VERDICT_KEY: &str = "__global__";

/// Per-pod classification produced by an analyzer.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// Good/bad observation counts (discrete analyzer).
    Counts { ok: u64, ko: u64 },
    /// Deviation from a 1.0 target (continuous analyzer).
    Deviation(f64),
    /// Whether the value sat inside the configured bounds (range analyzer).
    InRange(bool),
}

/// The analyzer shape picked by the probe configuration.
#[derive(Clone, Debug)]
pub enum Analyzer {
    Discrete(DiscreteValueAnalyzer),
    Continuous(ContinuousValueAnalyzer),
    Range(ValueInRangeAnalyzer),
}

impl Analyzer {
    fn verdicts(
        &self,
        samples: &[Sample],
        pod_name_key: &str,
        all_pods_query: bool,
    ) -> Result<BTreeMap<String, Verdict>> {
        match self {
            Analyzer::Discrete(a) => a.verdicts(samples, pod_name_key, all_pods_query),
            Analyzer::Continuous(a) => a.verdicts(samples, pod_name_key, all_pods_query),
            Analyzer::Range(a) => a.verdicts(samples, pod_name_key, all_pods_query),
        }
    }

    fn is_out_of_bounds(&self, verdict: &Verdict) -> Result<bool> {
        match self {
            Analyzer::Discrete(a) => a.is_out_of_bounds(verdict),
            Analyzer::Continuous(a) => a.is_out_of_bounds(verdict),
            Analyzer::Range(a) => a.is_out_of_bounds(verdict),
        }
    }
}

/// How the detector obtains its verdicts.
enum DetectorBackend {
    /// Query the metric store and analyze the resulting vector.
    Metric {
        client: MetricQueryClient,
        query: String,
        pod_name_key: String,
        all_pods_query: bool,
        analyzer: Analyzer,
    },
    /// Ask an external HTTP service for the offending pods directly.
    Custom { service_uri: String },
}

/// Classifies canary replicas as in or out of bounds.
///
/// Detectors carry no state beyond their configuration and are rebuilt on
/// every validation pass.
pub struct AnomalyDetector {
    namespace: String,
    pod_selector: String,
    backend: DetectorBackend,
}

impl AnomalyDetector {
    /// Build a detector from a metric-probe configuration.
    ///
    /// Exactly one analysis shape must be present; the custom service wins
    /// over metric analyzers when both are set (it bypasses the pipeline).
    pub fn from_validation(
        config: &PromQLValidation,
        namespace: &str,
        pod_selector: &str,
    ) -> Result<Self> {
        let backend = if let Some(service_uri) = config.custom_service.as_deref() {
            DetectorBackend::Custom {
                service_uri: service_uri.to_string(),
            }
        } else {
            let analyzer = if let Some(discrete) = config.discrete_value_out_of_list.as_ref() {
                Analyzer::Discrete(DiscreteValueAnalyzer::new(discrete.clone()))
            } else if let Some(continuous) = config.continuous_value_deviation.as_ref() {
                Analyzer::Continuous(ContinuousValueAnalyzer::new(continuous.clone()))
            } else if let Some(range) = config.value_in_range.as_ref() {
                Analyzer::Range(ValueInRangeAnalyzer::new(range.clone()))
            } else {
                return Err(Error::Validation(
                    "promQL validation needs one of discreteValueOutOfList, \
                     continuousValueDeviation, valueInRange or customService"
                        .to_string(),
                ));
            };

            let service = config.prometheus_service.as_deref().ok_or_else(|| {
                Error::Validation("promQL validation requires prometheusService".to_string())
            })?;
            let query = config.query.as_deref().ok_or_else(|| {
                Error::Validation("promQL validation requires a query".to_string())
            })?;

            DetectorBackend::Metric {
                client: MetricQueryClient::new(service)?,
                query: query.to_string(),
                pod_name_key: config.pod_name_key().to_string(),
                all_pods_query: config.all_pods_query,
                analyzer,
            }
        };

        Ok(Self {
            namespace: namespace.to_string(),
            pod_selector: pod_selector.to_string(),
            backend,
        })
    }

    /// Names of canary pods currently judged out of bounds.
    pub async fn get_pods_out_of_bounds(&self, client: &Client) -> Result<Vec<String>> {
        match &self.backend {
            DetectorBackend::Custom { service_uri } => {
                fetch_out_of_bounds_pods(service_uri).await
            }
            DetectorBackend::Metric {
                client: metric_client,
                query,
                pod_name_key,
                all_pods_query,
                analyzer,
            } => {
                let api: Api<Pod> = Api::namespaced(client.clone(), &self.namespace);
                let pods = api
                    .list(&ListParams::default().labels(&self.pod_selector))
                    .await?
                    .items;

                let ready = purge_not_ready_pods(pods);
                let (by_name, without_traffic) = partition_pods(ready, is_pod_without_traffic);
                if by_name.is_empty() {
                    debug!(selector = %self.pod_selector, "No ready canary pods to analyze");
                    return Ok(Vec::new());
                }

                let samples = metric_client.instant_query(query).await?;
                let verdicts = analyzer.verdicts(&samples, pod_name_key, *all_pods_query)?;

                filter_out_of_bounds(
                    analyzer,
                    verdicts,
                    &by_name.keys().cloned().collect(),
                    &without_traffic,
                )
            }
        }
    }
}

/// Apply the bound check to every judged pod.
///
/// A lone global verdict is broadcast to every known pod first. Pods that
/// are not yet serving are never reported; neither is any pod absent from
/// the selector's list.
fn filter_out_of_bounds(
    analyzer: &Analyzer,
    verdicts: BTreeMap<String, Verdict>,
    pods_by_name: &BTreeSet<String>,
    pods_without_traffic: &BTreeSet<String>,
) -> Result<Vec<String>> {
    let verdicts = broadcast_global_verdict(verdicts, pods_by_name);

    let mut out_of_bounds = Vec::new();
    for (pod, verdict) in &verdicts {
        if !pods_by_name.contains(pod) || pods_without_traffic.contains(pod) {
            continue;
        }
        if analyzer.is_out_of_bounds(verdict)? {
            out_of_bounds.push(pod.clone());
        }
    }
    Ok(out_of_bounds)
}

/// Expand a single global verdict into one verdict per known pod.
fn broadcast_global_verdict(
    verdicts: BTreeMap<String, Verdict>,
    pods_by_name: &BTreeSet<String>,
) -> BTreeMap<String, Verdict> {
    if verdicts.len() != 1 {
        return verdicts;
    }
    match verdicts.get(GLOBAL_VERDICT_KEY) {
        Some(global) => pods_by_name
            .iter()
            .map(|pod| (pod.clone(), global.clone()))
            .collect(),
        None => verdicts,
    }
}
