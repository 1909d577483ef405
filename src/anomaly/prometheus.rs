//! Instant-query client for the metric store.
//!
//! Speaks the Prometheus HTTP API: `GET /api/v1/query?query=...` returning
//! `{status, data: {resultType, result: [{metric: {..}, value: [ts, "v"]}]}}`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::controller::error::{Error, Result};

/// Timeout applied to every metric-store round trip.
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// One time-series sample from an instant query.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Metric labels, including the pod-binding label.
    pub labels: BTreeMap<String, String>,
    /// Sample value parsed from the string form.
    pub value: f64,
}

#[derive(Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    /// `[timestamp, "value"]`
    value: (f64, String),
}

/// Parse an instant-query response body into samples.
pub fn parse_instant_query_response(body: &str) -> Result<Vec<Sample>> {
    let response: QueryResponse = serde_json::from_str(body)
        .map_err(|e| Error::MetricQuery(format!("malformed query response: {}", e)))?;

    if response.status != "success" {
        return Err(Error::MetricQuery(format!(
            "query failed: {}",
            response.error.unwrap_or_else(|| response.status)
        )));
    }

    let data = response
        .data
        .ok_or_else(|| Error::MetricQuery("query response missing data".to_string()))?;

    let mut samples = Vec::with_capacity(data.result.len());
    for result in data.result {
        let value = result.value.1.parse::<f64>().map_err(|e| {
            Error::MetricQuery(format!("unparseable sample value '{}': {}", result.value.1, e))
        })?;
        samples.push(Sample {
            labels: result.metric,
            value,
        });
    }
    Ok(samples)
}

/// Thin client over the metric store's instant-query endpoint.
#[derive(Clone, Debug)]
pub struct MetricQueryClient {
    endpoint: String,
    http: reqwest::Client,
}

impl MetricQueryClient {
    /// Build a client for a `host:port` metric-store service.
    pub fn new(service: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()?;
        Ok(Self {
            endpoint: format!("http://{}/api/v1/query", service),
            http,
        })
    }

    /// Run one instant query and return its samples.
    pub async fn instant_query(&self, query: &str) -> Result<Vec<Sample>> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("query", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::MetricQuery(format!(
                "metric store returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_instant_query_response(&body)
    }
}
