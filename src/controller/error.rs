//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

/// Error type for controller and strategy operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error in the rollout spec (terminal, user must fix)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient error that should be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// HTTP probe failure (metric store or custom anomaly service)
    #[error("Probe error: {0}")]
    Probe(#[from] reqwest::Error),

    /// Malformed metric-query response
    #[error("Metric query error: {0}")]
    MetricQuery(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error indicates an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 409)
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on conflicts, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err)
                        if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Transient(_) | Error::Probe(_) | Error::MetricQuery(_) => true,
            Error::Validation(_) | Error::Serialization(_) => false,
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_conflict() || matches!(self, Error::Transient(_)) {
            // Conflicts and known-transient states (a referenced Service not
            // created yet, say) resolve on the next read of fresh state
            Duration::from_secs(1)
        } else if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            // Don't hammer the API for errors only the user can fix
            Duration::from_secs(3600)
        }
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
