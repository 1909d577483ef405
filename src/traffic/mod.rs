//! Traffic strategies: how canary pods receive requests.
//!
//! | source          | primary Service | dedicated Service | isolation |
//! |-----------------|-----------------|-------------------|-----------|
//! | `none`          | no              | no (cleanup)      | no        |
//! | `service`       | yes             | no                | no        |
//! | `kanary-service`| no              | yes               | yes       |
//! | `both`          | yes             | yes               | no        |
//! | `mirror`        | no              | no (cleanup)      | yes       |
//!
//! Routing through the primary Service costs nothing at reconcile time: the
//! canary pods simply keep the primary's selector labels.

pub mod cleanup;
pub mod kanary_service;
pub mod mirror;

use kube::Client;

use crate::controller::error::Result;
use crate::crd::{CanaryRollout, TrafficSource};

/// One traffic strategy, picked from `spec.traffic.source`.
pub struct TrafficStrategy {
    source: TrafficSource,
}

impl TrafficStrategy {
    pub fn from_source(source: TrafficSource) -> Self {
        Self { source }
    }

    /// Whether this strategy maintains a dedicated kanary Service.
    pub fn has_dedicated_service(&self) -> bool {
        matches!(
            self.source,
            TrafficSource::KanaryService | TrafficSource::Both
        )
    }

    /// Drive the traffic plumbing for one pass.
    ///
    /// Returns true while the pass left work pending (a teardown in
    /// progress), telling the caller to requeue.
    pub async fn reconcile(&self, client: &Client, rollout: &CanaryRollout) -> Result<bool> {
        match self.source {
            TrafficSource::Service => Ok(false),
            TrafficSource::KanaryService | TrafficSource::Both => {
                kanary_service::reconcile(client, rollout).await?;
                Ok(false)
            }
            TrafficSource::Mirror => {
                mirror::reconcile(client, rollout).await?;
                cleanup::cleanup_services(client, rollout).await
            }
            TrafficSource::None => cleanup::cleanup_services(client, rollout).await,
        }
    }

    /// Tear down the traffic plumbing once the rollout is terminal.
    ///
    /// Returns true while labeled Services still exist.
    pub async fn cleanup(&self, client: &Client, rollout: &CanaryRollout) -> Result<bool> {
        cleanup::cleanup_services(client, rollout).await
    }
}
