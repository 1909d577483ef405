//! Scale strategies for the canary Deployment.
//!
//! The canary is always created with zero replicas; a scale strategy then
//! raises it, either to a fixed count or through an autoscaler.

pub mod hpa;
pub mod static_replicas;

use k8s_openapi::api::apps::v1::Deployment;
use kube::Client;

use crate::controller::error::{Error, Result};
use crate::crd::{CanaryRollout, ScaleSpec};

/// How the canary replica count is driven.
pub enum ScaleStrategy {
    Static(crate::crd::StaticScale),
    Hpa(crate::crd::HpaScale),
}

impl ScaleStrategy {
    /// Pick the strategy from the rollout spec.
    ///
    /// Defaulting fills in `static: {replicas: 1}` when neither variant is
    /// set, so an empty spec only occurs before the defaulting writeback.
    pub fn from_spec(spec: &ScaleSpec) -> Result<Self> {
        match (spec.static_.as_ref(), spec.hpa.as_ref()) {
            (Some(_), Some(_)) => Err(Error::Validation(
                "scale must carry either static or hpa, not both".to_string(),
            )),
            (Some(static_), None) => Ok(ScaleStrategy::Static(static_.clone())),
            (None, Some(hpa)) => Ok(ScaleStrategy::Hpa(hpa.clone())),
            (None, None) => Ok(ScaleStrategy::Static(crate::crd::StaticScale {
                replicas: Some(1),
            })),
        }
    }

    /// Name of the strategy, for the status report.
    pub fn kind(&self) -> &'static str {
        match self {
            ScaleStrategy::Static(_) => "static",
            ScaleStrategy::Hpa(_) => "hpa",
        }
    }

    /// Drive the canary towards the desired scale.
    ///
    /// Returns true when the pass changed something and the caller should
    /// requeue before validating.
    pub async fn reconcile(
        &self,
        client: &Client,
        rollout: &CanaryRollout,
        canary: &Deployment,
    ) -> Result<bool> {
        match self {
            ScaleStrategy::Static(config) => {
                static_replicas::reconcile(config, client, canary).await
            }
            ScaleStrategy::Hpa(config) => hpa::reconcile(config, client, rollout).await,
        }
    }

    /// Tear down scale machinery once the rollout is terminal.
    pub async fn clear(&self, client: &Client, rollout: &CanaryRollout) -> Result<()> {
        match self {
            // A fixed count leaves nothing behind beyond the canary itself.
            ScaleStrategy::Static(_) => Ok(()),
            ScaleStrategy::Hpa(_) => hpa::clear(client, rollout).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{HpaScale, StaticScale};

    #[test]
    fn test_empty_spec_falls_back_to_single_static_replica() {
        let strategy = ScaleStrategy::from_spec(&ScaleSpec::default()).expect("strategy");
        match strategy {
            ScaleStrategy::Static(config) => assert_eq!(config.replicas, Some(1)),
            ScaleStrategy::Hpa(_) => panic!("expected static strategy"),
        }
    }

    #[test]
    fn test_both_variants_rejected() {
        let spec = ScaleSpec {
            static_: Some(StaticScale::default()),
            hpa: Some(HpaScale::default()),
        };
        assert!(ScaleStrategy::from_spec(&spec).is_err());
    }

    #[test]
    fn test_kind_names() {
        let spec = ScaleSpec {
            hpa: Some(HpaScale::default()),
            ..Default::default()
        };
        assert_eq!(ScaleStrategy::from_spec(&spec).unwrap().kind(), "hpa");
        assert_eq!(
            ScaleStrategy::from_spec(&ScaleSpec::default()).unwrap().kind(),
            "static"
        );
    }
}
