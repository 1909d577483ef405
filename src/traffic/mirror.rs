//! Mirrored traffic.
//!
//! No mesh adapter exists yet, so mirroring only guarantees isolation: the
//! canary pods carry rewritten selector values (see the deployment
//! generator) and no Service is created for them. The strategy itself is a
//! no-op beyond that guarantee.

use kube::Client;
use tracing::debug;

use crate::controller::error::Result;
use crate::crd::CanaryRollout;

pub async fn reconcile(_client: &Client, rollout: &CanaryRollout) -> Result<()> {
    if let Some(mirror) = rollout.spec.traffic.mirror.as_ref() {
        debug!(percent = ?mirror.percent, "Mirrored traffic requested, no mesh adapter configured");
    }
    Ok(())
}
