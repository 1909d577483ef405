//! Generation of Kubernetes objects managed for a CanaryRollout.
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | Primary Deployment | Created from the template when missing; rolled on promotion |
//! | Canary Deployment | Shadow workload carrying the marker labels and hash annotation |
//! | Kanary Service | Clone of the primary Service routing to canary pods only |
//! | HPA | Autoscaler for the canary when `scale.hpa` is set |

pub mod common;
pub mod deployment;
pub mod hpa;
pub mod service;

pub use common::{owner_reference, rollout_labels, template_hash};
