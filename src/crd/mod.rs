//! Custom Resource Definitions for kanary-operator.
//!
//! - `CanaryRollout`: drive a progressive rollout of a Deployment template
//! - defaulting: pure, idempotent spec defaulting applied before reconciling

mod canary_rollout;
pub mod defaulting;

pub use canary_rollout::*;
