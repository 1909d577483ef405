//! Controller module for kanary-operator.
//!
//! Contains the reconciliation loop, the schedule gate, spec validation,
//! status management and error handling for CanaryRollout resources.

pub mod context;
pub mod error;
pub mod reconciler;
pub mod scheduler;
pub mod spec_validation;
pub mod status;
