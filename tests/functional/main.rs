// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the CanaryRollout decision logic.
//!
//! These tests verify the rollout lifecycle decisions WITHOUT requiring a
//! live Kubernetes cluster: the schedule gate, spec validation and
//! defaulting, validator verdict aggregation, anomaly analysis, and the
//! generated child objects.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run a specific test
//! cargo test --test functional test_happy_path_reaches_promotion
//! ```

mod fixtures;
mod lifecycle_tests;
mod probe_tests;
mod resource_tests;
mod validation_tests;

pub use fixtures::*;
