//! Defaulting of the CanaryRollout spec.
//!
//! Defaults are applied as a pure transformation so the reconciler can detect
//! a non-defaulted stored object, write the defaulted form back once, and
//! requeue. `default_spec` is idempotent.

use crate::crd::{
    CanaryRolloutSpec, PromQLValidation, ScaleSpec, StaticScale, DEFAULT_POD_NAME_KEY,
};

/// Default replica count for a static canary.
pub const DEFAULT_STATIC_REPLICAS: i32 = 1;

/// Textual form of the default validation window.
pub const DEFAULT_VALIDATION_PERIOD_STR: &str = "15m";

/// Textual form of the default reconcile interval cap.
pub const DEFAULT_MAX_INTERVAL_PERIOD_STR: &str = "20s";

/// Return the defaulted form of a spec.
pub fn default_spec(spec: &CanaryRolloutSpec) -> CanaryRolloutSpec {
    let mut out = spec.clone();

    // Scale: static with one replica unless configured otherwise.
    if out.scale.static_.is_none() && out.scale.hpa.is_none() {
        out.scale = ScaleSpec {
            static_: Some(StaticScale {
                replicas: Some(DEFAULT_STATIC_REPLICAS),
            }),
            hpa: None,
        };
    }
    if let Some(static_scale) = out.scale.static_.as_mut() {
        if static_scale.replicas.is_none() {
            static_scale.replicas = Some(DEFAULT_STATIC_REPLICAS);
        }
    }

    // Validation window bounds.
    if out.validations.validation_period.is_none() {
        out.validations.validation_period = Some(DEFAULT_VALIDATION_PERIOD_STR.to_string());
    }
    if out.validations.max_interval_period.is_none() {
        out.validations.max_interval_period = Some(DEFAULT_MAX_INTERVAL_PERIOD_STR.to_string());
    }

    // Metric probes: pin the pod-binding label.
    for item in out.validations.items.iter_mut() {
        if let Some(prom_ql) = item.prom_ql.as_mut() {
            default_prom_ql(prom_ql);
        }
    }

    out
}

fn default_prom_ql(prom_ql: &mut PromQLValidation) {
    if prom_ql.pod_name_key.is_none() {
        prom_ql.pod_name_key = Some(DEFAULT_POD_NAME_KEY.to_string());
    }
}

/// Whether the stored spec already equals its defaulted form.
pub fn is_defaulted(spec: &CanaryRolloutSpec) -> bool {
    default_spec(spec) == *spec
}
