//! Up-front validation of the CanaryRollout spec.
//!
//! A spec that cannot be acted on is rejected before any child object is
//! created; these errors are terminal until the user edits the resource.

use crate::controller::error::{Error, Result};
use crate::crd::{CanaryRolloutSpec, TrafficSource, ValidationSpec};

/// Validate a rollout spec before reconciling it.
pub fn validate_spec(spec: &CanaryRolloutSpec) -> Result<()> {
    if spec.template.spec.is_none() {
        return Err(Error::Validation(
            "spec.template.spec is required".to_string(),
        ));
    }

    if spec.scale.static_.is_some() && spec.scale.hpa.is_some() {
        return Err(Error::Validation(
            "spec.scale must carry either static or hpa, not both".to_string(),
        ));
    }
    if let Some(hpa) = spec.scale.hpa.as_ref() {
        if hpa.min_replicas.is_none() {
            return Err(Error::Validation(
                "spec.scale.hpa.minReplicas is required".to_string(),
            ));
        }
        if hpa.max_replicas.is_none() {
            return Err(Error::Validation(
                "spec.scale.hpa.maxReplicas is required".to_string(),
            ));
        }
        if hpa.metrics.is_empty() {
            return Err(Error::Validation(
                "spec.scale.hpa.metrics must not be empty".to_string(),
            ));
        }
    }

    if spec.service_name.is_none()
        && matches!(
            spec.traffic.source,
            TrafficSource::Service | TrafficSource::KanaryService | TrafficSource::Both
        )
    {
        return Err(Error::Validation(format!(
            "traffic source {} requires spec.serviceName",
            spec.traffic.source
        )));
    }

    validate_durations(spec)?;

    if spec.validations.items.is_empty() {
        return Err(Error::Validation(
            "spec.validations.items must carry at least one validator".to_string(),
        ));
    }
    for (index, item) in spec.validations.items.iter().enumerate() {
        validate_item(index, item)?;
    }

    Ok(())
}

fn validate_durations(spec: &CanaryRolloutSpec) -> Result<()> {
    for (field, value) in [
        ("validationPeriod", &spec.validations.validation_period),
        ("maxIntervalPeriod", &spec.validations.max_interval_period),
        ("initialDelay", &spec.validations.initial_delay),
    ] {
        if let Some(value) = value.as_deref() {
            humantime::parse_duration(value).map_err(|err| {
                Error::Validation(format!(
                    "spec.validations.{} {:?} is not a duration: {}",
                    field, value, err
                ))
            })?;
        }
    }
    Ok(())
}

fn validate_item(index: usize, item: &ValidationSpec) -> Result<()> {
    let shapes = [
        item.manual.is_some(),
        item.label_watch.is_some(),
        item.prom_ql.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if shapes != 1 {
        return Err(Error::Validation(format!(
            "spec.validations.items[{}] must carry exactly one of manual, labelWatch or promQL",
            index
        )));
    }

    if let Some(promql) = item.prom_ql.as_ref() {
        if let Some(continuous) = promql.continuous_value_deviation.as_ref() {
            match continuous.max_deviation_percent {
                Some(percent) if percent > 0.0 => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "spec.validations.items[{}].promQL.continuousValueDeviation.maxDeviationPercent \
                         must be strictly positive",
                        index
                    )));
                }
            }
        }
        if let Some(discrete) = promql.discrete_value_out_of_list.as_ref() {
            if discrete.good_values.is_empty() == discrete.bad_values.is_empty() {
                return Err(Error::Validation(format!(
                    "spec.validations.items[{}].promQL.discreteValueOutOfList needs exactly one of \
                     goodValues or badValues",
                    index
                )));
            }
        }
    }

    Ok(())
}
