//! Shared builders for functional tests.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use kanary_operator::crd::{
    CanaryRollout, CanaryRolloutSpec, DeploymentTemplate, ManualValidation, ScaleSpec,
    StaticScale, TrafficSource, TrafficSpec, ValidationSpec, ValidationsSpec,
};
use kanary_operator::validation::DeadlineStatus;

/// A fixed instant for deterministic time math.
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Selector labels shared by the template fixtures.
pub fn app_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), "web".to_string());
    labels
}

/// A minimal but valid Deployment template for a rollout.
pub fn web_template() -> DeploymentTemplate {
    DeploymentTemplate {
        metadata: Some(ObjectMeta {
            name: Some("web".to_string()),
            labels: Some(app_labels()),
            ..Default::default()
        }),
        spec: Some(DeploymentSpec {
            replicas: Some(3),
            selector: LabelSelector {
                match_labels: Some(app_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels()),
                    ..Default::default()
                }),
                spec: None,
            },
            ..Default::default()
        }),
    }
}

/// A rollout with a manual validator, the default static scale, and the
/// given traffic source.
pub fn rollout_with_traffic(name: &str, source: TrafficSource) -> CanaryRollout {
    let spec = CanaryRolloutSpec {
        deployment_name: Some("web".to_string()),
        service_name: Some("web".to_string()),
        template: web_template(),
        scale: ScaleSpec {
            static_: Some(StaticScale { replicas: Some(1) }),
            hpa: None,
        },
        traffic: TrafficSpec {
            source,
            kanary_service: None,
            mirror: None,
        },
        validations: ValidationsSpec {
            validation_period: Some("15m".to_string()),
            max_interval_period: Some("20s".to_string()),
            items: vec![ValidationSpec {
                manual: Some(ManualValidation::default()),
                ..Default::default()
            }],
            ..Default::default()
        },
        schedule: None,
    };
    let mut rollout = CanaryRollout::new(name, spec);
    rollout.metadata.namespace = Some("default".to_string());
    rollout
}

/// A deadline with the given time left in the window.
pub fn open_deadline(remaining: Duration) -> DeadlineStatus {
    DeadlineStatus {
        deadline: reference_time() + chrono::Duration::from_std(remaining).unwrap(),
        reached: false,
        remaining,
    }
}

/// A deadline whose window already closed.
pub fn closed_deadline() -> DeadlineStatus {
    DeadlineStatus {
        deadline: reference_time(),
        reached: true,
        remaining: Duration::ZERO,
    }
}
