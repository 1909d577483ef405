//! CanaryRollout Custom Resource Definition.
//!
//! Defines the CanaryRollout CRD driving progressive rollouts: a pod template
//! to promote, a scale strategy for the canary, a traffic source, and a list
//! of validations evaluated over a bounded window.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::autoscaling::v2::MetricSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CanaryRollout is a custom resource describing a progressive rollout of a
/// Deployment template.
///
/// Example:
/// ```yaml
/// apiVersion: kanary.k8s.io/v1alpha1
/// kind: CanaryRollout
/// metadata:
///   name: my-app
/// spec:
///   serviceName: my-app
///   template:
///     spec:
///       template:
///         spec:
///           containers:
///           - name: main
///             image: my-app:v2
///   traffic:
///     source: both
///   validations:
///     validationPeriod: 15m
///     items:
///     - promQL:
///         prometheusService: prometheus.monitoring.svc:9090
///         query: rate(http_errors_total[1m])
///         valueInRange:
///           min: 0.0
///           max: 0.1
/// ```
#[derive(CustomResource, Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kanary.k8s.io",
    version = "v1alpha1",
    kind = "CanaryRollout",
    plural = "canaryrollouts",
    shortname = "kry",
    status = "CanaryRolloutStatus",
    namespaced,
    // Print columns for kubectl get
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.report.status"}"#,
    printcolumn = r#"{"name":"Deployment", "type":"string", "jsonPath":".spec.deploymentName"}"#,
    printcolumn = r#"{"name":"Service", "type":"string", "jsonPath":".spec.serviceName"}"#,
    printcolumn = r#"{"name":"Scale", "type":"string", "jsonPath":".status.report.scale"}"#,
    printcolumn = r#"{"name":"Traffic", "type":"string", "jsonPath":".status.report.traffic"}"#,
    printcolumn = r#"{"name":"Validation", "type":"string", "jsonPath":".status.report.validation"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CanaryRolloutSpec {
    /// Name of the primary Deployment to evolve.
    /// Defaults to the template's metadata name, then the CanaryRollout name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,

    /// Name of the primary Service through which live traffic enters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Deployment template used for the canary and, on promotion, written
    /// into the primary Deployment.
    pub template: DeploymentTemplate,

    /// Canary replica count strategy.
    #[serde(default)]
    pub scale: ScaleSpec,

    /// How canary pods receive traffic.
    #[serde(default)]
    pub traffic: TrafficSpec,

    /// Validation window and validators.
    #[serde(default)]
    pub validations: ValidationsSpec,

    /// RFC3339 wall-clock time gating the rollout start.
    /// Empty means start immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// Embedded Deployment template: object metadata plus a DeploymentSpec.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTemplate {
    /// Metadata carried onto the created Deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,

    /// Desired Deployment spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<DeploymentSpec>,
}

/// Canary replica count strategy. Exactly one variant must be set.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScaleSpec {
    /// Fixed replica count for the canary.
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub static_: Option<StaticScale>,

    /// Autoscaled canary via a HorizontalPodAutoscaler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hpa: Option<HpaScale>,
}

/// Fixed canary replica count.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StaticScale {
    /// Number of canary replicas (default 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// HorizontalPodAutoscaler-driven canary scale.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HpaScale {
    /// Lower bound for the autoscaler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    /// Upper bound for the autoscaler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    /// Metrics driving the autoscaler.
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

/// How canary pods receive traffic.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSpec {
    /// Traffic source for canary pods.
    #[serde(default)]
    pub source: TrafficSource,

    /// Name for the dedicated kanary Service.
    /// Defaults to `<serviceName>-kanary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kanary_service: Option<String>,

    /// Mirrored-traffic settings (reserved for a mesh adapter).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<MirrorSpec>,
}

/// Source of traffic reaching canary pods.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficSource {
    /// Canary pods receive no traffic.
    #[default]
    None,
    /// Canary pods receive live traffic through the primary Service.
    Service,
    /// Canary pods receive traffic only through a dedicated kanary Service.
    KanaryService,
    /// Both the primary Service and a dedicated kanary Service.
    Both,
    /// Mirrored traffic (reserved; behaves as isolation plus cleanup).
    Mirror,
}

impl std::fmt::Display for TrafficSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrafficSource::None => write!(f, "none"),
            TrafficSource::Service => write!(f, "service"),
            TrafficSource::KanaryService => write!(f, "kanary-service"),
            TrafficSource::Both => write!(f, "both"),
            TrafficSource::Mirror => write!(f, "mirror"),
        }
    }
}

impl std::str::FromStr for TrafficSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(TrafficSource::None),
            "service" => Ok(TrafficSource::Service),
            "kanary-service" => Ok(TrafficSource::KanaryService),
            "both" => Ok(TrafficSource::Both),
            "mirror" => Ok(TrafficSource::Mirror),
            other => Err(format!("unknown traffic source '{}'", other)),
        }
    }
}

/// Mirrored-traffic settings. Placeholder until a mesh adapter exists.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MirrorSpec {
    /// Share of traffic to mirror, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<i32>,
}

/// Validation window configuration plus the list of validators.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationsSpec {
    /// Delay before validations start counting, as a human duration ("30s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay: Option<String>,

    /// Length of the validation window (default "15m").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_period: Option<String>,

    /// Upper bound between two reconciliations of a running rollout
    /// (default "20s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_interval_period: Option<String>,

    /// When true, a successful validation does not update the primary
    /// Deployment (dry-run promotion).
    #[serde(default)]
    pub no_update: bool,

    /// Validators, each carrying exactly one validator shape.
    #[serde(default)]
    pub items: Vec<ValidationSpec>,
}

/// Default validation window length.
pub const DEFAULT_VALIDATION_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Default cap between two reconciliations of a running rollout.
pub const DEFAULT_MAX_INTERVAL_PERIOD: Duration = Duration::from_secs(20);

impl ValidationsSpec {
    /// Parsed validation window length.
    pub fn validation_period(&self) -> Duration {
        parse_duration_or(self.validation_period.as_deref(), DEFAULT_VALIDATION_PERIOD)
    }

    /// Parsed reconciliation interval cap.
    pub fn max_interval_period(&self) -> Duration {
        parse_duration_or(
            self.max_interval_period.as_deref(),
            DEFAULT_MAX_INTERVAL_PERIOD,
        )
    }

    /// Parsed initial delay, zero when unset.
    pub fn initial_delay(&self) -> Duration {
        parse_duration_or(self.initial_delay.as_deref(), Duration::ZERO)
    }
}

fn parse_duration_or(value: Option<&str>, fallback: Duration) -> Duration {
    value
        .and_then(|v| humantime::parse_duration(v).ok())
        .unwrap_or(fallback)
}

/// One validator. Exactly one of the shapes must be set.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSpec {
    /// Human-gated validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<ManualValidation>,

    /// Label-driven invalidation of the canary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_watch: Option<LabelWatchValidation>,

    /// Metric-driven validation through the anomaly detector.
    #[serde(rename = "promQL", default, skip_serializing_if = "Option::is_none")]
    pub prom_ql: Option<PromQLValidation>,
}

impl ValidationSpec {
    /// Short name of the configured validator, for reports.
    pub fn kind(&self) -> &'static str {
        if self.manual.is_some() {
            "manual"
        } else if self.label_watch.is_some() {
            "labelWatch"
        } else if self.prom_ql.is_some() {
            "promQL"
        } else {
            "unknown"
        }
    }
}

/// Human-gated validation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualValidation {
    /// Explicit user verdict, checked on every reconcile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ManualStatus>,

    /// Verdict applied when the deadline is reached without an explicit
    /// `status` (default: none, keep waiting).
    #[serde(default)]
    pub status_after_deadline: ManualDeadlineStatus,
}

/// Explicit manual verdict.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ManualStatus {
    Valid,
    Invalid,
}

/// Verdict applied at the deadline when no explicit status was given.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ManualDeadlineStatus {
    #[default]
    None,
    Valid,
    Invalid,
}

/// Label-driven invalidation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelWatchValidation {
    /// Labels that invalidate the rollout when present on the canary
    /// Deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_invalidation_labels: Option<BTreeMap<String, String>>,

    /// Labels that invalidate the rollout when present on any canary pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_invalidation_labels: Option<BTreeMap<String, String>>,
}

/// Metric-driven validation. Exactly one analysis shape must be set.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromQLValidation {
    /// Host:port of the metric store exposing the instant-query API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_service: Option<String>,

    /// Instant query producing per-pod samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Time-series label binding a sample to a pod (default "pod").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name_key: Option<String>,

    /// When true the query covers the whole canary set and its single
    /// result is broadcast to every pod.
    #[serde(default)]
    pub all_pods_query: bool,

    /// Per-pod value must stay within [min, max].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_in_range: Option<ValueInRangeAnalysis>,

    /// Per-pod label values counted against good/bad lists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discrete_value_out_of_list: Option<DiscreteValueOutOfListAnalysis>,

    /// Per-pod deviation from a target value of 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuous_value_deviation: Option<ContinuousValueDeviationAnalysis>,

    /// URI of a custom anomaly service returning the out-of-bounds pod list
    /// directly, bypassing the metric pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_service: Option<String>,
}

/// Default label used to bind a time-series sample to a pod.
pub const DEFAULT_POD_NAME_KEY: &str = "pod";

impl PromQLValidation {
    /// Label binding a sample to a pod.
    pub fn pod_name_key(&self) -> &str {
        self.pod_name_key.as_deref().unwrap_or(DEFAULT_POD_NAME_KEY)
    }
}

/// Counts of discrete label values against good/bad lists.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscreteValueOutOfListAnalysis {
    /// Time-series label whose values are classified.
    pub key: String,

    /// Values considered healthy. Mutually exclusive with `badValues`.
    #[serde(default)]
    pub good_values: Vec<String>,

    /// Values considered unhealthy. Mutually exclusive with `goodValues`.
    #[serde(default)]
    pub bad_values: Vec<String>,

    /// Percentage of bad samples a pod may emit before being flagged
    /// (default 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_percent: Option<u32>,
}

impl DiscreteValueOutOfListAnalysis {
    /// Tolerated percentage of bad samples.
    pub fn tolerance_percent(&self) -> u32 {
        self.tolerance_percent.unwrap_or(0)
    }
}

/// Deviation from a target value of 1.0.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContinuousValueDeviationAnalysis {
    /// Maximum tolerated deviation, in percent. Must be strictly positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_deviation_percent: Option<f64>,
}

/// Per-pod value bounds.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValueInRangeAnalysis {
    /// Inclusive lower bound.
    pub min: f64,

    /// Inclusive upper bound.
    pub max: f64,
}

/// Status of a CanaryRollout.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CanaryRolloutStatus {
    /// Template hash stamped on the current canary Deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<String>,

    /// Conditions describing the rollout lifecycle.
    #[serde(default)]
    pub conditions: Vec<RolloutCondition>,

    /// Flattened coarse report for kubectl columns.
    #[serde(default)]
    pub report: RolloutReport,
}

/// Flattened coarse labels describing the rollout.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutReport {
    /// Lifecycle summary (Scheduled, Running, Succeeded, Failed).
    #[serde(default)]
    pub status: String,

    /// Comma-joined validator kinds.
    #[serde(default)]
    pub validation: String,

    /// Scale strategy in use ("static" or "hpa").
    #[serde(default)]
    pub scale: String,

    /// Traffic source in use.
    #[serde(default)]
    pub traffic: String,
}

/// Lifecycle condition types of a CanaryRollout.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum RolloutConditionType {
    /// The schedule gate let the rollout through (or rejected it).
    Scheduled,
    /// The validation window is open and strategies are active.
    Running,
    /// The rollout validated and, unless noUpdate, the primary was rolled.
    Succeeded,
    /// A validator invalidated the rollout.
    Failed,
    /// A transient error occurred during the last reconcile.
    Errored,
    /// The primary Deployment template was updated from the rollout template.
    DeploymentUpdated,
}

impl std::fmt::Display for RolloutConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RolloutConditionType::Scheduled => write!(f, "Scheduled"),
            RolloutConditionType::Running => write!(f, "Running"),
            RolloutConditionType::Succeeded => write!(f, "Succeeded"),
            RolloutConditionType::Failed => write!(f, "Failed"),
            RolloutConditionType::Errored => write!(f, "Errored"),
            RolloutConditionType::DeploymentUpdated => write!(f, "DeploymentUpdated"),
        }
    }
}

/// Condition describes one aspect of the rollout state.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutCondition {
    /// Type of condition.
    pub r#type: RolloutConditionType,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Last time this condition was refreshed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
    /// Last time the condition flipped between True and False.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Human-readable message indicating details about last transition.
    #[serde(default)]
    pub message: String,
}

impl RolloutCondition {
    /// Create a new condition with both timestamps set to now.
    pub fn new(condition_type: RolloutConditionType, status: bool, message: &str) -> Self {
        let now = jiff::Timestamp::now().to_string();
        Self {
            r#type: condition_type,
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            last_update_time: Some(now.clone()),
            last_transition_time: Some(now),
            message: message.to_string(),
        }
    }

    /// Whether the condition currently holds.
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}
