//! kanary - companion CLI for the kanary-operator.
//!
//! `kanary generate` builds a CanaryRollout manifest from a live Deployment;
//! `kanary get` renders the rollouts of a namespace as a table.
//!
//! Exit codes: 0 on success, 1 on usage errors, 2 on Kubernetes API errors.

use std::process::ExitCode;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use prettytable::{Table, format, row};

use kanary_operator::crd::{
    CanaryRollout, CanaryRolloutSpec, DeploymentTemplate, LabelWatchValidation, ManualValidation,
    PromQLValidation, ScaleSpec, StaticScale, TrafficSource, TrafficSpec, ValidationSpec,
    ValidationsSpec, defaulting,
};
use kanary_operator::resources::common::{deployment_name, kanary_service_name};

#[derive(Parser, Debug)]
#[command(name = "kanary", about = "Manage CanaryRollout resources", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a CanaryRollout manifest from a live Deployment
    Generate {
        /// Name of the Deployment to roll out
        deployment: String,

        /// Namespace of the Deployment
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Name of the primary Service carrying live traffic
        #[arg(long)]
        service: Option<String>,

        /// Scale strategy for the canary
        #[arg(long, value_enum, default_value_t = ScaleKind::Static)]
        scale: ScaleKind,

        /// Traffic source for canary pods
        #[arg(long, default_value = "none")]
        traffic: TrafficSource,

        /// Validator to seed the rollout with
        #[arg(long, value_enum, default_value_t = ValidatorKind::Manual)]
        validation: ValidatorKind,

        /// Validation window length, as a human duration
        #[arg(long, default_value = "15m")]
        validation_period: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,
    },
    /// List CanaryRollouts and their state
    Get {
        /// Rollout name; all rollouts of the namespace when omitted
        name: Option<String>,

        /// Namespace to query
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScaleKind {
    Static,
    Hpa,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ValidatorKind {
    Manual,
    Labelwatch,
    Promql,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Clap exits 2 on bad usage when left to its own devices; fold those
    // into exit code 1 and keep 2 for API failures.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let usage_error = err.use_stderr();
            let _ = err.print();
            return if usage_error {
                ExitCode::from(1)
            } else {
                // --help and --version land here.
                ExitCode::SUCCESS
            };
        }
    };

    let result = match cli.command {
        Command::Generate {
            deployment,
            namespace,
            service,
            scale,
            traffic,
            validation,
            validation_period,
            output,
        } => {
            if let Err(message) = validate_args(&traffic, &service, &validation_period) {
                eprintln!("{}", message);
                return ExitCode::from(1);
            }
            generate(
                &deployment,
                &namespace,
                service,
                scale,
                traffic,
                validation,
                &validation_period,
                output,
            )
            .await
        }
        Command::Get { name, namespace } => get(name.as_deref(), &namespace).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(2)
        }
    }
}

fn validate_args(
    traffic: &TrafficSource,
    service: &Option<String>,
    validation_period: &str,
) -> Result<(), String> {
    if service.is_none()
        && matches!(
            traffic,
            TrafficSource::Service | TrafficSource::KanaryService | TrafficSource::Both
        )
    {
        return Err(format!("traffic source {} requires --service", traffic));
    }
    humantime::parse_duration(validation_period)
        .map_err(|err| format!("invalid --validation-period: {}", err))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn generate(
    deployment: &str,
    namespace: &str,
    service: Option<String>,
    scale: ScaleKind,
    traffic: TrafficSource,
    validation: ValidatorKind,
    validation_period: &str,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::try_default().await?;
    let deployments: Api<Deployment> = Api::namespaced(client, namespace);
    let live = deployments.get(deployment).await?;

    let spec = CanaryRolloutSpec {
        deployment_name: Some(deployment.to_string()),
        service_name: service,
        template: DeploymentTemplate {
            metadata: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: live.metadata.name.clone(),
                labels: live.metadata.labels.clone(),
                ..Default::default()
            }),
            spec: live.spec.clone(),
        },
        scale: match scale {
            ScaleKind::Static => ScaleSpec {
                static_: Some(StaticScale { replicas: Some(1) }),
                hpa: None,
            },
            ScaleKind::Hpa => ScaleSpec {
                static_: None,
                hpa: Some(Default::default()),
            },
        },
        traffic: TrafficSpec {
            source: traffic,
            kanary_service: None,
            mirror: None,
        },
        validations: ValidationsSpec {
            validation_period: Some(validation_period.to_string()),
            items: vec![match validation {
                ValidatorKind::Manual => ValidationSpec {
                    manual: Some(ManualValidation::default()),
                    ..Default::default()
                },
                ValidatorKind::Labelwatch => ValidationSpec {
                    label_watch: Some(LabelWatchValidation::default()),
                    ..Default::default()
                },
                ValidatorKind::Promql => ValidationSpec {
                    prom_ql: Some(PromQLValidation::default()),
                    ..Default::default()
                },
            }],
            ..Default::default()
        },
        schedule: None,
    };

    let mut rollout = CanaryRollout::new(deployment, defaulting::default_spec(&spec));
    rollout.metadata.namespace = Some(namespace.to_string());

    let rendered = match output {
        OutputFormat::Yaml => serde_yaml::to_string(&rollout)?,
        OutputFormat::Json => serde_json::to_string_pretty(&rollout)?,
    };
    println!("{}", rendered);
    Ok(())
}

async fn get(name: Option<&str>, namespace: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::try_default().await?;
    let api: Api<CanaryRollout> = Api::namespaced(client, namespace);

    let rollouts = match name {
        Some(name) => vec![api.get(name).await?],
        None => api.list(&ListParams::default()).await?.items,
    };

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.set_titles(row![
        "NAMESPACE",
        "NAME",
        "STATUS",
        "DEPLOYMENT",
        "SERVICE",
        "SCALE",
        "TRAFFIC",
        "VALIDATION",
        "DURATION"
    ]);

    for rollout in &rollouts {
        let report = rollout
            .status
            .as_ref()
            .map(|s| s.report.clone())
            .unwrap_or_default();
        table.add_row(row![
            rollout.namespace().unwrap_or_default(),
            rollout.name_any(),
            if report.status.is_empty() {
                "Created".to_string()
            } else {
                report.status
            },
            deployment_name(rollout),
            rollout
                .spec
                .service_name
                .clone()
                .unwrap_or_else(|| kanary_service_name(rollout)),
            report.scale,
            report.traffic,
            report.validation,
            age(rollout),
        ]);
    }
    table.printstd();
    Ok(())
}

fn age(rollout: &CanaryRollout) -> String {
    let Some(created) = rollout.metadata.creation_timestamp.as_ref() else {
        return "-".to_string();
    };
    let elapsed = (Utc::now() - created.0).to_std().unwrap_or(Duration::ZERO);
    // Truncate to whole seconds for a stable column.
    humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}
