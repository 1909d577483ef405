//! Reconciliation loop for CanaryRollout.
//!
//! One pass works through the rollout lifecycle in order: defaulting,
//! spec validation, the schedule gate, child-object materialization, the
//! scale and traffic strategies, and finally the validators. The first step
//! that needs to wait short-circuits the pass with a requeue.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    Api, ResourceExt,
    api::{DeleteParams, Patch, PatchParams, PostParams},
    runtime::controller::Action,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::{
    controller::{
        context::{Context, FIELD_MANAGER},
        error::Error,
        scheduler::{ScheduleGate, evaluate_schedule, schedule_condition_message},
        spec_validation::validate_spec,
        status,
    },
    crd::{
        CanaryRollout, CanaryRolloutStatus, RolloutCondition, RolloutConditionType, defaulting,
    },
    resources::{
        common::{canary_deployment_name, deployment_name, template_hash},
        deployment::{
            deployment_template_hash, generate_canary_deployment, generate_primary_deployment,
        },
    },
    scale::ScaleStrategy,
    traffic::TrafficStrategy,
    validation::{build_validators, clamp_requeue, compute_status, deadline_status},
};

/// Requeue delay after a pass that changed a child object.
const SETTLE_REQUEUE: Duration = Duration::from_secs(1);

/// Reconcile a CanaryRollout
///
/// This is the main reconciliation function called by the controller.
pub async fn reconcile(rollout: Arc<CanaryRollout>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = rollout.name_any();
    let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling CanaryRollout");

    // Child objects are owned by the rollout, so deletion cascades without a
    // finalizer.
    if rollout.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    // Write the defaulted spec back once, then work on the stored form.
    if !defaulting::is_defaulted(&rollout.spec) {
        info!(name = %name, "Writing defaulted spec back");
        let api: Api<CanaryRollout> = Api::namespaced(ctx.client.clone(), &namespace);
        let defaulted = defaulting::default_spec(&rollout.spec);
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&json!({"spec": defaulted})),
        )
        .await?;
        return Ok(Action::requeue(SETTLE_REQUEUE));
    }

    let mut new_status = rollout.status.clone().unwrap_or_default();
    let was_terminal = status::is_terminal(&new_status);
    let outcome = reconcile_inner(&rollout, &ctx, &mut new_status).await;

    if let Err(err) = &outcome {
        status::set_condition(
            &mut new_status.conditions,
            RolloutCondition::new(RolloutConditionType::Errored, true, &err.to_string()),
        );
    } else if status::is_running(&new_status) {
        status::set_condition(
            &mut new_status.conditions,
            RolloutCondition::new(RolloutConditionType::Errored, false, ""),
        );
    }
    new_status.report = status::build_report(&rollout, &new_status);

    write_status(&rollout, &ctx, &new_status).await?;

    if let Some(health_state) = ctx.health_state.as_ref() {
        let duration = start_time.elapsed().as_secs_f64();
        health_state
            .metrics
            .record_reconcile(&namespace, &name, duration);
        if !was_terminal && status::is_terminal(&new_status) {
            health_state
                .metrics
                .record_rollout_finished(status::lifecycle_label(&new_status));
        }
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        health_state
            .last_reconcile
            .store(now_secs, Ordering::Relaxed);
    }

    outcome
}

async fn reconcile_inner(
    rollout: &CanaryRollout,
    ctx: &Context,
    new_status: &mut CanaryRolloutStatus,
) -> Result<Action, Error> {
    let name = rollout.name_any();
    let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());

    // A spec only the user can fix fails the rollout outright instead of
    // cycling through the Errored condition and the retry backoff.
    if let Err(err) = validate_spec(&rollout.spec) {
        error!(name = %name, error = %err, "Spec validation failed");
        ctx.publish_warning_event(rollout, "ValidationFailed", "Validating", Some(err.to_string()))
            .await;
        status::set_condition(
            &mut new_status.conditions,
            RolloutCondition::new(RolloutConditionType::Failed, true, &err.to_string()),
        );
        return Ok(Action::await_change());
    }

    let scale = ScaleStrategy::from_spec(&rollout.spec.scale)?;
    let traffic = TrafficStrategy::from_source(rollout.spec.traffic.source);

    // Schedule gate.
    let schedule_message = schedule_condition_message(rollout.spec.schedule.as_deref());
    match evaluate_schedule(
        rollout.spec.schedule.as_deref(),
        status::is_scheduled(new_status),
        Utc::now(),
    ) {
        ScheduleGate::Ready => {
            status::set_condition(
                &mut new_status.conditions,
                RolloutCondition::new(RolloutConditionType::Scheduled, true, &schedule_message),
            );
        }
        ScheduleGate::Wait(wait) => {
            // The rollout is accepted now even though it fires later, so the
            // Scheduled condition goes up before the wait.
            status::set_condition(
                &mut new_status.conditions,
                RolloutCondition::new(RolloutConditionType::Scheduled, true, &schedule_message),
            );
            debug!(name = %name, wait_secs = wait.as_secs(), "Waiting for schedule");
            return Ok(Action::requeue(wait.max(SETTLE_REQUEUE)));
        }
        ScheduleGate::Rejected(message) => {
            warn!(name = %name, message = %message, "Schedule can no longer be honored");
            ctx.publish_warning_event(rollout, "ScheduleMissed", "Scheduling", Some(message.clone()))
                .await;
            status::set_condition(
                &mut new_status.conditions,
                RolloutCondition::new(RolloutConditionType::Failed, true, &message),
            );
            return finish_terminal(rollout, ctx, &scale, &traffic).await;
        }
    }

    // A terminal rollout only converges its teardown.
    if status::is_terminal(new_status) {
        return finish_terminal(rollout, ctx, &scale, &traffic).await;
    }

    let hash = template_hash(&rollout.spec.template)?;
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);

    // Primary materialization: a rollout may predate its Deployment.
    let primary_name = deployment_name(rollout);
    if deployments.get_opt(&primary_name).await?.is_none() {
        info!(name = %name, deployment = %primary_name, "Creating primary deployment");
        let primary = generate_primary_deployment(rollout, &hash);
        deployments.create(&PostParams::default(), &primary).await?;
        ctx.publish_normal_event(
            rollout,
            "PrimaryCreated",
            "Materializing",
            Some(format!("created primary deployment {}", primary_name)),
        )
        .await;
    }

    // Canary materialization and template-drift detection.
    let canary_name = canary_deployment_name(rollout);
    let canary = match deployments.get_opt(&canary_name).await? {
        None => {
            info!(name = %name, deployment = %canary_name, "Creating canary deployment");
            let canary = generate_canary_deployment(rollout, &hash);
            deployments.create(&PostParams::default(), &canary).await?;
            new_status.current_hash = Some(hash.clone());
            ctx.publish_normal_event(
                rollout,
                "CanaryCreated",
                "Materializing",
                Some(format!("created canary deployment {}", canary_name)),
            )
            .await;
            return Ok(Action::requeue(SETTLE_REQUEUE));
        }
        Some(canary) => {
            if deployment_template_hash(&canary) != Some(hash.as_str()) {
                info!(name = %name, deployment = %canary_name, "Template drifted, recreating canary");
                deployments
                    .delete(&canary_name, &DeleteParams::default())
                    .await?;
                new_status.current_hash = None;
                return Ok(Action::requeue(SETTLE_REQUEUE));
            }
            canary
        }
    };

    if let Some(health_state) = ctx.health_state.as_ref() {
        let replicas = canary.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        health_state
            .metrics
            .set_canary_replicas(&namespace, &name, i64::from(replicas));
    }

    // Scale, then traffic; either may need a settle pass.
    if scale.reconcile(&ctx.client, rollout, &canary).await? {
        return Ok(Action::requeue(SETTLE_REQUEUE));
    }
    if traffic.reconcile(&ctx.client, rollout).await? {
        return Ok(Action::requeue(SETTLE_REQUEUE));
    }

    // The validation window opens after the initial delay and closes a
    // validation period later.
    let canary_created = canary
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|t| t.0)
        .unwrap_or_else(Utc::now);
    let window_open = canary_created
        + chrono::Duration::from_std(rollout.spec.validations.initial_delay())
            .unwrap_or_else(|_| chrono::Duration::zero());
    let now = Utc::now();
    if now < window_open {
        status::set_condition(
            &mut new_status.conditions,
            RolloutCondition::new(RolloutConditionType::Running, true, "waiting for initial delay"),
        );
        let wait = (window_open - now).to_std().unwrap_or(SETTLE_REQUEUE);
        return Ok(Action::requeue(wait.max(SETTLE_REQUEUE)));
    }

    let deadline = deadline_status(window_open, rollout.spec.validations.validation_period(), now);

    let validators = build_validators(rollout)?;
    let mut results = Vec::with_capacity(validators.len());
    for validator in &validators {
        results.push(
            validator
                .validate(&ctx.client, rollout, &canary, &deadline)
                .await?,
        );
    }
    let aggregated = compute_status(&results);

    if let Some(message) = aggregated.failure_message {
        warn!(name = %name, message = %message, "Rollout invalidated");
        ctx.publish_warning_event(rollout, "RolloutFailed", "Validating", Some(message.clone()))
            .await;
        status::set_condition(
            &mut new_status.conditions,
            RolloutCondition::new(RolloutConditionType::Failed, true, &message),
        );
        // The canary deployment is kept around for debugging.
        return finish_terminal(rollout, ctx, &scale, &traffic).await;
    }

    if aggregated.force_success || aggregated.need_update {
        return promote(rollout, ctx, new_status, &scale, &traffic, &hash).await;
    }

    // Still inside the window.
    status::set_condition(
        &mut new_status.conditions,
        RolloutCondition::new(RolloutConditionType::Running, true, "validation window open"),
    );
    let requeue = clamp_requeue(
        aggregated.requeue_after.unwrap_or(deadline.remaining),
        rollout.spec.validations.max_interval_period(),
    );
    Ok(Action::requeue(requeue.max(SETTLE_REQUEUE)))
}

/// Close out a validated rollout: update the primary unless the rollout is a
/// dry run, then tear the canary machinery down.
async fn promote(
    rollout: &CanaryRollout,
    ctx: &Context,
    new_status: &mut CanaryRolloutStatus,
    scale: &ScaleStrategy,
    traffic: &TrafficStrategy,
    hash: &str,
) -> Result<Action, Error> {
    let name = rollout.name_any();
    let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
    let primary_name = deployment_name(rollout);

    if rollout.spec.validations.no_update {
        info!(name = %name, "Validated (noUpdate set, primary left untouched)");
    } else {
        info!(name = %name, deployment = %primary_name, "Promoting template to primary deployment");
        let desired = generate_primary_deployment(rollout, hash);
        deployments
            .patch(
                &primary_name,
                &PatchParams::default(),
                &Patch::Merge(&json!({
                    "metadata": {"annotations": desired.metadata.annotations},
                    "spec": desired.spec,
                })),
            )
            .await?;
        status::set_condition(
            &mut new_status.conditions,
            RolloutCondition::new(
                RolloutConditionType::DeploymentUpdated,
                true,
                "primary deployment updated from template",
            ),
        );
    }

    status::set_condition(
        &mut new_status.conditions,
        RolloutCondition::new(RolloutConditionType::Succeeded, true, "rollout validated"),
    );
    ctx.publish_normal_event(
        rollout,
        "RolloutSucceeded",
        "Promoting",
        Some("canary validated".to_string()),
    )
    .await;

    // A validated canary has served its purpose.
    let canary_name = canary_deployment_name(rollout);
    if deployments.get_opt(&canary_name).await?.is_some() {
        info!(name = %name, deployment = %canary_name, "Deleting canary deployment");
        deployments
            .delete(&canary_name, &DeleteParams::default())
            .await?;
    }

    finish_terminal(rollout, ctx, scale, traffic).await
}

/// Converge the teardown of a terminal rollout.
async fn finish_terminal(
    rollout: &CanaryRollout,
    ctx: &Context,
    scale: &ScaleStrategy,
    traffic: &TrafficStrategy,
) -> Result<Action, Error> {
    scale.clear(&ctx.client, rollout).await?;
    if traffic.cleanup(&ctx.client, rollout).await? {
        return Ok(Action::requeue(SETTLE_REQUEUE));
    }
    Ok(Action::await_change())
}

/// Patch the status subresource when something other than a refresh
/// timestamp changed.
async fn write_status(
    rollout: &CanaryRollout,
    ctx: &Context,
    new_status: &CanaryRolloutStatus,
) -> Result<(), Error> {
    let current = rollout.status.clone().unwrap_or_default();
    if !status::status_changed(&current, new_status) {
        return Ok(());
    }

    let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<CanaryRollout> = Api::namespaced(ctx.client.clone(), &namespace);
    api.patch_status(
        &rollout.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&json!({"status": new_status})),
    )
    .await?;
    Ok(())
}

/// Error policy for the controller
pub fn error_policy(rollout: Arc<CanaryRollout>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = rollout.name_any();
    let namespace = rollout.namespace().unwrap_or_else(|| "default".to_string());

    if let Some(health_state) = ctx.health_state.as_ref() {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}
