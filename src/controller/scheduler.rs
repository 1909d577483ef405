//! Schedule gate: delay the rollout start to a wall-clock instant.
//!
//! `spec.schedule` is an RFC3339 timestamp. An empty schedule starts the
//! rollout immediately. A schedule more than one minute in the past is
//! rejected for good: a rollout that missed its window must not fire at some
//! arbitrary later time (an operator restart, say).

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Grace period for a schedule that is already in the past.
pub const SCHEDULE_GRACE: Duration = Duration::from_secs(60);

/// Outcome of the schedule gate for one reconcile pass.
#[derive(Clone, Debug, PartialEq)]
pub enum ScheduleGate {
    /// The rollout may start now.
    Ready,
    /// The schedule lies in the future; come back then.
    Wait(Duration),
    /// The schedule can never be honored (terminal).
    Rejected(String),
}

/// Message carried by the Scheduled condition: the RFC3339 instant when one
/// is set, "on the fly" for a rollout that starts immediately.
pub fn schedule_condition_message(schedule: Option<&str>) -> String {
    match schedule {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => "on the fly".to_string(),
    }
}

/// Evaluate the schedule gate.
///
/// `already_scheduled` reflects the Scheduled condition: once a rollout has
/// been let through, a stale schedule in its spec no longer rejects it.
pub fn evaluate_schedule(
    schedule: Option<&str>,
    already_scheduled: bool,
    now: DateTime<Utc>,
) -> ScheduleGate {
    let schedule = match schedule {
        Some(s) if !s.trim().is_empty() => s.trim(),
        _ => return ScheduleGate::Ready,
    };

    let start = match DateTime::parse_from_rfc3339(schedule) {
        Ok(start) => start.with_timezone(&Utc),
        Err(err) => {
            return ScheduleGate::Rejected(format!(
                "schedule {:?} is not a valid RFC3339 timestamp: {}",
                schedule, err
            ));
        }
    };

    if start > now {
        let wait = (start - now).to_std().unwrap_or(Duration::ZERO);
        return ScheduleGate::Wait(wait);
    }

    if already_scheduled {
        return ScheduleGate::Ready;
    }

    let late = (now - start).to_std().unwrap_or(Duration::ZERO);
    if late <= SCHEDULE_GRACE {
        ScheduleGate::Ready
    } else {
        ScheduleGate::Rejected(format!(
            "schedule {} missed by more than the {}s grace period",
            schedule,
            SCHEDULE_GRACE.as_secs()
        ))
    }
}
