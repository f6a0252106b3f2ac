//! # Conditions
//!
//! Condition helpers and the failure decay policy.
//!
//! A failing step marks the Ready condition False with the failure reason.
//! Repeated failures with the same reason keep the original transition time,
//! so the condition "decays": it stays at `Warning` severity while the failure
//! is younger than the grace window and escalates to `Error` once it is older.
//! Only an `Error` condition is treated as terminal by the reconciler.

use crate::crd::{Condition, ConditionSeverity, ManagedClusterStatus};
use chrono::{DateTime, Utc};
use std::time::Duration;

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

pub fn get_condition<'a>(status: &'a ManagedClusterStatus, type_: &str) -> Option<&'a Condition> {
    status.conditions.iter().find(|c| c.r#type == type_)
}

/// Insert or replace the condition of the same type
fn set_condition(status: &mut ManagedClusterStatus, condition: Condition) {
    match status
        .conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        Some(existing) => *existing = condition,
        None => status.conditions.push(condition),
    }
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Mark a condition True, clearing reason, severity and message.
/// The transition time only moves when the status flips.
pub fn mark_true(status: &mut ManagedClusterStatus, type_: &str, now: DateTime<Utc>) {
    let last_transition_time = match get_condition(status, type_) {
        Some(existing) if existing.status == STATUS_TRUE => existing.last_transition_time.clone(),
        _ => now.to_rfc3339(),
    };
    set_condition(
        status,
        Condition {
            r#type: type_.to_string(),
            status: STATUS_TRUE.to_string(),
            severity: None,
            last_transition_time,
            reason: None,
            message: None,
        },
    );
}

/// Mark a condition False.
///
/// The transition time is kept when the condition was already False for the
/// same reason, otherwise it restarts at `now`.
pub fn mark_false(
    status: &mut ManagedClusterStatus,
    type_: &str,
    reason: &str,
    severity: ConditionSeverity,
    message: &str,
    now: DateTime<Utc>,
) {
    let last_transition_time = match get_condition(status, type_) {
        Some(existing)
            if existing.status == STATUS_FALSE
                && existing.reason.as_deref() == Some(reason)
                && parse_time(&existing.last_transition_time).is_some() =>
        {
            existing.last_transition_time.clone()
        }
        _ => now.to_rfc3339(),
    };
    set_condition(
        status,
        Condition {
            r#type: type_.to_string(),
            status: STATUS_FALSE.to_string(),
            severity: Some(severity),
            last_transition_time,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        },
    );
}

/// Whether the condition has been False for longer than `timeout`
pub fn has_stale_condition(
    status: &ManagedClusterStatus,
    type_: &str,
    timeout: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(condition) = get_condition(status, type_) else {
        return false;
    };
    if condition.status != STATUS_FALSE {
        return false;
    }
    let Some(since) = parse_time(&condition.last_transition_time) else {
        return false;
    };
    let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
    since
        .checked_add_signed(timeout)
        .is_some_and(|deadline| now > deadline)
}

pub fn has_condition_severity(
    status: &ManagedClusterStatus,
    type_: &str,
    severity: ConditionSeverity,
) -> bool {
    get_condition(status, type_).is_some_and(|c| c.severity == Some(severity))
}

/// Record a failure as a decaying condition.
///
/// Returns true when the failure has outlived `timeout` and was escalated to
/// `Error` severity.
pub fn record_decaying_condition(
    status: &mut ManagedClusterStatus,
    type_: &str,
    reason: &str,
    message: &str,
    timeout: Duration,
    now: DateTime<Utc>,
) -> bool {
    mark_false(status, type_, reason, ConditionSeverity::Warning, message, now);
    if has_stale_condition(status, type_, timeout, now) {
        mark_false(status, type_, reason, ConditionSeverity::Error, message, now);
        return true;
    }
    false
}
