use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Cap on how many times the window/fire search iterates forward before
/// giving up, per §4.5 ("hard cap on forward steps to avoid loops on
/// malformed inputs").
const MAX_SEARCH_STEPS: u32 = 64;

fn predefined_to_cron(token: &str) -> Option<&'static str> {
    match token {
        "@hourly" => Some("0 0 * * * *"),
        "@daily" => Some("0 0 0 * * *"),
        "@weekly" => Some("0 0 0 * * Sun"),
        "@monthly" => Some("0 0 0 1 * *"),
        "@yearly" => Some("0 0 0 1 1 *"),
        _ => None,
    }
}

/// Normalizes a user-facing schedule string (5-field cron or a predefined
/// token) into the 6-field `sec min hour dom month dow` grammar the `cron`
/// crate expects.
fn normalize(schedule: &str) -> Result<String, String> {
    let schedule = schedule.trim();
    if let Some(builtin) = predefined_to_cron(schedule) {
        return Ok(builtin.to_string());
    }
    if schedule.starts_with('@') {
        return Err(format!("unknown predefined schedule token `{schedule}`"));
    }

    let fields: Vec<&str> = schedule.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {schedule}")),
        6 => Ok(schedule.to_string()),
        n => Err(format!("schedule `{schedule}` has {n} fields, expected 5 (cron) or a predefined token")),
    }
}

/// Parses `schedule` (5-field cron or predefined token) and validates it
/// without computing a fire time. Used by the Validator's schema layer.
pub fn validate(schedule: &str) -> Result<(), String> {
    let normalized = normalize(schedule)?;
    cron::Schedule::from_str(&normalized)
        .map(|_| ())
        .map_err(|e| format!("invalid cron expression `{schedule}`: {e}"))
}

/// Returns the next fire time strictly after `after`.
pub fn next_fire(schedule: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let normalized = normalize(schedule)?;
    let parsed = cron::Schedule::from_str(&normalized).map_err(|e| format!("invalid cron expression `{schedule}`: {e}"))?;
    parsed
        .after(&after)
        .next()
        .ok_or_else(|| format!("schedule `{schedule}` has no upcoming fire time"))
}

/// Computes the next trigger instant that also satisfies the configured time
/// windows (§4.5's window interaction): find `nextFire(t)`; if it falls
/// outside every window, advance to the window's next entry and search again,
/// bounded by [`MAX_SEARCH_STEPS`] to avoid looping on malformed inputs.
pub fn next_fire_in_window(
    schedule: &str,
    after: DateTime<Utc>,
    windows: &[crate::crd::TimeWindow],
) -> Result<DateTime<Utc>, String> {
    let mut candidate = after;
    let mut inclusive = false;
    for _ in 0..MAX_SEARCH_STEPS {
        let fire = if inclusive { next_fire_inclusive(schedule, candidate)? } else { next_fire(schedule, candidate)? };
        if crate::time_window::allows(windows, fire) {
            return Ok(fire);
        }
        match crate::time_window::next_boundary(windows, fire) {
            Some(boundary) => {
                candidate = boundary;
                inclusive = true;
            }
            None => return Err("time windows never allow this schedule to fire".to_string()),
        }
    }
    Err(format!("schedule `{schedule}` did not settle within {MAX_SEARCH_STEPS} steps"))
}

/// Like [`next_fire`] but includes `at` itself as a candidate, used when
/// resuming the search from a window's entry boundary.
fn next_fire_inclusive(schedule: &str, at: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let normalized = normalize(schedule)?;
    let parsed = cron::Schedule::from_str(&normalized).map_err(|e| format!("invalid cron expression `{schedule}`: {e}"))?;
    let just_before = at - chrono::Duration::nanoseconds(1);
    parsed
        .after(&just_before)
        .next()
        .ok_or_else(|| format!("schedule `{schedule}` has no upcoming fire time"))
}
