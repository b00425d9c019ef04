use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::crd::TimeWindow;

/// How far forward the search for the next entry boundary is allowed to walk
/// before giving up — guards against malformed windows causing an infinite scan.
const MAX_FORWARD_DAYS: i64 = 14;

/// Whether `t` is allowed by any configured window; an empty list is always
/// allowed (§4.4).
pub fn allows(windows: &[TimeWindow], t: DateTime<Utc>) -> bool {
    if windows.is_empty() {
        return true;
    }
    windows.iter().any(|w| window_contains(w, t))
}

/// The minimum over every window of its next entry or exit time `>= t`.
/// `None` means no window will ever produce a future boundary (empty list,
/// or every absolute window already ended).
pub fn next_boundary(windows: &[TimeWindow], t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    windows.iter().filter_map(|w| window_next_boundary(w, t)).min()
}

fn window_contains(window: &TimeWindow, t: DateTime<Utc>) -> bool {
    if window.is_absolute() {
        let Some((start, end)) = absolute_bounds(window) else { return false };
        return t >= start && t < end;
    }
    recurring_occurrence_covering(window, t).is_some()
}

fn window_next_boundary(window: &TimeWindow, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if window.is_absolute() {
        let (start, end) = absolute_bounds(window)?;
        if t < start {
            return Some(start);
        }
        if t < end {
            return Some(end);
        }
        return None; // already past; absolute windows never recur
    }

    if let Some((_, end)) = recurring_occurrence_covering(window, t) {
        return Some(end);
    }
    recurring_next_entry(window, t)
}

fn absolute_bounds(window: &TimeWindow) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = DateTime::parse_from_rfc3339(window.start_time.as_ref()?).ok()?.with_timezone(&Utc);
    let end = DateTime::parse_from_rfc3339(window.end_time.as_ref()?).ok()?.with_timezone(&Utc);
    Some((start, end))
}

fn window_tz(window: &TimeWindow) -> Tz {
    window
        .timezone
        .as_deref()
        .and_then(|tz| tz.parse::<Tz>().ok())
        .unwrap_or(chrono_tz::UTC)
}

fn weekday_token(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "Mon",
        chrono::Weekday::Tue => "Tue",
        chrono::Weekday::Wed => "Wed",
        chrono::Weekday::Thu => "Thu",
        chrono::Weekday::Fri => "Fri",
        chrono::Weekday::Sat => "Sat",
        chrono::Weekday::Sun => "Sun",
    }
}

fn day_allowed(window: &TimeWindow, date: NaiveDate) -> bool {
    window.days_of_week.is_empty() || window.days_of_week.iter().any(|d| d == weekday_token(date))
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.split_once(':')?;
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}

/// The `[start, end)` occurrence of a recurring window beginning on `start_day`,
/// honoring midnight wraparound (`end <= start` means the window ends the
/// following day).
fn occurrence_for_start_day(window: &TimeWindow, tz: Tz, start_day: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start_time = parse_hhmm(window.start.as_deref()?)?;
    let end_time = parse_hhmm(window.end.as_deref()?)?;

    let start_naive = start_day.and_time(start_time);
    let end_day = if end_time <= start_time { start_day + Duration::days(1) } else { start_day };
    let end_naive = end_day.and_time(end_time);

    let start = tz.from_local_datetime(&start_naive).single()?.with_timezone(&Utc);
    let end = tz.from_local_datetime(&end_naive).single()?.with_timezone(&Utc);
    Some((start, end))
}

/// Finds the occurrence (if any) whose `[start, end)` covers `t`, searching
/// the day before `t` (to catch wraparound windows) through `t`'s own day.
fn recurring_occurrence_covering(window: &TimeWindow, t: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let tz = window_tz(window);
    let local_date = t.with_timezone(&tz).date_naive();

    for offset in [-1i64, 0] {
        let start_day = local_date + Duration::days(offset);
        if !day_allowed(window, start_day) {
            continue;
        }
        if let Some((start, end)) = occurrence_for_start_day(window, tz, start_day) {
            if t >= start && t < end {
                return Some((start, end));
            }
        }
    }
    None
}

/// Finds the next occurrence's entry time `>= t`, walking forward day by day
/// up to [`MAX_FORWARD_DAYS`].
fn recurring_next_entry(window: &TimeWindow, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tz = window_tz(window);
    let local_date = t.with_timezone(&tz).date_naive();

    for offset in 0..MAX_FORWARD_DAYS {
        let start_day = local_date + Duration::days(offset);
        if !day_allowed(window, start_day) {
            continue;
        }
        if let Some((start, _end)) = occurrence_for_start_day(window, tz, start_day) {
            if start >= t {
                return Some(start);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn recurring(start: &str, end: &str) -> TimeWindow {
        TimeWindow {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_window_list_always_allowed() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(allows(&[], t));
        assert_eq!(next_boundary(&[], t), None);
    }

    #[test]
    fn test_wraparound_window_allows_both_sides_of_midnight() {
        // [22:00, 02:00) UTC; Tuesday 23:30 and Tuesday-into-Wednesday 01:30 both allowed.
        let windows = vec![recurring("22:00", "02:00")];
        let tuesday_night = Utc.with_ymd_and_hms(2026, 1, 6, 23, 30, 0).unwrap(); // a Tuesday
        let wednesday_early = Utc.with_ymd_and_hms(2026, 1, 7, 1, 30, 0).unwrap();
        assert!(allows(&windows, tuesday_night));
        assert!(allows(&windows, wednesday_early));
    }

    #[test]
    fn test_wraparound_window_blocks_daytime() {
        let windows = vec![recurring("22:00", "02:00")];
        let tuesday_afternoon = Utc.with_ymd_and_hms(2026, 1, 6, 14, 30, 0).unwrap();
        assert!(!allows(&windows, tuesday_afternoon));
    }

    #[test]
    fn test_absolute_window_allowed_on_half_open_interval() {
        let window = TimeWindow {
            start_time: Some("2026-01-01T00:00:00Z".to_string()),
            end_time: Some("2026-01-02T00:00:00Z".to_string()),
            ..Default::default()
        };
        let inside = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let at_end = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert!(allows(&[window.clone()], inside));
        assert!(!allows(&[window], at_end));
    }

    #[test]
    fn test_absolute_window_no_boundary_after_end() {
        let window = TimeWindow {
            start_time: Some("2026-01-01T00:00:00Z".to_string()),
            end_time: Some("2026-01-02T00:00:00Z".to_string()),
            ..Default::default()
        };
        let after = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(next_boundary(&[window], after), None);
    }

    #[test]
    fn test_next_boundary_inside_window_is_the_exit() {
        let windows = vec![recurring("22:00", "23:59")];
        let inside = Utc.with_ymd_and_hms(2026, 1, 6, 22, 30, 0).unwrap();
        let boundary = next_boundary(&windows, inside).unwrap();
        assert_eq!(boundary, Utc.with_ymd_and_hms(2026, 1, 6, 23, 59, 0).unwrap());
    }

    #[test]
    fn test_next_boundary_outside_window_is_the_entry() {
        let windows = vec![recurring("22:00", "23:00")];
        let before = Utc.with_ymd_and_hms(2026, 1, 6, 10, 0, 0).unwrap();
        let boundary = next_boundary(&windows, before).unwrap();
        assert_eq!(boundary, Utc.with_ymd_and_hms(2026, 1, 6, 22, 0, 0).unwrap());
    }

    #[test]
    fn test_timezone_roundtrip_berlin_winter() {
        // 09:00-17:00 Europe/Berlin; in winter (CET, UTC+1), 08:30 UTC is 09:30 Berlin: allowed.
        let window = TimeWindow {
            start: Some("09:00".to_string()),
            end: Some("17:00".to_string()),
            timezone: Some("Europe/Berlin".to_string()),
            ..Default::default()
        };
        let winter_instant = Utc.with_ymd_and_hms(2026, 1, 6, 8, 30, 0).unwrap();
        assert!(allows(&[window], winter_instant));
    }

    #[test]
    fn test_days_of_week_restricts_occurrence() {
        let window = TimeWindow {
            start: Some("09:00".to_string()),
            end: Some("17:00".to_string()),
            days_of_week: vec!["Mon".to_string(), "Wed".to_string(), "Fri".to_string()],
            ..Default::default()
        };
        let tuesday = Utc.with_ymd_and_hms(2026, 1, 6, 10, 0, 0).unwrap(); // Tuesday
        let wednesday = Utc.with_ymd_and_hms(2026, 1, 7, 10, 0, 0).unwrap(); // Wednesday
        assert!(!allows(&[window.clone()], tuesday));
        assert!(allows(&[window], wednesday));
    }
}
