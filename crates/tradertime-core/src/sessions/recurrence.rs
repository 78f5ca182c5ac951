//! Next-occurrence calculation for weekly UTC rules.
//!
//! Pure and deterministic: the reference instant is always passed in.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use super::rule::WeeklyRule;

/// Days scanned forward before falling back to `now + 7 days`.
const SCAN_DAYS: i64 = 7;

/// Return the first instant strictly after `now` that matches `rule`.
///
/// Scans day by day starting today. Today only qualifies if the rule's
/// time of day is strictly later than `now`. When nothing in the window
/// qualifies (the rule's single weekday is today and already passed, or the
/// weekday set is empty) the result is the rule's time on `now + 7 days`.
/// Seconds and sub-second fields are always zero.
pub fn next_occurrence(rule: &WeeklyRule, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();

    for days_ahead in 0..SCAN_DAYS {
        let date = today + Duration::days(days_ahead);
        if !rule.weekdays.contains(date.weekday()) {
            continue;
        }
        let Some(candidate) = at_rule_time(rule, date) else {
            continue;
        };
        if candidate > now {
            return candidate;
        }
    }

    let fallback_date = today + Duration::days(SCAN_DAYS);
    at_rule_time(rule, fallback_date).unwrap_or_else(|| {
        // Only reachable for a rule built without WeeklyRule::new.
        fallback_date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now + Duration::days(SCAN_DAYS))
    })
}

fn at_rule_time(rule: &WeeklyRule, date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(rule.utc_hour, rule.utc_minute, 0)
        .map(|dt| dt.and_utc())
}
