//! Pure cron scheduling logic for C5, kept free of any Kubernetes or
//! dispatcher dependency so the decision table in is exercised directly.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::util::{DEBOUNCE_WINDOW, Error, MAX_MISSED_SCHEDULES};

/// What a reconcile tick should do about a policy's schedule.
#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    /// First ever scheduling: record `next_schedule_time`, do not submit.
    FirstSchedule { next_schedule_time: DateTime<Utc> },
    /// Not due yet; nothing submitted, status unchanged.
    NotDue { next_schedule_time: DateTime<Utc> },
    /// A fire was debounced because the last run was too recent.
    Debounced { next_schedule_time: DateTime<Utc> },
    /// Due: the caller should submit the policy name to the dispatcher.
    Due { next_schedule_time: DateTime<Utc> },
}

/// Parses a standard 5-field cron expression.
///
/// The `cron` crate expects 6 fields (seconds first); a leading `0 ` is
/// prefixed so policy authors can write ordinary 5-field cron strings.
pub fn parse(expr: &str) -> Result<Schedule, Error> {
    let six_field = format!("0 {expr}");
    Schedule::from_str(&six_field).map_err(|source| Error::InvalidSchedule {
        schedule: expr.to_string(),
        source,
    })
}

/// Decides what to do at `now`, given the policy's cron schedule and status.
///
/// `earliest` is `last_run_time` if set, else the policy's creation time.
/// `starting_deadline` caps how far into the past missed fires are counted.
pub fn decide(
    schedule: &Schedule,
    schedule_expr: &str,
    now: DateTime<Utc>,
    earliest: DateTime<Utc>,
    starting_deadline: Option<chrono::Duration>,
    next_schedule_time: Option<DateTime<Utc>>,
    last_run_time: Option<DateTime<Utc>>,
) -> Result<Decision, Error> {
    let mut earliest = earliest;
    if let Some(deadline) = starting_deadline {
        let floor = now - deadline;
        if floor > earliest {
            earliest = floor;
        }
    }

    let missed = schedule.after(&earliest).take_while(|t| *t <= now).count();
    if missed > MAX_MISSED_SCHEDULES {
        return Err(Error::TooManyMissedSchedules(schedule_expr.to_string()));
    }

    // A cron schedule with no future fire time (e.g. `0 0 30 2 *` on a non-leap
    // setup) is rejected at admission in a fully built-out system; here it is
    // treated as schedule exhaustion and debounced indefinitely rather than panicking.
    let Some(next_run) = schedule.after(&now).next() else {
        return Ok(Decision::NotDue {
            next_schedule_time: next_schedule_time.unwrap_or(now),
        });
    };

    if next_schedule_time.is_none() {
        return Ok(Decision::FirstSchedule {
            next_schedule_time: next_run,
        });
    }

    let due_time = next_schedule_time.unwrap();
    if now < due_time {
        return Ok(Decision::NotDue {
            next_schedule_time: due_time,
        });
    }

    if let Some(last_run) = last_run_time {
        if now - last_run < chrono::Duration::seconds(DEBOUNCE_WINDOW.as_secs() as i64) {
            return Ok(Decision::Debounced {
                next_schedule_time: next_run,
            });
        }
    }

    Ok(Decision::Due {
        next_schedule_time: next_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn every_minute() -> Schedule {
        parse("* * * * *").unwrap()
    }

    #[test]
    fn first_schedule_sets_next_but_does_not_submit() {
        let now = at("2026-01-01T00:00:30Z");
        let decision = decide(&every_minute(), "* * * * *", now, now, None, None, None).unwrap();
        assert!(matches!(decision, Decision::FirstSchedule { .. }));
    }

    #[test]
    fn not_due_before_next_schedule_time() {
        let now = at("2026-01-01T00:00:30Z");
        let next = at("2026-01-01T00:01:00Z");
        let decision = decide(&every_minute(), "* * * * *", now, now, None, Some(next), None).unwrap();
        assert_eq!(decision, Decision::NotDue { next_schedule_time: next });
    }

    #[test]
    fn due_when_now_past_next_schedule_time() {
        let earliest = at("2026-01-01T00:00:00Z");
        let now = at("2026-01-01T00:01:05Z");
        let next_schedule_time = at("2026-01-01T00:01:00Z");
        let decision = decide(
            &every_minute(),
            "* * * * *",
            now,
            earliest,
            None,
            Some(next_schedule_time),
            None,
        )
        .unwrap();
        assert!(matches!(decision, Decision::Due { .. }));
    }

    #[test]
    fn debounced_when_last_run_too_recent() {
        let earliest = at("2026-01-01T00:00:00Z");
        let now = at("2026-01-01T00:01:05Z");
        let next_schedule_time = at("2026-01-01T00:01:00Z");
        let last_run = at("2026-01-01T00:00:50Z");
        let decision = decide(
            &every_minute(),
            "* * * * *",
            now,
            earliest,
            None,
            Some(next_schedule_time),
            Some(last_run),
        )
        .unwrap();
        assert!(matches!(decision, Decision::Debounced { .. }));
    }

    #[test]
    fn too_many_missed_fires_is_an_error() {
        let earliest = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let err = decide(&every_minute(), "* * * * *", now, earliest, None, Some(now), None).unwrap_err();
        assert!(matches!(err, Error::TooManyMissedSchedules(_)));
    }

    #[test]
    fn starting_deadline_caps_missed_fire_history() {
        let earliest = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let decision = decide(
            &every_minute(),
            "* * * * *",
            now,
            earliest,
            Some(chrono::Duration::seconds(120)),
            Some(now),
            None,
        )
        .unwrap();
        assert!(matches!(decision, Decision::Due { .. }));
    }
}
