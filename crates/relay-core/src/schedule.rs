//! Cron schedule evaluation for recurring jobs.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression {expr:?}: {reason}")]
    Invalid { expr: String, reason: String },

    #[error("cron expression {0:?} never fires again")]
    Exhausted(String),
}

/// Compute the next fire time of a standard 5-field cron expression
/// (minute hour day-of-month month day-of-week) strictly after `after`.
pub fn next_fire_time(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let schedule = parse(expr)?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| ScheduleError::Exhausted(expr.to_string()))
}

fn parse(expr: &str) -> Result<Schedule, ScheduleError> {
    // The `cron` crate wants a leading seconds field; the wire format is the
    // classic 5-field form.
    let fields = expr.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };

    Schedule::from_str(&normalized).map_err(|e| ScheduleError::Invalid {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn every_five_minutes() {
        let base = at(2025, 3, 1, 12, 2, 30);
        let next = next_fire_time("*/5 * * * *", base).unwrap();
        assert_eq!(next, at(2025, 3, 1, 12, 5, 0));
    }

    #[test]
    fn daily_at_midnight() {
        let base = at(2025, 3, 1, 0, 0, 0);
        let next = next_fire_time("0 0 * * *", base).unwrap();
        assert_eq!(next, at(2025, 3, 2, 0, 0, 0));
    }

    #[test]
    fn next_fire_is_strictly_after_base() {
        let base = at(2025, 3, 1, 12, 5, 0);
        let next = next_fire_time("*/5 * * * *", base).unwrap();
        assert!(next > base);
        assert_eq!(next, at(2025, 3, 1, 12, 10, 0));
    }

    #[test]
    fn rejects_garbage() {
        assert!(next_fire_time("not a cron", Utc::now()).is_err());
        assert!(next_fire_time("99 * * * *", Utc::now()).is_err());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(next_fire_time("* * *", Utc::now()).is_err());
    }
}
