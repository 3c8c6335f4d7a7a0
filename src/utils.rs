//! Calendar and numeric helpers shared by the engine and the jobs.
//!
//! All calendar days are UTC days: a day `d` covers `[d 00:00:00Z, d+1 00:00:00Z)`.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

pub const FLOAT_EPSILON: f64 = 1e-6;

pub fn approx_eq(lhs: f64, rhs: f64) -> bool {
    (lhs - rhs).abs() <= FLOAT_EPSILON
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Exclusive end of `day` (midnight of the following day).
pub fn day_end(day: NaiveDate) -> DateTime<Utc> {
    day_start(day) + Duration::days(1)
}

/// Source rows carry epoch milliseconds; values outside chrono's range yield `None`.
pub fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs_into_hour = ts.timestamp().rem_euclid(3600);
    ts - Duration::seconds(secs_into_hour) - Duration::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
}

pub fn truncate_to_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    day_start(ts.date_naive())
}

pub fn hours(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}

/// A half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeWindow { start, end }
    }

    pub fn day(day: NaiveDate) -> Self {
        TimeWindow {
            start: day_start(day),
            end: day_end(day),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateSpan {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateSpan {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        DateSpan { from, to }
    }

    pub fn single(day: NaiveDate) -> Self {
        DateSpan { from: day, to: day }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let to = self.to;
        self.from.iter_days().take_while(move |d| *d <= to)
    }

    pub fn num_days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(day_start(self.from), day_end(self.to))
    }
}
