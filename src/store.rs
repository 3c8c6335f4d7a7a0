//! Storage seams between the jobs and the two databases.
//!
//! Jobs only ever see these traits. The production store is read through [`SourceStore`], the
//! aggregation store is written through [`AggregateStore`]; `crate::db` provides the Postgres
//! implementations and the in-memory ones below back the job tests.

use crate::engine::segment::Interval;
use crate::error::EtlError;
use crate::models::records::{
    AlertDailyCount, AlertDetail, DailyUtilization, EnergyHourly, ProgramUsage, RawEvent, SensorStat, Watermark,
};
use crate::utils::{DateSpan, TimeWindow};
use chrono::{DateTime, Duration, Utc};

/// Half-open value range `[min, max)` a float reading must fall in to count.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ValueBounds {
    pub min: f64,
    pub max: f64,
}

impl ValueBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value < self.max
    }
}

/// Which source rows a full backfill derives its date range from.
#[derive(Debug, Clone, PartialEq)]
pub enum SpanScope {
    /// Every row of both log tables
    AllActivity,
    /// Float rows of the given variables, optionally value-bounded
    Float { ids: Vec<i32>, bounds: Option<ValueBounds> },
    /// String rows of one variable
    Strings { id: i32 },
}

/// Read-only access to the production event logs.
pub trait SourceStore {
    fn variable_id(&mut self, name: &str) -> Result<Option<i32>, EtlError>;

    /// Float events of `ids` inside `window`, ordered by timestamp.
    fn float_events(&mut self, ids: &[i32], window: &TimeWindow) -> Result<Vec<RawEvent>, EtlError>;

    /// Most recent float event of `id` strictly before `before` whose value is within `bounds`.
    fn last_float_before(
        &mut self,
        id: i32,
        before: DateTime<Utc>,
        bounds: Option<ValueBounds>,
    ) -> Result<Option<RawEvent>, EtlError>;

    /// String events of `id` inside `window`, ordered by timestamp.
    fn string_events(&mut self, id: i32, window: &TimeWindow) -> Result<Vec<RawEvent>, EtlError>;

    /// Timestamps of every logged row (both tables, any variable) inside `window`, ascending.
    fn activity_times(&mut self, window: &TimeWindow) -> Result<Vec<DateTime<Utc>>, EtlError>;

    /// Last logged row in `[before - within, before)`.
    fn activity_before(&mut self, before: DateTime<Utc>, within: Duration) -> Result<Option<DateTime<Utc>>, EtlError>;

    /// First logged row in `[from, from + within]`.
    fn activity_from(&mut self, from: DateTime<Utc>, within: Duration) -> Result<Option<DateTime<Utc>>, EtlError>;

    /// First and last calendar day holding rows in `scope`, `None` when there are none.
    fn date_span(&mut self, scope: &SpanScope) -> Result<Option<DateSpan>, EtlError>;
}

/// Rows removed and written by a delete-then-insert load.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub deleted: usize,
    pub inserted: usize,
}

/// Rows written by one day's alert load.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct AlertLoad {
    pub counted: usize,
    pub appended: usize,
}

/// Write access to the aggregation store. Each call is one transaction.
pub trait AggregateStore {
    fn upsert_sensor_stats(&mut self, rows: &[SensorStat]) -> Result<usize, EtlError>;
    fn upsert_daily_utilization(&mut self, rows: &[DailyUtilization]) -> Result<usize, EtlError>;
    /// Delete every interval whose date lies in `[min, max]` of `rows`' dates, then insert `rows`.
    fn replace_utilization_intervals(&mut self, rows: &[Interval]) -> Result<ReplaceOutcome, EtlError>;
    fn upsert_program_usage(&mut self, rows: &[ProgramUsage]) -> Result<usize, EtlError>;
    /// Upsert the category counts and append the detail rows (no dedup key) together; a failure
    /// leaves neither.
    fn load_alerts(&mut self, counts: &[AlertDailyCount], details: &[AlertDetail]) -> Result<AlertLoad, EtlError>;
    fn upsert_energy_hourly(&mut self, rows: &[EnergyHourly]) -> Result<usize, EtlError>;
    fn watermarks(&mut self) -> Result<Vec<Watermark>, EtlError>;
}

/// Opens fresh store handles; every job invocation gets its own pair.
pub trait StoreFactory {
    fn source(&self) -> Result<Box<dyn SourceStore>, EtlError>;
    fn aggregate(&self) -> Result<Box<dyn AggregateStore>, EtlError>;
}

/// `[min, max]` of the dates of rows about to be inserted.
pub fn replaced_dates(rows: &[Interval]) -> Option<DateSpan> {
    let min = rows.iter().map(|r| r.date).min()?;
    let max = rows.iter().map(|r| r.date).max()?;
    Some(DateSpan::new(min, max))
}
