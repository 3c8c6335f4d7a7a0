//! Typed records flowing between the extract, transform and load stages.
//!
//! One type per entity; storage rows live in `crate::db::models` and are mapped from these.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Value of a single source log row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventValue {
    Float(f64),
    Text(String),
    Null,
}

/// One row of `variable_log_float` / `variable_log_string`. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawEvent {
    pub variable_id: i32,
    pub timestamp: DateTime<Utc>,
    pub value: EventValue,
}

impl RawEvent {
    pub fn float(variable_id: i32, timestamp: DateTime<Utc>, value: Option<f64>) -> Self {
        RawEvent {
            variable_id,
            timestamp,
            value: value.map(EventValue::Float).unwrap_or(EventValue::Null),
        }
    }

    pub fn text(variable_id: i32, timestamp: DateTime<Utc>, value: Option<String>) -> Self {
        RawEvent {
            variable_id,
            timestamp,
            value: value.map(EventValue::Text).unwrap_or(EventValue::Null),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            EventValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            EventValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorStat {
    pub sensor_name: String,
    /// Start of the bucket (hour or day)
    pub bucket: DateTime<Utc>,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// `None` when the bucket holds a single reading
    pub std_dev: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyUtilization {
    pub date: NaiveDate,
    pub running_hours: f64,
    pub planned_down_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramUsage {
    pub date: NaiveDate,
    pub program_id: i32,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDailyCount {
    pub day: NaiveDate,
    pub alert_type: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDetail {
    pub timestamp: DateTime<Utc>,
    pub alert_type: String,
    pub alarm_code: Option<String>,
    pub alarm_description: Option<String>,
    pub raw_payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyHourly {
    pub hour: DateTime<Utc>,
    pub energy_kwh: f64,
}

/// Per-table summary read from the aggregation store's status view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Watermark {
    pub table_name: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub record_count: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// The latest `last_date` over all tables, or `None` when nothing has been aggregated yet.
pub fn latest_processed_date(marks: &[Watermark]) -> Option<NaiveDate> {
    marks.iter().filter_map(|m| m.last_date).max()
}
