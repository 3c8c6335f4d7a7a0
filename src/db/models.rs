//! Diesel row structs for both stores.
//!
//! Source rows are read-only and converted into `RawEvent`s; aggregate rows are built from the
//! typed records in `crate::models::records`.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema as source;
use crate::engine::segment::Interval;
use crate::models::records::{
    AlertDailyCount, AlertDetail, DailyUtilization, EnergyHourly, ProgramUsage, RawEvent, SensorStat, Watermark,
};
use crate::schema;
use crate::utils::from_epoch_millis;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = source::variable_log_float)]
pub struct FloatLog {
    pub id_var: i32,
    pub date: i64,
    pub value: Option<f64>,
}

impl FloatLog {
    /// `None` when the stored epoch is outside the representable range.
    pub fn into_event(self) -> Option<RawEvent> {
        from_epoch_millis(self.date).map(|ts| RawEvent::float(self.id_var, ts, self.value))
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = source::variable_log_string)]
pub struct StringLog {
    pub id_var: i32,
    pub date: i64,
    pub value: Option<String>,
}

impl StringLog {
    pub fn into_event(self) -> Option<RawEvent> {
        from_epoch_millis(self.date).map(|ts| RawEvent::text(self.id_var, ts, self.value))
    }
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = schema::agg_sensor_stats)]
pub struct NewSensorStat {
    pub sensor_name: String,
    pub dt: DateTime<Utc>,
    pub min_value: Option<f64>,
    pub avg_value: Option<f64>,
    pub max_value: Option<f64>,
    pub std_dev: Option<f64>,
    pub readings_count: Option<i32>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl NewSensorStat {
    pub fn from_stat(stat: &SensorStat, now: DateTime<Utc>) -> Self {
        NewSensorStat {
            sensor_name: stat.sensor_name.clone(),
            dt: stat.bucket,
            min_value: Some(stat.min),
            avg_value: Some(stat.avg),
            max_value: Some(stat.max),
            std_dev: stat.std_dev,
            readings_count: Some(i32::try_from(stat.count).unwrap_or(i32::MAX)),
            last_updated_at: Some(now),
        }
    }
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = schema::agg_machine_activity_daily)]
pub struct NewActivityDaily {
    pub dt: NaiveDate,
    pub state_planned_down: f64,
    pub state_running: f64,
    pub state_unplanned_down: f64,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl NewActivityDaily {
    pub fn from_daily(row: &DailyUtilization, now: DateTime<Utc>) -> Self {
        NewActivityDaily {
            dt: row.date,
            state_planned_down: row.planned_down_hours,
            state_running: row.running_hours,
            state_unplanned_down: 0.0,
            last_updated_at: Some(now),
        }
    }
}

/// `dt` and `duration` are generated by the database.
#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = schema::machine_utilization)]
pub struct NewUtilizationInterval {
    pub machine_state: String,
    pub state_start_time: DateTime<Utc>,
    pub state_end_time: DateTime<Utc>,
}

impl From<&Interval> for NewUtilizationInterval {
    fn from(value: &Interval) -> Self {
        NewUtilizationInterval {
            machine_state: value.state.as_str().to_string(),
            state_start_time: value.start,
            state_end_time: value.end,
        }
    }
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = schema::machine_program_data)]
pub struct NewProgramData {
    pub dt: NaiveDate,
    pub program: i32,
    pub duration_seconds: i64,
}

impl From<&ProgramUsage> for NewProgramData {
    fn from(value: &ProgramUsage) -> Self {
        NewProgramData {
            dt: value.date,
            program: value.program_id,
            duration_seconds: value.duration_seconds,
        }
    }
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = schema::alerts_daily_count)]
pub struct NewAlertCount {
    pub day: NaiveDate,
    pub alert_type: String,
    pub amount: i64,
}

impl From<&AlertDailyCount> for NewAlertCount {
    fn from(value: &AlertDailyCount) -> Self {
        NewAlertCount {
            day: value.day,
            alert_type: value.alert_type.clone(),
            amount: value.amount,
        }
    }
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = schema::alerts_detail)]
pub struct NewAlertDetail {
    pub dt: DateTime<Utc>,
    pub alert_type: String,
    pub alarm_code: Option<String>,
    pub alarm_description: Option<String>,
    pub raw_elem_json: Option<serde_json::Value>,
}

impl From<&AlertDetail> for NewAlertDetail {
    fn from(value: &AlertDetail) -> Self {
        NewAlertDetail {
            dt: value.timestamp,
            alert_type: value.alert_type.clone(),
            alarm_code: value.alarm_code.clone(),
            alarm_description: value.alarm_description.clone(),
            raw_elem_json: value.raw_payload.clone(),
        }
    }
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = schema::energy_consumption_hourly)]
pub struct NewEnergyHourly {
    pub hour_ts: DateTime<Utc>,
    pub energy_kwh: f64,
}

impl From<&EnergyHourly> for NewEnergyHourly {
    fn from(value: &EnergyHourly) -> Self {
        NewEnergyHourly {
            hour_ts: value.hour,
            energy_kwh: value.energy_kwh,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::v_data_status)]
pub struct DataStatus {
    pub table_name: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub total_records: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<DataStatus> for Watermark {
    fn from(value: DataStatus) -> Self {
        Watermark {
            table_name: value.table_name,
            first_date: value.first_date,
            last_date: value.last_date,
            record_count: value.total_records,
            last_updated: value.last_updated,
        }
    }
}
