//! Energy estimation from motor utilization readings.
//!
//! Each valid reading holds until the device's next valid reading, or until the window end if
//! that comes first. A segment consumes `(utilization / 100) * nominal_kw * hours` and its whole
//! energy is attributed to the hour the segment starts in.

use crate::models::records::EnergyHourly;
use crate::utils::{hours, round_to, truncate_to_hour, TimeWindow};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A monitored motor and its nominal power rating.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorSpec {
    pub name: String,
    pub nominal_kw: f64,
}

/// Constant utilization over `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSegment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub utilization_pct: f64,
    pub nominal_kw: f64,
}

impl PowerSegment {
    pub fn energy_kwh(&self) -> f64 {
        self.utilization_pct / 100.0 * self.nominal_kw * hours(self.end - self.start)
    }
}

/// Piecewise-constant segments for one device.
///
/// Readings outside `window` and non-finite values are discarded; segments never extend past
/// the window end and zero-length segments are dropped.
pub fn build_segments(
    readings: &[(DateTime<Utc>, Option<f64>)],
    nominal_kw: f64,
    window: &TimeWindow,
) -> Vec<PowerSegment> {
    let mut valid: Vec<(DateTime<Utc>, f64)> = readings
        .iter()
        .filter(|(ts, _)| window.contains(*ts))
        .filter_map(|(ts, v)| v.filter(|v| v.is_finite()).map(|v| (*ts, v)))
        .collect();
    valid.sort_by_key(|(ts, _)| *ts);

    let mut segments = Vec::with_capacity(valid.len());
    for (i, (start, pct)) in valid.iter().enumerate() {
        let end = valid.get(i + 1).map(|(next, _)| *next).unwrap_or(window.end).min(window.end);
        if end > *start {
            segments.push(PowerSegment {
                start: *start,
                end,
                utilization_pct: *pct,
                nominal_kw,
            });
        }
    }
    segments
}

/// Sum segment energy by the truncated hour of each segment start, rounded to 3 decimals.
pub fn hourly_energy(segments: &[PowerSegment]) -> Vec<EnergyHourly> {
    let mut by_hour: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for seg in segments {
        *by_hour.entry(truncate_to_hour(seg.start)).or_default() += seg.energy_kwh();
    }
    by_hour
        .into_iter()
        .map(|(hour, kwh)| EnergyHourly {
            hour,
            energy_kwh: round_to(kwh, 3),
        })
        .collect()
}
