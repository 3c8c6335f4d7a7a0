//! Fixed-bucket statistics for a single sensor signal.

use crate::models::records::SensorStat;
use crate::utils::{approx_eq, round_to, truncate_to_day, truncate_to_hour};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Granularity::Hour => truncate_to_hour(ts),
            Granularity::Day => truncate_to_day(ts),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hourly" => Some(Granularity::Hour),
            "day" | "daily" => Some(Granularity::Day),
            _ => None,
        }
    }
}

/// Which standard deviation to report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Deviation {
    /// Divides by `n - 1`
    Sample,
    /// Divides by `n`
    Population,
}

impl Deviation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sample" => Some(Deviation::Sample),
            "population" => Some(Deviation::Population),
            _ => None,
        }
    }
}

/// How one signal is cleaned and scaled before statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub name: String,
    /// Raw value / divisor = physical value
    pub divisor: f64,
    /// Raw values that mean "no reading"
    pub sentinels: Vec<f64>,
    pub granularity: Granularity,
    pub deviation: Deviation,
}

impl SignalSpec {
    /// Scaled value, or `None` for null, non-finite and sentinel readings.
    pub fn normalize(&self, raw: Option<f64>) -> Option<f64> {
        let raw = raw?;
        if !raw.is_finite() || self.sentinels.iter().any(|s| approx_eq(raw, *s)) {
            return None;
        }
        Some(raw / self.divisor)
    }
}

/// Group readings into buckets and summarise each.
///
/// Buckets without a single valid reading are omitted. `avg` and `std_dev` are rounded to two
/// decimals; `avg` is kept within `[min, max]` after rounding.
pub fn bucket_readings(readings: &[(DateTime<Utc>, Option<f64>)], spec: &SignalSpec) -> Vec<SensorStat> {
    let mut buckets: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
    for (ts, raw) in readings {
        if let Some(value) = spec.normalize(*raw) {
            buckets.entry(spec.granularity.truncate(*ts)).or_default().push(value);
        }
    }

    buckets
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(bucket, values)| summarize(&spec.name, bucket, &values, spec.deviation))
        .collect()
}

fn summarize(name: &str, bucket: DateTime<Utc>, values: &[f64], deviation: Deviation) -> SensorStat {
    let count = values.len();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / count as f64;

    let std_dev = if count > 1 {
        let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        let denom = match deviation {
            Deviation::Sample => (count - 1) as f64,
            Deviation::Population => count as f64,
        };
        Some(round_to((squares / denom).sqrt(), 2))
    } else {
        None
    };

    SensorStat {
        sensor_name: name.to_string(),
        bucket,
        min,
        max,
        avg: round_to(mean, 2).clamp(min, max),
        std_dev,
        count,
    }
}
