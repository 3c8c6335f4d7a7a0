//! Hourly energy consumption of the monitored motors, one UTC day at a time.

use crate::engine::energy::{build_segments, hourly_energy, MotorSpec, PowerSegment};
use crate::error::EtlError;
use crate::services::job::{resolve_span, DateSelection, JobContext, JobKind, JobReport, JobRun, JobState};
use crate::store::{AggregateStore, SourceStore, SpanScope};
use crate::utils::TimeWindow;
use log::{debug, info, warn};

/// Configured motors that exist in the source, paired with their variable id.
fn resolve_motors(source: &mut dyn SourceStore, motors: &[MotorSpec]) -> Result<Vec<(i32, MotorSpec)>, EtlError> {
    let mut found = Vec::with_capacity(motors.len());
    for motor in motors {
        match source.variable_id(&motor.name)? {
            Some(id) => found.push((id, motor.clone())),
            None => warn!("energy: motor {} is not defined in the source; skipping", motor.name),
        }
    }
    Ok(found)
}

pub fn run(
    ctx: &JobContext<'_>,
    source: &mut dyn SourceStore,
    agg: &mut dyn AggregateStore,
    selection: &DateSelection,
) -> Result<JobReport, EtlError> {
    let mut run = JobRun::new(JobKind::Energy);

    let motors = resolve_motors(source, &ctx.config.energy_motors)?;
    if motors.is_empty() {
        return Ok(run.nothing_to_do("none of the configured motors exist in the source"));
    }
    let ids: Vec<i32> = motors.iter().map(|(id, _)| *id).collect();
    let scope = SpanScope::Float {
        ids: ids.clone(),
        bounds: None,
    };
    let Some(span) = resolve_span(selection, source, &scope)? else {
        return Ok(run.nothing_to_do("no motor readings in the source"));
    };
    run.start(selection, span);

    run.each_day(span, |run, day| {
        let window = TimeWindow::day(day);
        run.enter(JobState::Extracting);
        let events = source.float_events(&ids, &window)?;
        run.extracted(events.len());
        if events.is_empty() {
            debug!("energy: no motor readings on {}", day);
            return Ok(());
        }

        run.enter(JobState::Transforming);
        let mut segments: Vec<PowerSegment> = Vec::new();
        for (id, motor) in &motors {
            let readings: Vec<_> = events
                .iter()
                .filter(|e| e.variable_id == *id)
                .map(|e| (e.timestamp, e.as_f64()))
                .collect();
            segments.extend(build_segments(&readings, motor.nominal_kw, &window));
        }
        let hourly = hourly_energy(&segments);
        run.transformed(hourly.len());

        run.enter(JobState::Loading);
        let written = agg.upsert_energy_hourly(&hourly)?;
        run.loaded(written);
        let total: f64 = hourly.iter().map(|h| h.energy_kwh).sum();
        info!("energy: {} -> {} hour(s), {:.3} kWh", day, written, total);
        Ok(())
    });

    Ok(run.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::job::JobStatus;
    use crate::store::memory::{MemoryAggregate, MemorySource};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, day, h, m, 0).unwrap()
    }

    fn config() -> Config {
        Config::from_lookup(|k| (k == "ENERGY_MOTORS").then(|| "SPINDLE=10,AXIS_X=20,AXIS_GHOST=5".to_string())).unwrap()
    }

    #[test]
    fn sums_devices_per_start_hour() {
        let mut src = MemorySource::default().with_variable(1, "SPINDLE").with_variable(2, "AXIS_X");
        src.push_float(1, at(23, 8, 0), Some(50.0));
        src.push_float(1, at(23, 10, 0), Some(0.0));
        src.push_float(2, at(23, 8, 30), Some(10.0));
        src.push_float(2, at(23, 9, 0), Some(f64::NAN));
        src.push_float(2, at(23, 9, 30), Some(0.0));
        let config = config();
        let ctx = JobContext {
            config: &config,
            now: at(24, 0, 0),
        };
        let mut agg = MemoryAggregate::default();

        let report = run(&ctx, &mut src, &mut agg, &DateSelection::Full).unwrap();
        assert_eq!(report.status, JobStatus::Done);
        // spindle: 0.5 * 10 kW * 2 h; axis: 0.1 * 20 kW * 1 h (NaN skipped)
        assert_eq!(agg.energy.get(&at(23, 8, 0)), Some(&12.0));
        assert_eq!(agg.energy.get(&at(23, 9, 0)), Some(&0.0));
        assert_eq!(agg.energy.get(&at(23, 10, 0)), Some(&0.0));
    }

    #[test]
    fn last_reading_stops_at_midnight() {
        let mut src = MemorySource::default().with_variable(1, "SPINDLE");
        src.push_float(1, at(22, 23, 0), Some(100.0));
        src.push_float(1, at(23, 1, 0), Some(100.0));
        let config = config();
        let ctx = JobContext {
            config: &config,
            now: at(24, 0, 0),
        };
        let mut agg = MemoryAggregate::default();
        run(&ctx, &mut src, &mut agg, &DateSelection::Single(NaiveDate::from_ymd_opt(2022, 2, 22).unwrap())).unwrap();
        assert_eq!(agg.energy.len(), 1);
        assert_eq!(agg.energy.get(&at(22, 23, 0)), Some(&10.0));
    }

    #[test]
    fn rerun_is_idempotent() {
        let mut src = MemorySource::default().with_variable(1, "SPINDLE").with_variable(2, "AXIS_X");
        src.push_float(1, at(22, 22, 30), Some(40.0));
        src.push_float(1, at(23, 3, 0), Some(0.0));
        src.push_float(2, at(23, 8, 0), Some(25.0));
        src.push_float(2, at(23, 8, 45), Some(0.0));
        let config = config();
        let ctx = JobContext {
            config: &config,
            now: at(24, 0, 0),
        };
        let mut agg = MemoryAggregate::default();

        run(&ctx, &mut src, &mut agg, &DateSelection::Full).unwrap();
        let first = agg.energy.clone();
        assert!(!first.is_empty());
        let report = run(&ctx, &mut src, &mut agg, &DateSelection::Full).unwrap();
        assert_eq!(report.status, JobStatus::Done);
        assert_eq!(agg.energy.len(), first.len());
        assert_eq!(agg.energy, first);
    }

    #[test]
    fn no_known_motors_is_empty() {
        let config = config();
        let ctx = JobContext {
            config: &config,
            now: at(24, 0, 0),
        };
        let mut agg = MemoryAggregate::default();
        let report = run(&ctx, &mut MemorySource::default(), &mut agg, &DateSelection::Full).unwrap();
        assert_eq!(report.status, JobStatus::Empty);
    }
}
