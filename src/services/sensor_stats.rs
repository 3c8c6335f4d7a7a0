//! Hourly (or daily) statistics for the configured temperature sensor.

use crate::engine::bucket::bucket_readings;
use crate::error::EtlError;
use crate::services::job::{resolve_span, DateSelection, JobContext, JobKind, JobReport, JobRun, JobState};
use crate::store::{AggregateStore, SourceStore, SpanScope};
use crate::utils::TimeWindow;
use log::{debug, info};

pub fn run(
    ctx: &JobContext<'_>,
    source: &mut dyn SourceStore,
    agg: &mut dyn AggregateStore,
    selection: &DateSelection,
) -> Result<JobReport, EtlError> {
    let spec = &ctx.config.sensor;
    let mut run = JobRun::new(JobKind::SensorStats);

    let Some(sensor_id) = source.variable_id(&spec.name)? else {
        return Ok(run.nothing_to_do(&format!("sensor {} is not defined in the source", spec.name)));
    };
    let scope = SpanScope::Float {
        ids: vec![sensor_id],
        bounds: None,
    };
    let Some(span) = resolve_span(selection, source, &scope)? else {
        return Ok(run.nothing_to_do("no sensor readings in the source"));
    };
    run.start(selection, span);

    run.each_day(span, |run, day| {
        run.enter(JobState::Extracting);
        let events = source.float_events(&[sensor_id], &TimeWindow::day(day))?;
        run.extracted(events.len());
        if events.is_empty() {
            debug!("sensor-stats: no readings on {}", day);
            return Ok(());
        }

        run.enter(JobState::Transforming);
        let readings: Vec<_> = events.iter().map(|e| (e.timestamp, e.as_f64())).collect();
        let stats = bucket_readings(&readings, spec);
        run.transformed(stats.len());

        run.enter(JobState::Loading);
        let written = agg.upsert_sensor_stats(&stats)?;
        run.loaded(written);
        info!(
            "sensor-stats: {} -> {} reading(s) into {} bucket(s)",
            day,
            events.len(),
            written
        );
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
    use crate::utils::DateSpan;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    const SENSOR: i32 = 12;

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, day, h, m, 0).unwrap()
    }

    fn source() -> MemorySource {
        let mut src = MemorySource::default().with_variable(SENSOR, "TEMPERATURA_BASE");
        for (i, raw) in [2100.0, 2200.0, 0.0, 2300.0].iter().enumerate() {
            src.push_float(SENSOR, at(22, 9, 0) + Duration::minutes(i as i64 * 10), Some(*raw));
        }
        src.push_float(SENSOR, at(23, 14, 5), Some(2500.0));
        src.push_float(SENSOR, at(23, 14, 50), Some(f64::NAN));
        // another variable on the same day
        src.push_float(99, at(23, 14, 10), Some(1.0));
        src
    }

    fn ctx(config: &Config) -> JobContext<'_> {
        JobContext {
            config,
            now: at(24, 0, 0),
        }
    }

    #[test]
    fn full_backfill_buckets_every_day() {
        let config = Config::from_lookup(|_| None).unwrap();
        let mut src = source();
        let mut agg = MemoryAggregate::default();

        let report = run(&ctx(&config), &mut src, &mut agg, &DateSelection::Full).unwrap();
        assert_eq!(report.status, JobStatus::Done);
        assert_eq!(report.span, Some(DateSpan::new(NaiveDate::from_ymd_opt(2022, 2, 22).unwrap(), NaiveDate::from_ymd_opt(2022, 2, 23).unwrap())));
        assert_eq!(agg.sensor_stats.len(), 2);

        let nine = &agg.sensor_stats[&("TEMPERATURA_BASE".to_string(), at(22, 9, 0))];
        assert_eq!((nine.min, nine.max, nine.avg, nine.count), (21.0, 23.0, 22.0, 3));
        let two = &agg.sensor_stats[&("TEMPERATURA_BASE".to_string(), at(23, 14, 0))];
        assert_eq!(two.count, 1);
        assert_eq!(two.std_dev, None);
    }

    #[test]
    fn rerun_is_idempotent() {
        let config = Config::from_lookup(|_| None).unwrap();
        let mut src = source();
        let mut agg = MemoryAggregate::default();
        let day = DateSelection::Single(NaiveDate::from_ymd_opt(2022, 2, 22).unwrap());

        run(&ctx(&config), &mut src, &mut agg, &day).unwrap();
        let first: Vec<_> = agg.sensor_stats.values().cloned().collect();
        run(&ctx(&config), &mut src, &mut agg, &day).unwrap();
        let second: Vec<_> = agg.sensor_stats.values().cloned().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_sensor_is_empty_not_failed() {
        let config = Config::from_lookup(|k| (k == "SENSOR_NAME").then(|| "MISSING".to_string())).unwrap();
        let mut agg = MemoryAggregate::default();
        let report = run(&ctx(&config), &mut source(), &mut agg, &DateSelection::Full).unwrap();
        assert_eq!(report.status, JobStatus::Empty);
        assert!(agg.sensor_stats.is_empty());
    }

    #[test]
    fn broken_day_is_recorded_and_others_load() {
        let config = Config::from_lookup(|_| None).unwrap();
        let mut src = source();
        src.broken_days = vec![NaiveDate::from_ymd_opt(2022, 2, 22).unwrap()];
        let mut agg = MemoryAggregate::default();

        let report = run(&ctx(&config), &mut src, &mut agg, &DateSelection::Full).unwrap();
        assert_eq!(report.status, JobStatus::Partial);
        assert_eq!(report.failed_dates, vec![NaiveDate::from_ymd_opt(2022, 2, 22).unwrap()]);
        assert_eq!(agg.sensor_stats.len(), 1);
    }
}
